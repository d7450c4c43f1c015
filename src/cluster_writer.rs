use itertools::Itertools;
use log::debug;
use std::ffi::OsString;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::clusters::{ClusterData, ClusterMember};
use crate::error::{Error, Result};

pub const CLUSTER_DATA_SUFFIX: &str = "_cluster_data";
pub const LAST_DUMP_SUFFIX: &str = "_last_dump";
pub const ADSORBED_SUFFIX: &str = "_adsorbed";

/// `input` without its extension, with `suffix` appended: `run/a.dump` -> `run/a_adsorbed`.
pub fn output_path(input: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(input.with_extension(""));
    path.push(suffix);
    PathBuf::from(path)
}

/// Writes to a temporary file next to `path` and renames it over `path` once complete.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<NamedTempFile>) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut w = BufWriter::new(NamedTempFile::new_in(dir)?);
    write(&mut w)?;
    let file = w.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    debug!("wrote {}", path.to_string_lossy());
    Ok(())
}

/// Something that can be written as the body of one snapshot block.
pub trait ReportBlock {
    fn write_block(&self, w: &mut impl Write) -> io::Result<()>;
}

fn format_member(member: &ClusterMember) -> String {
    match member.rod_id {
        Some(rod_id) => format!("{}:{rod_id}", member.particle_id),
        None => member.particle_id.to_string(),
    }
}

impl ReportBlock for ClusterData {
    /// One line per cluster: `<cluster id>: <particle id>[:<rod id>] ...`.
    fn write_block(&self, w: &mut impl Write) -> io::Result<()> {
        for (cluster_id, members) in self.iter() {
            writeln!(w, "{cluster_id}: {}", members.iter().map(format_member).join(" "))?;
        }
        Ok(())
    }
}

impl<T: ReportBlock> ReportBlock for &T {
    fn write_block(&self, w: &mut impl Write) -> io::Result<()> {
        (**self).write_block(w)
    }
}

impl ReportBlock for Vec<u64> {
    fn write_block(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "{}", self.iter().join(" "))
    }
}

/// Writes one block per snapshot, each headed by
/// `# timestep <step> box <lx> <ly> <lz>`. Overwrites `path`.
pub fn write_cluster_data<T: ReportBlock>(
    timesteps: &[u64],
    box_sizes: &[[f64; 3]],
    data: &[T],
    path: &Path,
) -> Result<()> {
    if timesteps.len() != box_sizes.len() || timesteps.len() != data.len() {
        return Err(Error::ReportShape {
            timesteps: timesteps.len(),
            box_sizes: box_sizes.len(),
            blocks: data.len(),
        });
    }
    write_atomic(path, |w| {
        for ((step, [lx, ly, lz]), block) in timesteps.iter().zip(box_sizes).zip(data) {
            writeln!(w, "# timestep {step} box {lx} {ly} {lz}")?;
            block.write_block(w)?;
        }
        Ok(())
    })
}
