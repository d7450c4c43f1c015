use log::{debug, warn};
use std::collections::HashMap;

use crate::dump_snapshot::DumpSnapshot;
use crate::error::{Error, Result};
use crate::rod_model::RodModel;

pub type ClusterId = i64;

/// Compute id of the rod clustering, dumped as `c_rod_cluster`.
pub const ROD_CLUSTER_COMPUTE: &str = "rod_cluster";
/// Compute id of the membrane clustering, dumped as `c_mem_cluster`.
pub const MEM_CLUSTER_COMPUTE: &str = "mem_cluster";

/// Name of the dump column a LAMMPS compute is written to.
pub fn compute_column(compute_id: &str) -> String {
    format!("c_{compute_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterMember {
    pub particle_id: u64,
    /// Molecule id of the owning rod; `None` for lipids and other non-rod particles.
    pub rod_id: Option<u64>,
}

impl ClusterMember {
    pub fn new(particle_id: u64, rod_id: Option<u64>) -> Self {
        Self {
            particle_id,
            rod_id,
        }
    }
}

/// Clusters of one snapshot, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterData {
    clusters: Vec<(ClusterId, Vec<ClusterMember>)>,
    index: HashMap<ClusterId, usize>,
}

impl ClusterData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cluster_id: ClusterId, member: ClusterMember) {
        let i = *self.index.entry(cluster_id).or_insert_with(|| {
            self.clusters.push((cluster_id, Vec::new()));
            self.clusters.len() - 1
        });
        self.clusters[i].1.push(member);
    }

    pub fn get(&self, cluster_id: ClusterId) -> Option<&[ClusterMember]> {
        self.index
            .get(&cluster_id)
            .map(|&i| self.clusters[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClusterId, &[ClusterMember])> {
        self.clusters
            .iter()
            .map(|(cluster_id, members)| (*cluster_id, members.as_slice()))
    }

    /// Number of clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn particles_count(&self) -> usize {
        self.clusters.iter().map(|(_, members)| members.len()).sum()
    }
}

impl FromIterator<(ClusterId, ClusterMember)> for ClusterData {
    fn from_iter<I: IntoIterator<Item = (ClusterId, ClusterMember)>>(iter: I) -> Self {
        let mut data = Self::new();
        for (cluster_id, member) in iter {
            data.push(cluster_id, member);
        }
        data
    }
}

/// Groups the atoms of `snapshot` by the cluster id stored in the `attribute` column.
///
/// Atoms whose type, shifted down by `type_offset`, is a rod body type get their
/// `mol` value as rod id; all others are kept without one.
pub fn extract_clusters(
    snapshot: &DumpSnapshot,
    attribute: &str,
    model: &impl RodModel,
    type_offset: i64,
) -> Result<ClusterData> {
    let cluster_ids = snapshot.get_property(attribute)?;
    let ids = snapshot.get_property("id")?;
    let types = snapshot.get_property("type")?;
    let mols = snapshot.get_property("mol").ok();

    let mut data = ClusterData::new();
    for i in 0..snapshot.atoms_count {
        let is_rod_body = (types[i] as i64)
            .checked_sub(type_offset)
            .is_some_and(|adjusted| model.is_rod_body_type(adjusted));
        let rod_id = if is_rod_body {
            let mols = mols.ok_or_else(|| Error::MissingAttribute {
                attribute: "mol".to_string(),
                step: snapshot.step,
            })?;
            Some(mols[i] as u64)
        } else {
            None
        };
        data.push(
            cluster_ids[i] as ClusterId,
            ClusterMember::new(ids[i] as u64, rod_id),
        );
    }
    if data.is_empty() {
        warn!("snapshot {} has no atoms", snapshot.step);
    }
    Ok(data)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFrame {
    pub step: u64,
    pub box_size: [f64; 3],
    pub clusters: ClusterData,
}

/// Cluster data of every analyzed snapshot of one dump.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterRun {
    pub every: usize,
    pub frames: Vec<ClusterFrame>,
}

impl ClusterRun {
    pub fn timesteps(&self) -> Vec<u64> {
        self.frames.iter().map(|frame| frame.step).collect()
    }

    pub fn box_sizes(&self) -> Vec<[f64; 3]> {
        self.frames.iter().map(|frame| frame.box_size).collect()
    }

    pub fn clusters(&self) -> Vec<&ClusterData> {
        self.frames.iter().map(|frame| &frame.clusters).collect()
    }
}

/// Extracts clusters from every `every`-th snapshot (1-based) of a dump stream.
///
/// Skipped snapshots are still read, so the whole stream is consumed once.
/// Fails with `NoClusterData` if none of the analyzed snapshots has the
/// `attribute` column, and with `MissingAttribute` if only some of them do.
pub fn get_cluster_data<I>(
    snapshots: I,
    every: usize,
    model: &impl RodModel,
    type_offset: i64,
    attribute: &str,
) -> Result<ClusterRun>
where
    I: IntoIterator<Item = Result<DumpSnapshot>>,
{
    if every == 0 {
        return Err(Error::InvalidStride);
    }
    let mut frames = Vec::new();
    let mut first_missing: Option<u64> = None;
    let mut analyzed = 0usize;
    for (n, snapshot) in (1usize..).zip(snapshots) {
        let snapshot = snapshot?;
        if n % every != 0 {
            debug!("skipping snapshot {}", snapshot.step);
            continue;
        }
        analyzed += 1;
        if !snapshot.has_property(attribute) {
            if !frames.is_empty() {
                return Err(Error::MissingAttribute {
                    attribute: attribute.to_string(),
                    step: snapshot.step,
                });
            }
            first_missing.get_or_insert(snapshot.step);
            continue;
        }
        if let Some(step) = first_missing {
            return Err(Error::MissingAttribute {
                attribute: attribute.to_string(),
                step,
            });
        }
        let clusters = extract_clusters(&snapshot, attribute, model, type_offset)?;
        debug!(
            "snapshot {}: {} clusters of {} atoms",
            snapshot.step,
            clusters.len(),
            clusters.particles_count()
        );
        frames.push(ClusterFrame {
            step: snapshot.step,
            box_size: snapshot.sym_box.size(),
            clusters,
        });
    }
    if first_missing.is_some() {
        return Err(Error::NoClusterData {
            attribute: attribute.to_string(),
        });
    }
    debug!("analyzed {analyzed} snapshots");
    Ok(ClusterRun { every, frames })
}
