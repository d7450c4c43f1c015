use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info, warn};
use rods_dump_util::{
    ADSORBED_SUFFIX, CLUSTER_DATA_SUFFIX, DumpFile, DumpReader, LAST_DUMP_SUFFIX,
    MEM_CLUSTER_COMPUTE, ROD_CLUSTER_COMPUTE, RodModelConfig, compute_column, get_adsorbed,
    get_cluster_data, output_path, read_last_snapshot, write_cluster_data,
};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Post-processing of LAMMPS dump files of multistate rod simulations
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Rod model config file (TOML)
    config_file: PathBuf,

    /// Dump file(s) to analyse
    #[arg(required = true)]
    in_files: Vec<PathBuf>,

    /// Produce a "_cluster_data" file for each input file
    #[arg(short, long)]
    cluster_data: bool,

    /// Produce a "_last_dump" file, containing the last snapshot, for each input file
    #[arg(short, long)]
    last_dump: bool,

    /// Produce an "_adsorbed" file for each input file
    #[arg(short, long)]
    membrane: bool,

    /// Type offset of the rod model in the simulation
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    type_offset: i64,

    /// Analyse every n-th snapshot
    #[arg(short = 'n', long, default_value_t = NonZeroUsize::MIN)]
    every: NonZeroUsize,

    /// Compute id of the rod clusters
    #[arg(long, default_value = ROD_CLUSTER_COMPUTE)]
    rod_cluster: String,

    /// Compute id of the membrane clusters
    #[arg(long, default_value = MEM_CLUSTER_COMPUTE)]
    mem_cluster: String,
}

fn do_cluster_data(cli: &Cli, model: &RodModelConfig, in_file: &Path) -> Result<PathBuf> {
    let run = get_cluster_data(
        DumpReader::open(in_file)?,
        cli.every.get(),
        model,
        cli.type_offset,
        &compute_column(&cli.rod_cluster),
    )?;
    let path = output_path(in_file, CLUSTER_DATA_SUFFIX);
    write_cluster_data(&run.timesteps(), &run.box_sizes(), &run.clusters(), &path)?;
    Ok(path)
}

fn do_last_dump(in_file: &Path) -> Result<PathBuf> {
    let snapshot = read_last_snapshot(in_file)?;
    let path = output_path(in_file, LAST_DUMP_SUFFIX);
    DumpFile::new(vec![snapshot]).save(&path)?;
    Ok(path)
}

fn do_membrane(cli: &Cli, model: &RodModelConfig, in_file: &Path) -> Result<PathBuf> {
    let run = get_cluster_data(
        DumpReader::open(in_file)?,
        cli.every.get(),
        model,
        cli.type_offset,
        &compute_column(&cli.mem_cluster),
    )
    .context("No membrane data to analyse (invalid -m option?)")?;
    let adsorbed = get_adsorbed(&run);
    let path = output_path(in_file, ADSORBED_SUFFIX);
    write_cluster_data(&run.timesteps(), &run.box_sizes(), &adsorbed, &path)?;
    Ok(path)
}

fn do_in_file(cli: &Cli, model: &RodModelConfig, in_file: &Path) -> Result<()> {
    if cli.cluster_data {
        let path = do_cluster_data(cli, model, in_file).context("cluster data")?;
        info!("cluster data: {}", path.to_string_lossy());
    }
    if cli.last_dump {
        let path = do_last_dump(in_file).context("last dump")?;
        info!("last dump: {}", path.to_string_lossy());
    }
    if cli.membrane {
        let path = do_membrane(cli, model, in_file).context("adsorbed rods")?;
        info!("adsorbed rods: {}", path.to_string_lossy());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let model = RodModelConfig::load(&cli.config_file).context(format!(
        "Failed to load rod model: {}",
        cli.config_file.to_string_lossy()
    ))?;
    if !(cli.cluster_data || cli.last_dump || cli.membrane) {
        warn!("no output requested (use -c, -l and/or -m)");
        return Ok(());
    }

    let mut failed = 0;
    for in_file in &cli.in_files {
        if let Err(err) = do_in_file(&cli, &model, in_file) {
            error!("{}: {err:#}", in_file.to_string_lossy());
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} of {} input files failed", cli.in_files.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DUMP: &str = "\
ITEM: TIMESTEP
0
ITEM: NUMBER OF ATOMS
3
ITEM: BOX BOUNDS pp pp pp
-10 10
-10 10
-10 10
ITEM: ATOMS id type mol c_rod_cluster c_mem_cluster
10 1 100 1 1
11 3 0 2 1
12 1 101 1 2
ITEM: TIMESTEP
100
ITEM: NUMBER OF ATOMS
3
ITEM: BOX BOUNDS pp pp pp
-10 10
-10 10
-10 10
ITEM: ATOMS id type mol c_rod_cluster c_mem_cluster
10 1 100 1 1
11 3 0 2 1
12 1 101 1 1
";

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(["dump-processing", "rods.toml", "run.dump"].iter().chain(args))
    }

    fn model() -> RodModelConfig {
        "body_bead_types = [1]".parse().unwrap()
    }

    #[test]
    fn test_cli_defaults() {
        let cli = cli(&[]);
        assert_eq!(cli.every.get(), 1);
        assert_eq!(cli.type_offset, 0);
        assert_eq!(cli.rod_cluster, "rod_cluster");
        assert_eq!(cli.mem_cluster, "mem_cluster");
        assert!(!cli.cluster_data && !cli.last_dump && !cli.membrane);
    }

    #[test]
    fn test_cli_rejects_zero_stride() {
        assert!(
            Cli::try_parse_from(["dump-processing", "rods.toml", "run.dump", "-n", "0"]).is_err()
        );
        assert!(Cli::try_parse_from(["dump-processing", "rods.toml"]).is_err());
    }

    #[test]
    fn test_all_reports() {
        let dir = tempfile::tempdir().unwrap();
        let in_file = dir.path().join("run.dump");
        fs::write(&in_file, DUMP).unwrap();
        let cli = cli(&["-c", "-l", "-m", "-t", "0"]);
        do_in_file(&cli, &model(), &in_file).unwrap();

        let cluster_data = fs::read_to_string(dir.path().join("run_cluster_data")).unwrap();
        assert_eq!(
            cluster_data,
            "# timestep 0 box 20 20 20\n1: 10:100 12:101\n2: 11\n\
             # timestep 100 box 20 20 20\n1: 10:100 12:101\n2: 11\n"
        );
        let adsorbed = fs::read_to_string(dir.path().join("run_adsorbed")).unwrap();
        assert_eq!(
            adsorbed,
            "# timestep 0 box 20 20 20\n10\n# timestep 100 box 20 20 20\n10 12\n"
        );
        let last_dump = fs::read_to_string(dir.path().join("run_last_dump")).unwrap();
        assert!(last_dump.starts_with("ITEM: TIMESTEP\n100\n"));
        assert_eq!(last_dump.lines().count(), 12);
    }

    #[test]
    fn test_no_membrane_data_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let in_file = dir.path().join("run.dump");
        fs::write(&in_file, DUMP.replace("c_mem_cluster", "c_other")).unwrap();
        let cli = cli(&["-m"]);
        let err = do_in_file(&cli, &model(), &in_file).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<rods_dump_util::Error>(),
            Some(rods_dump_util::Error::NoClusterData { .. })
        ));
        assert!(!dir.path().join("run_adsorbed").exists());
    }

    #[test]
    fn test_stride_two() {
        let dir = tempfile::tempdir().unwrap();
        let in_file = dir.path().join("run.dump");
        fs::write(&in_file, DUMP).unwrap();
        let cli = cli(&["-c", "-n", "2"]);
        do_in_file(&cli, &model(), &in_file).unwrap();
        let cluster_data = fs::read_to_string(dir.path().join("run_cluster_data")).unwrap();
        assert!(cluster_data.starts_with("# timestep 100 "));
        assert_eq!(cluster_data.matches("# timestep").count(), 1);
    }
}
