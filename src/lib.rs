mod adsorption;
mod cluster_writer;
mod clusters;
mod dump_file;
mod dump_snapshot;
mod error;
mod rod_model;

pub use adsorption::{adsorbed_rods, biggest_cluster_id, get_adsorbed};
pub use cluster_writer::{
    output_path, write_cluster_data, ReportBlock, ADSORBED_SUFFIX, CLUSTER_DATA_SUFFIX,
    LAST_DUMP_SUFFIX,
};
pub use clusters::{
    compute_column, extract_clusters, get_cluster_data, ClusterData, ClusterFrame, ClusterId,
    ClusterMember, ClusterRun, MEM_CLUSTER_COMPUTE, ROD_CLUSTER_COMPUTE,
};
pub use dump_file::{read_last_snapshot, DumpFile, DumpReader};
pub use dump_snapshot::{DumpSnapshot, SymBox};
pub use error::{DumpParsingError, Error, ParseError, Result};
pub use rod_model::{RodModel, RodModelConfig};
