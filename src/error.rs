use std::io;

use thiserror::Error;

/// What went wrong while reading a dump file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DumpParsingError {
    #[error("invalid or missing timestep")]
    InvalidOrMissingTimestep,
    #[error("invalid or missing number of atoms")]
    InvalidOrMissingNumberOfAtoms,
    #[error("missing box bounds")]
    MissingSymBox,
    #[error("invalid box bounds line")]
    InvalidSymBox,
    #[error("missing atom keys")]
    MissingAtomKeys,
    #[error("duplicate atom key '{0}'")]
    DuplicateAtomKeys(String),
    #[error("atom row has {found} values, expected {expected}")]
    InvalidAtomRow { expected: usize, found: usize },
    #[error("invalid value '{0}'")]
    InvalidValue(String),
    #[error("unexpected end of file inside a snapshot")]
    TruncatedSnapshot,
    #[error("timestep {step} comes after timestep {previous}")]
    DecreasingTimestep { previous: u64, step: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: DumpParsingError,
}

impl ParseError {
    pub fn new(line: usize, kind: DumpParsingError) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed dump: {0}")]
    Parse(#[from] ParseError),

    #[error("attribute '{attribute}' is missing from snapshot at timestep {step}")]
    MissingAttribute { attribute: String, step: u64 },

    #[error("no snapshot carries the '{attribute}' attribute (was the compute enabled for this run?)")]
    NoClusterData { attribute: String },

    #[error("snapshot stride must be at least 1")]
    InvalidStride,

    #[error("report needs one entry per snapshot: {timesteps} timesteps, {box_sizes} box sizes, {blocks} data blocks")]
    ReportShape {
        timesteps: usize,
        box_sizes: usize,
        blocks: usize,
    },

    #[error("dump contains no snapshots")]
    EmptyDump,

    #[error("invalid rod model config: {0}")]
    ModelConfig(String),

    #[error("I/O operation failed: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
