use std::{io, path::PathBuf};

use thiserror::Error;

/// Rejected cache geometry. Always raised before a cache is built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("associativity (-E) must be at least 1")]
    ZeroAssociativity,

    #[error("set bits ({set_bits}) plus block bits ({block_bits}) exceed the 64-bit address width")]
    AddressBitsExceeded { set_bits: u32, block_bits: u32 },

    #[error("missing required parameter: {0}")]
    Missing(&'static str),

    #[error("could not parse config: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("could not open trace {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed reading trace: {0}")]
    Read(#[from] io::Error),

    #[error("malformed trace line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not allocate storage for {sets} sets of {ways} lines")]
    Allocation { sets: u128, ways: usize },

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<pico_args::Error> for Error {
    fn from(err: pico_args::Error) -> Self {
        Error::Usage(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
