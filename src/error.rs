//! Error types shared by the runner, locators, writer and scheduler.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read output of `{command}`: {source}")]
    Read {
        command: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("process listing failed: {0}")]
    Command(#[from] CommandError),

    #[error("process listing unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("cannot create dump file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write dump file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure of a single capture iteration
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Dump(#[from] DumpError),
}
