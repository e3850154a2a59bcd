use std::{io, path::PathBuf};

use thiserror::Error;

use crate::smiles::SmilesError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Smiles(#[from] SmilesError),

    #[error("conformer embedding failed: {0}")]
    Embedding(String),

    #[error("descriptor calculation failed: {0}")]
    Descriptor(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("no `.{extension}` files found under {}", folder.display())]
    NoInputFiles { folder: PathBuf, extension: String },

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("{workers} workers requested for only {files} input files")]
    TooManyWorkers { workers: usize, files: usize },

    #[error("an output sink lock was poisoned by a panicking worker")]
    SinkPoisoned,

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
