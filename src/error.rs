
use std::fmt::Display;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Doc2VecError {
    #[error("empty vocabulary: none of the {distinct} distinct tokens occurs at least {min_count} times")]
    EmptyVocabulary { min_count: usize, distinct: usize },

    #[error("training diverged in epoch {epoch} (document {document:?}): non-finite vector component")]
    TrainingDiverged { epoch: usize, document: Option<usize> },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("npy error: {0}")]
    Npy(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Doc2VecError>;

impl From<bincode::Error> for Doc2VecError {
    fn from(e: bincode::Error) -> Self {
        Doc2VecError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for Doc2VecError {
    fn from(e: serde_json::Error) -> Self {
        Doc2VecError::Serialization(e.to_string())
    }
}

impl From<ndarray_npy::WriteNpyError> for Doc2VecError {
    fn from(e: ndarray_npy::WriteNpyError) -> Self {
        Doc2VecError::Npy(e.to_string())
    }
}

impl From<ndarray_npy::ReadNpyError> for Doc2VecError {
    fn from(e: ndarray_npy::ReadNpyError) -> Self {
        Doc2VecError::Npy(e.to_string())
    }
}

/// Conditions that are reported but never abort a pipeline stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// The document has no in-vocabulary token; it was given a zero vector.
    EmptyDocument { document: Option<usize>, tokens: usize },
}

impl Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::EmptyDocument { document: Some(id), tokens } => {
                write!(f, "document {} has no in-vocabulary token out of {}, using a zero vector", id, tokens)
            }
            Warning::EmptyDocument { document: None, tokens } => {
                write!(f, "document has no in-vocabulary token out of {}, using a zero vector", tokens)
            }
        }
    }
}
