use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("required input is missing: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("no documents found in {}", .0.display())]
    EmptyCorpus(PathBuf),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("invalid lexicon: {0}")]
    InvalidLexicon(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("document name conflict: {0}")]
    NameConflict(String),

    #[error("directory entry could not be read: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("worker pool setup failed: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
