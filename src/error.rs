use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid table name {0:?}")]
    InvalidName(String),

    #[error("cannot open top-level archive {path}: {reason}")]
    TopArchive { path: String, reason: String },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("cannot consolidate table {table}: {reason}")]
    Consolidation { table: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] duckdb::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("query rejected: {0}")]
    Query(String),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, IngestError>;
