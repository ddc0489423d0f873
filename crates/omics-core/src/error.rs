//! Error types for omics-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in omics-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a delimited table
    #[error("failed to parse table '{path}': {message}")]
    TableParse { path: PathBuf, message: String },

    /// Parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A named file resource was not registered
    #[error("file resource '{0}' not found")]
    ResourceNotFound(String),

    /// A remote resource was referenced but never fetched
    #[error("resource '{name}' points to remote url {url}; fetch it to a local path first")]
    RemoteResource { name: String, url: String },

    /// Columns referenced that do not exist in the table
    #[error("columns {missing:?} do not exist in '{table}'")]
    MissingColumns { table: String, missing: Vec<String> },

    /// The same column was requested more than once
    #[error("duplicate values in columns: {0:?}")]
    DuplicateColumns(Vec<String>),

    /// Lengths of a new column and the table disagree
    #[error("column '{column}' has {found} values but table has {expected} rows")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },

    /// Annotation-side state accessed before being initialized
    #[error("{name} must run {step}() first")]
    NotInitialized { name: String, step: &'static str },

    /// The annotation index does not match the requested key
    #[error("index must be '{expected}', found {found:?}")]
    IndexMismatch {
        expected: String,
        found: Vec<String>,
    },

    /// A plan step names a database that was never declared
    #[error("unknown database '{0}'")]
    UnknownDatabase(String),

    /// Unknown aggregation function name
    #[error("unknown aggregation '{0}'")]
    UnknownAggregator(String),

    /// Operation deliberately not provided here
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
