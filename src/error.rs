//! Error types for skypelog

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for skypelog operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a .dbb file: {}", .0.display())]
    NotADbbFile(PathBuf),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type alias for skypelog operations
pub type Result<T> = std::result::Result<T, Error>;
