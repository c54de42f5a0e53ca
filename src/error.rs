//! Error types for snapdom operations.

use thiserror::Error;

/// Errors that can occur during capture or export.
///
/// Resource-tier failures (network, HTTP, timeout) never surface here; they
/// degrade the artifact and are reported through [`crate::fetch::ResourceRecord`].
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Clone failed: {0}")]
    CloneFailure(String),

    #[error("Invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, Error>;
