// src/error.rs

//! Crate-wide error type

use thiserror::Error;

/// Errors raised while unpacking, packaging and registering products
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    #[error("XML error: {0}")]
    XmlError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid entry pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    #[error("{name}: no manifest found in the {platform} archive")]
    ManifestNotFound { name: String, platform: String },

    #[error("{name}: multiple manifests match in the {platform} archive: {}", candidates.join(", "))]
    AmbiguousManifest {
        name: String,
        platform: String,
        candidates: Vec<String>,
    },

    #[error("{name}: manifest is missing field '{field}'")]
    MissingField { name: String, field: String },

    #[error("{0}: toolbox has no controlling product among its dependencies")]
    MissingControllingProduct(String),

    #[error("Component file not found: {0}")]
    ComponentFileMissing(String),

    #[error("No embedded archive marker found in installer: {0}")]
    InstallerMarkerNotFound(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{kind} '{name}' does not exist after it was written")]
    RemoteObjectMissing { kind: String, name: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::ArchiveError(err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlError(err.to_string())
    }
}
