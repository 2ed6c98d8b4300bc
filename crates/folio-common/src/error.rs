//! Error types for folio
//!
//! Only hard failures live here. Missing images, unannotated figures and
//! lossy math extraction are reported as warnings by the passes themselves.

use miette::Diagnostic;
use std::path::PathBuf;

/// Main error type for folio operations
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum ExportError {
    /// The image bytes could not be decoded into pixel data
    #[error("failed to decode image {filename}: {message}")]
    #[diagnostic(
        code(folio::registry::decode),
        help("only PNG, JPEG, GIF and WebP sources can be embedded")
    )]
    Decode { filename: String, message: String },

    /// Decoded pixels could not be re-encoded into a portable format
    #[error("failed to encode image {filename} as {format}: {message}")]
    #[diagnostic(code(folio::registry::encode))]
    Encode {
        filename: String,
        format: String,
        message: String,
    },

    /// The rasterizer produced no usable encoding
    #[error("no portable encoding available for {0}")]
    #[diagnostic(code(folio::registry::no_encoding))]
    NoEncoding(String),

    /// IO error
    #[error("io error at {}: {source}", path.display())]
    #[diagnostic(code(folio::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded
    #[error(transparent)]
    #[diagnostic_source]
    Config(#[from] ConfigError),

    /// Background rasterization task failed to complete
    #[error(transparent)]
    #[diagnostic(code(folio::task))]
    Task(#[from] tokio::task::JoinError),
}

impl ExportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration loading errors
#[derive(thiserror::Error, Debug, Diagnostic)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("unsupported configuration format: {}", .0.display())]
    #[diagnostic(
        code(folio::config::format),
        help("use a .json or .toml configuration file")
    )]
    UnsupportedFormat(PathBuf),

    #[error("failed to read configuration {}", path.display())]
    #[diagnostic(code(folio::config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(folio::config::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(folio::config::toml))]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration value for `{key}`: {message}")]
    #[diagnostic(code(folio::config::invalid))]
    Invalid { key: &'static str, message: String },
}

pub type Result<T, E = ExportError> = std::result::Result<T, E>;
