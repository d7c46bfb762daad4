//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The requested file or directory does not exist.
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Filesystem access failed for a reason other than absence.
    #[error("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A request path escaped the served root or was otherwise malformed.
    /// Raised before any filesystem access happens.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The configuration file could not be read.
    #[error("failed to read config from {}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid YAML.
    #[error("failed to parse config from {}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The watch ignore pattern is not a valid regex.
    #[error("invalid watch ignore pattern: {pattern}")]
    IgnorePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Filesystem observation could not be established.
    #[error("failed to watch filesystem")]
    Watch {
        #[source]
        source: notify_debouncer_mini::notify::Error,
    },
}

impl Error {
    /// Maps an I/O error to [`Error::NotFound`] or [`Error::Io`] depending
    /// on its kind, keeping the original cause.
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
