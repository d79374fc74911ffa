use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of every failure the tool can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or ambiguous archive structure.
    Format,
    /// The search string or replacement template is unusable.
    Pattern,
    /// The embedded database is missing expected tables/columns or failed.
    Database,
    /// Filesystem access or overwrite problems.
    Io,
}

impl ErrorKind {
    /// Process exit status the binary reports for this kind of failure.
    /// 1 is left for failures outside the taxonomy (config file, report
    /// output) and 2 for command-line usage errors.
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::Format => 3,
            ErrorKind::Pattern => 4,
            ErrorKind::Database => 5,
            ErrorKind::Io => 6,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed schedule archive: {0}")]
    Format(String),

    #[error("malformed schedule archive: {context}")]
    Archive {
        context: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("invalid search pattern: {0}")]
    Pattern(String),

    #[error("incompatible schedule database: {0}")]
    Schema(String),

    #[error("database failure while {context}")]
    Database {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("output file already exists: {} (pass --force to replace it)", .0.display())]
    OutputExists(PathBuf),

    #[error("output path {} is the input archive itself", .0.display())]
    OutputIsInput(PathBuf),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Format(_) | Error::Archive { .. } => ErrorKind::Format,
            Error::Pattern(_) => ErrorKind::Pattern,
            Error::Schema(_) | Error::Database { .. } => ErrorKind::Database,
            Error::Io { .. } | Error::OutputExists(_) | Error::OutputIsInput(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn db(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Error::Database {
            context: context.into(),
            source,
        }
    }

    /// Zip failures that are really I/O failures keep their I/O classification.
    pub(crate) fn zip(context: impl Into<String>, source: zip::result::ZipError) -> Self {
        match source {
            zip::result::ZipError::Io(e) => Error::Io {
                context: context.into(),
                source: e,
            },
            other => Error::Archive {
                context: context.into(),
                source: other,
            },
        }
    }
}
