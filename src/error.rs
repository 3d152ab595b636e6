use std::sync::Arc;

use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by the ingestion step.
///
/// Every variant is recoverable: the caller may always retry with a new source. The `Display`
/// output is the human-readable string shown to the user.
#[derive(Debug, Clone, Error)]
pub enum IngestionError {
    /// A file-selection event carried no file.
    #[error("No files selected")]
    NoFileSelected,

    /// A file-selection event carried more than one file.
    #[error("You can only upload one file (got {count})")]
    MultipleFiles { count: usize },

    /// The input could not be read or is structurally malformed.
    #[error("{message}")]
    Parse {
        message: String,
        #[source]
        io: Option<Arc<std::io::Error>>,
    },

    /// A URL string was rejected before any request was made.
    #[error("{message}")]
    UrlFormat { input: String, message: String },

    /// Fetching a remote source failed (network, non-2xx status, timeout).
    #[error("{message}")]
    Fetch { message: String },

    /// `advance` was requested while no parsed matrix is available.
    #[error("cannot advance: no parsed source is ready")]
    AdvanceBlocked,

    /// Configuration could not be loaded.
    #[error("config error: {message}")]
    Config { message: String },
}

/// Discriminant of an [`IngestionError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoFileSelected,
    MultipleFiles,
    Parse,
    UrlFormat,
    Fetch,
    AdvanceBlocked,
    Config,
}

impl IngestionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoFileSelected => ErrorKind::NoFileSelected,
            Self::MultipleFiles { .. } => ErrorKind::MultipleFiles,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::UrlFormat { .. } => ErrorKind::UrlFormat,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::AdvanceBlocked => ErrorKind::AdvanceBlocked,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            io: None,
        }
    }

    /// True when the failure came from reading the source rather than from its content.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Parse { io: Some(_), .. })
    }

    pub(crate) fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }
}

impl From<csv::Error> for IngestionError {
    fn from(err: csv::Error) -> Self {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => io.into(),
            csv::ErrorKind::Utf8 { pos: Some(pos), err } => {
                Self::parse(format!("invalid UTF-8 on line {}: {err}", pos.line()))
            }
            csv::ErrorKind::Utf8 { pos: None, err } => Self::parse(format!("invalid UTF-8: {err}")),
            other => Self::parse(format!("csv error: {other:?}")),
        }
    }
}

impl From<std::io::Error> for IngestionError {
    fn from(err: std::io::Error) -> Self {
        Self::Parse {
            message: format!("failed to read source: {err}"),
            io: Some(Arc::new(err)),
        }
    }
}
