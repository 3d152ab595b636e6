//! Source acquisition: file-selection events, bundled example text and URL input.

use std::fmt;
use std::path::Path;

use url::Url;

use crate::error::{IngestionError, IngestionResult};

/// Message shown when a URL string does not parse.
pub const INVALID_URL_MESSAGE: &str = "Looks like an invalid URL.";

/// A file handed over by a selection event: display name plus raw content.
#[derive(Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub content: Vec<u8>,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a file from disk. The display name is the file name component of `path`.
    pub fn from_path(path: impl AsRef<Path>) -> IngestionResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, content })
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("content_len", &self.content.len())
            .finish()
    }
}

/// The one source selected for the current ingestion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingSource {
    /// A locally selected (or bundled example) file.
    LocalFile { name: String, content: Vec<u8> },
    /// A remote resource to fetch before parsing.
    RemoteUrl(Url),
}

impl PendingSource {
    /// Name shown to the user and recorded in the draft configuration.
    pub fn display_name(&self) -> String {
        match self {
            Self::LocalFile { name, .. } => name.clone(),
            Self::RemoteUrl(url) => display_name_for_url(url),
        }
    }
}

impl From<FileHandle> for PendingSource {
    fn from(handle: FileHandle) -> Self {
        Self::LocalFile {
            name: handle.name,
            content: handle.content,
        }
    }
}

/// Accept a file-selection event. Exactly one handle must be present.
pub fn select_local_file(handles: Vec<FileHandle>) -> IngestionResult<PendingSource> {
    let count = handles.len();
    let mut handles = handles.into_iter();
    match (handles.next(), count) {
        (None, _) => Err(IngestionError::NoFileSelected),
        (Some(handle), 1) => Ok(handle.into()),
        (Some(_), count) => Err(IngestionError::MultipleFiles { count }),
    }
}

/// Wrap bundled example text so it flows through the same path as a selected file.
pub fn example_source(text: impl Into<Vec<u8>>, name: impl Into<String>) -> PendingSource {
    PendingSource::LocalFile {
        name: name.into(),
        content: text.into(),
    }
}

/// Last non-empty path segment of `url`, falling back to the host, then the full URL.
pub fn display_name_for_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(str::to_owned)
        .or_else(|| url.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_string())
}

/// Free-text URL field state.
///
/// Holds the last accepted URL and the last recoverable error shown next to the field. A
/// rejected string never replaces an accepted URL.
#[derive(Debug, Clone, Default)]
pub struct UrlInput {
    accepted: Option<Url>,
    error: Option<String>,
}

impl UrlInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `raw` and, if it is a well-formed URL, make it the accepted URL.
    pub fn set_remote_url(&mut self, raw: &str) -> IngestionResult<&Url> {
        match Url::parse(raw.trim()) {
            Ok(url) => {
                self.error = None;
                let url = self.accepted.insert(url);
                Ok(&*url)
            }
            Err(e) => {
                tracing::debug!(input = raw, error = %e, "rejected url input");
                self.error = Some(INVALID_URL_MESSAGE.to_string());
                Err(IngestionError::UrlFormat {
                    input: raw.to_string(),
                    message: INVALID_URL_MESSAGE.to_string(),
                })
            }
        }
    }

    pub fn accepted(&self) -> Option<&Url> {
        self.accepted.as_ref()
    }

    /// Error to display next to the URL field, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Record a fetch failure for display.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// The accepted URL as a pending source, if one has been accepted.
    pub fn pending_source(&self) -> Option<PendingSource> {
        self.accepted.clone().map(PendingSource::RemoteUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_requires_exactly_one_file() {
        let err = select_local_file(Vec::new()).unwrap_err();
        assert!(matches!(err, IngestionError::NoFileSelected));

        let err = select_local_file(vec![FileHandle::new("a.csv", "x"), FileHandle::new("b.csv", "y")])
            .unwrap_err();
        assert!(matches!(err, IngestionError::MultipleFiles { count: 2 }));

        let src = select_local_file(vec![FileHandle::new("a.csv", "x,y")]).unwrap();
        assert_eq!(src.display_name(), "a.csv");
    }

    #[test]
    fn invalid_url_keeps_previous_one() {
        let mut input = UrlInput::new();
        input.set_remote_url("https://example.com/data/people.csv").unwrap();

        let err = input.set_remote_url("not a url").unwrap_err();
        assert!(matches!(err, IngestionError::UrlFormat { .. }));
        assert_eq!(input.error(), Some(INVALID_URL_MESSAGE));
        assert_eq!(
            input.accepted().map(Url::as_str),
            Some("https://example.com/data/people.csv")
        );

        input.set_remote_url("https://example.com/other.csv").unwrap();
        assert_eq!(input.error(), None);
        assert_eq!(input.accepted().map(Url::as_str), Some("https://example.com/other.csv"));
    }

    #[test]
    fn pending_source_follows_accepted_url() {
        let mut input = UrlInput::new();
        assert_eq!(input.pending_source(), None);

        input.set_remote_url("https://example.com/data/people.csv").unwrap();
        input.set_remote_url("::").unwrap_err();
        let source = input.pending_source().unwrap();
        assert!(matches!(&source, PendingSource::RemoteUrl(url) if url.path() == "/data/people.csv"));
        assert_eq!(source.display_name(), "people.csv");
    }

    #[test]
    fn url_display_names() {
        let url = Url::parse("https://example.com/exports/people.csv?x=1").unwrap();
        assert_eq!(display_name_for_url(&url), "people.csv");

        let url = Url::parse("https://example.com/exports/").unwrap();
        assert_eq!(display_name_for_url(&url), "exports");

        let url = Url::parse("https://example.com").unwrap();
        assert_eq!(display_name_for_url(&url), "example.com");
    }
}
