//! Ingestion entrypoints and implementations.
//!
//! Most callers drive an [`IngestionController`], which:
//!
//! - accepts a file-selection event, bundled example text, or a URL
//! - parses the source off the calling task (see [`csv`])
//! - drafts the column configuration from the header row (see [`draft`])
//! - commits both into [`SharedPipelineState`] and gates advancing to the next step
//! - reports success/failure/alerts to an optional [`IngestionObserver`]
//!
//! The building blocks are also usable on their own:
//! - [`csv`]: delimiter/line-ending detection and parsing
//! - [`source`]: file selection and URL input
//! - [`fetch`]: remote retrieval

pub mod controller;
pub mod csv;
pub mod draft;
pub mod fetch;
pub mod observability;
pub mod options;
pub mod source;

pub use controller::{
    ApplyOutcome, CommittedIngestion, IngestionController, IngestionPhase, IngestionState, Navigation,
    ParseCompletion, ParseJob, SharedPipelineState, INGESTION_STEP,
};
pub use self::csv::{detect_delimiter, detect_line_ending, parse_csv, parse_csv_in_background, ParsedCsv};
pub use draft::draft;
pub use fetch::RemoteFetcher;
pub use observability::{
    init_tracing, CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity,
    IngestionStats, TracingObserver,
};
pub use options::IngestionOptions;
pub use source::{example_source, select_local_file, FileHandle, PendingSource, UrlInput};
