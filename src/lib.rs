//! `csv-ingest` is the ingestion step of a tabular data pipeline: it turns a delimited-text
//! source (a selected file, bundled example text, or a URL) into a [`types::ParsedMatrix`] of
//! string cells plus a [`types::TransformationConfigDraft`] that seeds the next stage.
//!
//! The primary entrypoint is [`ingestion::IngestionController`]. It gates the next stage: advancing
//! is allowed only once a matrix and its draft configuration have been committed.
//!
//! ## Parsing rules
//!
//! - The delimiter is detected (`,` `\t` `|` `;` and the ASCII record/unit separators).
//! - The line ending is detected (`\n`, `\r\n`, `\r`).
//! - Blank lines are skipped greedily, including lines holding only delimiters or whitespace.
//! - Malformed quoting and invalid UTF-8 fail the whole parse; nothing is partially committed.
//! - Empty input parses to zero rows, which never reaches `Ready`.
//!
//! ## Quick example: parse and draft
//!
//! ```rust
//! use csv_ingest::ingestion::{draft, parse_csv};
//!
//! let parsed = parse_csv(b"name,age\nAlice,30\nBob,25\n").unwrap();
//! assert_eq!(parsed.meta.delimiter, ',');
//! assert_eq!(parsed.matrix.row_count(), 3);
//!
//! let config = draft(&parsed.matrix, parsed.meta.delimiter, "people.csv");
//! assert_eq!(config.column_names().collect::<Vec<_>>(), vec!["name", "age"]);
//! assert!(config.key.is_none());
//! ```
//!
//! ## Controller example
//!
//! ```rust
//! use csv_ingest::ingestion::{FileHandle, IngestionController, IngestionOptions, IngestionPhase};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), csv_ingest::IngestionError> {
//! let mut controller = IngestionController::new(IngestionOptions::default())?;
//! assert!(!controller.can_advance());
//!
//! let phase = controller
//!     .ingest_files(vec![FileHandle::new("scores.csv", "team;score\nred;3\nblue;5\n")])
//!     .await?;
//! assert_eq!(phase, IngestionPhase::Ready);
//! assert!(controller.can_advance());
//!
//! let config = controller.shared_state().transformation_config().unwrap();
//! assert_eq!(config.csv_props.delimiter, ';');
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: controller, parser, drafter, source acquisition, remote fetch, observability
//! - [`types`]: matrix and draft-configuration types
//! - [`error`]: error types used across ingestion

pub mod error;
pub mod ingestion;
pub mod types;

pub use error::{ErrorKind, IngestionError, IngestionResult};
