//! Core data model for the ingestion step.
//!
//! Parsing produces a [`ParsedMatrix`] (rows of string cells) plus [`ParseMetadata`]; drafting
//! turns the header row into a [`TransformationConfigDraft`] for the next pipeline stage.

use serde::{Deserialize, Serialize};

/// A single parsed row: ordered string cells.
pub type Row = Vec<String>;

/// Row-oriented in-memory table of string cells.
///
/// Rows are not required to have the same length as the header row; consumers must tolerate
/// short and long rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParsedMatrix {
    /// Row-major cell storage. Row 0 is the header when present.
    pub rows: Vec<Row>,
}

impl ParsedMatrix {
    /// Create a matrix from rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Number of rows, header included.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first row, treated as the header.
    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(|r| r.as_slice())
    }
}

/// Line terminator detected in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LineEnding {
    #[default]
    #[serde(rename = "\n")]
    Lf,
    #[serde(rename = "\r\n")]
    CrLf,
    #[serde(rename = "\r")]
    Cr,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
        }
    }
}

/// Facts detected while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseMetadata {
    /// Field delimiter.
    pub delimiter: char,
    /// Record terminator.
    pub line_ending: LineEnding,
}

/// Provisional descriptor for one column, taken from the header row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDraft {
    pub column_name: String,
}

/// Dialect facts carried forward to the transformation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvProps {
    pub delimiter: char,
}

/// Seed state handed to the transformation stage.
///
/// Serialized with camelCase keys (`sourceFileName`, `csvProps`, `columnConfiguration`, `key`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationConfigDraft {
    /// Display name of the source the draft was built from.
    pub source_file_name: String,
    pub csv_props: CsvProps,
    /// One entry per header cell, positionally aligned with the matrix columns.
    pub column_configuration: Vec<ColumnDraft>,
    /// Primary-key column chosen downstream. Always unset on a fresh draft.
    pub key: Option<String>,
}

impl TransformationConfigDraft {
    /// Iterate column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.column_configuration.iter().map(|c| c.column_name.as_str())
    }
}
