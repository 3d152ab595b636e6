//! Header-to-configuration drafting.

use crate::types::{ColumnDraft, CsvProps, ParsedMatrix, TransformationConfigDraft};

/// Build the draft configuration for the transformation stage.
///
/// Row 0 of `matrix` is the header: each cell becomes one [`ColumnDraft`], in order, duplicates
/// and blanks included. `key` is always unset. A zero-row matrix produces an empty column list;
/// the controller never drafts one.
pub fn draft(matrix: &ParsedMatrix, delimiter: char, source_name: &str) -> TransformationConfigDraft {
    let column_configuration = matrix
        .header()
        .unwrap_or_default()
        .iter()
        .map(|header| ColumnDraft {
            column_name: header.clone(),
        })
        .collect();

    TransformationConfigDraft {
        source_file_name: source_name.to_string(),
        csv_props: CsvProps { delimiter },
        column_configuration,
        key: None,
    }
}
