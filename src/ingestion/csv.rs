//! Delimited-text parsing.
//!
//! Rules:
//!
//! - The field delimiter is inferred from the input (see [`detect_delimiter`]).
//! - The line ending is inferred from the input (see [`detect_line_ending`]).
//! - Empty lines are skipped greedily: a record whose cells are all blank after trimming
//!   (`""`, `"   "`, `",,"`) is dropped.
//! - Malformed quoting and unreadable input reject the whole input; no partial matrix is
//!   returned.
//! - Empty input yields a zero-row matrix, not an error.

use std::borrow::Cow;
use std::ops::Range;
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{LineEnding, ParseMetadata, ParsedMatrix, Row};

/// Delimiters tried during detection, in order of preference.
pub const DELIMITER_CANDIDATES: [char; 6] = [',', '\t', '|', ';', '\u{1E}', '\u{1F}'];

/// Delimiter used when no candidate yields at least two fields per row.
pub const DEFAULT_DELIMITER: char = ',';

const PREVIEW_RECORDS: usize = 10;
const LINE_ENDING_SAMPLE_BYTES: usize = 1024 * 1024;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Result of a successful parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCsv {
    pub matrix: ParsedMatrix,
    pub meta: ParseMetadata,
}

/// Parse raw delimited text into a [`ParsedMatrix`].
pub fn parse_csv(input: &[u8]) -> IngestionResult<ParsedCsv> {
    let text = decode_utf8(input)?;
    let line_ending = detect_line_ending(text);
    let delimiter = detect_delimiter(text);
    let text = check_quoting(text, delimiter)?;

    let rows = read_rows(&text, delimiter)?;
    debug!(
        delimiter = ?delimiter,
        line_ending = ?line_ending,
        rows = rows.len(),
        "parsed delimited input"
    );

    Ok(ParsedCsv {
        matrix: ParsedMatrix::new(rows),
        meta: ParseMetadata {
            delimiter,
            line_ending,
        },
    })
}

/// Read a file from disk and parse it with [`parse_csv`].
pub fn parse_csv_from_path(path: impl AsRef<Path>) -> IngestionResult<ParsedCsv> {
    let bytes = std::fs::read(path)?;
    parse_csv(&bytes)
}

/// Run [`parse_csv`] on the blocking thread pool so the calling task is not stalled by large
/// inputs.
pub async fn parse_csv_in_background(input: Vec<u8>) -> IngestionResult<ParsedCsv> {
    tokio::task::spawn_blocking(move || parse_csv(&input))
        .await
        .map_err(|e| IngestionError::parse(format!("parser task failed: {e}")))?
}

/// Infer the field delimiter.
///
/// Each candidate splits a preview of the first non-blank records. Candidates averaging fewer
/// than two fields per row are discarded; among the rest the one whose field count varies least
/// between consecutive rows wins, then the one with more fields, then the earlier candidate.
pub fn detect_delimiter(text: &str) -> char {
    let mut best: Option<(char, usize, f64)> = None;

    for &candidate in &DELIMITER_CANDIDATES {
        let Some((delta, avg)) = preview_consistency(text, candidate) else {
            continue;
        };
        if avg < 2.0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, best_delta, best_avg)) => delta < best_delta || (delta == best_delta && avg > best_avg),
        };
        if better {
            best = Some((candidate, delta, avg));
        }
    }

    best.map(|(d, _, _)| d).unwrap_or(DEFAULT_DELIMITER)
}

/// Returns `(delta, average field count)` over the preview, or `None` when the preview has no
/// usable rows.
fn preview_consistency(text: &str, delimiter: char) -> Option<(usize, f64)> {
    let mut rdr = reader_for(text, delimiter);
    let mut counts: Vec<usize> = Vec::with_capacity(PREVIEW_RECORDS);

    for result in rdr.records() {
        let Ok(record) = result else { break };
        if is_blank(&record) {
            continue;
        }
        counts.push(record.len());
        if counts.len() == PREVIEW_RECORDS {
            break;
        }
    }

    if counts.is_empty() {
        return None;
    }
    let delta = counts.windows(2).map(|w| w[0].abs_diff(w[1])).sum();
    let avg = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
    Some((delta, avg))
}

/// Infer the record terminator from the first MiB of input. Line breaks inside quoted
/// fields are ignored.
pub fn detect_line_ending(text: &str) -> LineEnding {
    let stripped = unquoted(&text.as_bytes()[..text.len().min(LINE_ENDING_SAMPLE_BYTES)]);
    let sample = stripped.as_slice();

    let first_cr = sample.iter().position(|&b| b == b'\r');
    let first_lf = sample.iter().position(|&b| b == b'\n');
    let Some(first_cr) = first_cr else {
        return LineEnding::Lf;
    };
    if first_lf.is_some_and(|lf| lf < first_cr) {
        return LineEnding::Lf;
    }

    let mut crs = 0usize;
    let mut crlfs = 0usize;
    for (i, &b) in sample.iter().enumerate() {
        if b == b'\r' {
            crs += 1;
            if sample.get(i + 1) == Some(&b'\n') {
                crlfs += 1;
            }
        }
    }
    if crlfs * 2 >= crs {
        LineEnding::CrLf
    } else {
        LineEnding::Cr
    }
}

/// `bytes` with every `"…"` span removed. Doubled quotes close and reopen, which removes the
/// same bytes.
fn unquoted(bytes: &[u8]) -> Vec<u8> {
    let mut in_quotes = false;
    bytes
        .iter()
        .copied()
        .filter(|&b| {
            if b == b'"' {
                in_quotes = !in_quotes;
                return false;
            }
            !in_quotes
        })
        .collect()
}

fn decode_utf8(input: &[u8]) -> IngestionResult<&str> {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    std::str::from_utf8(input).map_err(|e| {
        let line = input[..e.valid_up_to()].iter().filter(|&&b| b == b'\n').count() + 1;
        IngestionError::parse(format!("invalid UTF-8 on line {line}: {e}"))
    })
}

/// Reject quoted fields that never close, or whose closing quote is followed by anything other
/// than a delimiter, a line break or the end of input.
///
/// Spaces and tabs between a closing quote and the delimiter or line break are tolerated and
/// removed from the returned text.
fn check_quoting(text: &str, delimiter: char) -> IngestionResult<Cow<'_, str>> {
    let mut line = 1usize;
    let mut field_start = true;
    let mut quoted_since: Option<usize> = None;
    let mut padding: Vec<Range<usize>> = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(opened) = quoted_since {
            match c {
                '"' => {
                    if chars.peek().is_some_and(|&(_, next)| next == '"') {
                        chars.next();
                        continue;
                    }
                    let pad = i + 1;
                    let mut pad_end = pad;
                    while let Some(&(j, next)) = chars.peek() {
                        if !is_padding(next, delimiter) {
                            break;
                        }
                        chars.next();
                        pad_end = j + next.len_utf8();
                    }
                    match chars.peek().map(|&(_, next)| next) {
                        None | Some('\r') | Some('\n') => {}
                        Some(next) if next == delimiter => {}
                        Some(next) => {
                            return Err(IngestionError::parse(format!(
                                "malformed quoted field on line {line}: unexpected {next:?} after closing quote \
                                 (field opened on line {opened})"
                            )));
                        }
                    }
                    if pad_end > pad {
                        padding.push(pad..pad_end);
                    }
                    quoted_since = None;
                }
                '\n' => line += 1,
                '\r' if chars.peek().map(|&(_, next)| next) != Some('\n') => line += 1,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if field_start => {
                quoted_since = Some(line);
                field_start = false;
            }
            '\n' => {
                line += 1;
                field_start = true;
            }
            '\r' => {
                if chars.peek().map(|&(_, next)| next) != Some('\n') {
                    line += 1;
                }
                field_start = true;
            }
            c if c == delimiter => field_start = true,
            _ => field_start = false,
        }
    }

    if let Some(opened) = quoted_since {
        return Err(IngestionError::parse(format!(
            "unterminated quoted field starting on line {opened}"
        )));
    }
    if padding.is_empty() {
        return Ok(Cow::Borrowed(text));
    }

    let mut trimmed = String::with_capacity(text.len());
    let mut last = 0;
    for span in padding {
        trimmed.push_str(&text[last..span.start]);
        last = span.end;
    }
    trimmed.push_str(&text[last..]);
    Ok(Cow::Owned(trimmed))
}

fn is_padding(c: char, delimiter: char) -> bool {
    (c == ' ' || c == '\t') && c != delimiter
}

fn read_rows(text: &str, delimiter: char) -> IngestionResult<Vec<Row>> {
    let mut rdr = reader_for(text, delimiter);
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if is_blank(&record) {
            continue;
        }
        rows.push(record.iter().map(str::to_owned).collect());
    }
    Ok(rows)
}

fn reader_for(text: &str, delimiter: char) -> csv::Reader<&[u8]> {
    // Candidates are all ASCII, so the byte cast is lossless.
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter as u8)
        .from_reader(text.as_bytes())
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(|cell| cell.trim().is_empty())
}
