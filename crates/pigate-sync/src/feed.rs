//! Tabular credential feed.
//!
//! The property-management export is comma separated with a header row. Only
//! three columns matter:
//!
//! | Column | Meaning |
//! |--------|---------|
//! | `Resident` | username |
//! | `DEVICE#` | gate code |
//! | `SL` | status, `00` = locked out |
//!
//! Fields may be double-quoted; inside quotes `""` is a literal quote and
//! commas and line breaks are data. Rows without a code are skipped, and
//! when a code repeats the first row wins.

use crate::error::FeedError;
use pigate_core::Code;
use pigate_core::Credential;
use pigate_core::constants::{
    FEED_COLUMN_DEVICE, FEED_COLUMN_RESIDENT, FEED_COLUMN_STATUS, LOCKED_OUT_SENTINEL,
};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Parse feed text into feed-owned credentials in `access_group`.
///
/// # Errors
///
/// `FeedError::Empty` without a header row, `FeedError::MissingColumn` when a
/// required column is absent, `FeedError::Malformed` for an unterminated
/// quoted field.
///
/// # Examples
///
/// ```
/// use pigate_sync::feed::parse_feed;
///
/// let text = "Unit,Resident,DEVICE#,SL\n\
///             1A,\"Doe, Jane\",12345,01\n\
///             1B,John Roe,54321,00\n";
/// let credentials = parse_feed(text, 1).unwrap();
///
/// assert_eq!(credentials.len(), 2);
/// assert_eq!(credentials[0].username, "Doe, Jane");
/// assert!(credentials[1].locked_out);
/// ```
pub fn parse_feed(text: &str, access_group: i64) -> Result<Vec<Credential>, FeedError> {
    let mut records = split_records(text)?.into_iter();

    let header = records.next().ok_or(FeedError::Empty)?;
    let column = |name: &'static str| {
        header
            .iter()
            .position(|cell| cell.trim() == name)
            .ok_or(FeedError::MissingColumn(name))
    };
    let resident = column(FEED_COLUMN_RESIDENT)?;
    let device = column(FEED_COLUMN_DEVICE)?;
    let status = column(FEED_COLUMN_STATUS)?;

    let mut seen = HashSet::new();
    let mut credentials = Vec::new();
    let mut skipped = 0usize;

    for (index, record) in records.enumerate() {
        let field = |i: usize| record.get(i).map(|s| s.trim()).unwrap_or("");

        let Ok(code) = Code::new(field(device)) else {
            debug!(row = index + 2, "Skipping feed row without code");
            skipped += 1;
            continue;
        };

        if !seen.insert(code.as_str().to_string()) {
            warn!(row = index + 2, code = %code, "Duplicate code in feed, keeping first");
            skipped += 1;
            continue;
        }

        let locked_out = field(status) == LOCKED_OUT_SENTINEL;
        credentials.push(
            Credential::new(code, field(resident), access_group)
                .locked_out(locked_out)
                .auto_update(true),
        );
    }

    info!(credentials = credentials.len(), skipped, "Parsed credential feed");
    Ok(credentials)
}

/// Read and parse a feed file.
pub async fn parse_feed_file(
    path: impl AsRef<Path>,
    access_group: i64,
) -> Result<Vec<Credential>, FeedError> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    parse_feed(&text, access_group)
}

/// Split text into records of fields. Blank lines are dropped.
fn split_records(text: &str) -> Result<Vec<Vec<String>>, FeedError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quote_line = line;
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(FeedError::Malformed {
            line: quote_line,
            message: "unterminated quoted field".to_string(),
        });
    }

    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        push_record(&mut records, record);
    }

    Ok(records)
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.iter().all(|f| f.trim().is_empty());
    if !blank {
        records.push(record);
    }
}
