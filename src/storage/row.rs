//! Pipe-delimited ledger rows
//!
//! Rows are `id|timestamp|kind|text`, written and read with the `csv` crate
//! using `|` as the delimiter. Fields are quoted only when they need it, so
//! files written by other CSV writers with the same delimiter read back.

use crate::storage::{Kind, Record};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use csv::{ReaderBuilder, StringRecord, Terminator, WriterBuilder};
use serde::Deserialize;
use std::io::Read;

const DELIMITER: u8 = b'|';
const FIELDS: usize = 4;

/// One ledger row as stored, before any field is interpreted
#[derive(Debug, Deserialize)]
struct Row {
    id: String,
    timestamp: String,
    kind: String,
    text: String,
}

/// Reader over ledger rows; rows of any width are yielded
pub(crate) fn reader<R: Read>(source: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_reader(source)
}

/// Encodes a record as one ledger line, including the trailing newline
pub fn encode_record(record: &Record) -> Result<String, csv::Error> {
    let timestamp = record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut writer = WriterBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record([
        record.id.as_str(),
        timestamp.as_str(),
        record.kind.to_code(),
        record.text.as_str(),
    ])?;

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parses a stored timestamp
///
/// RFC 3339 is what this crate writes; naive ISO timestamps from older
/// ledgers are read as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Interprets one row read from a ledger file
pub(crate) fn record_from_row(row: &StringRecord) -> Result<Record, String> {
    if row.len() != FIELDS {
        return Err(format!("expected {} fields, found {}", FIELDS, row.len()));
    }
    let row: Row = row.deserialize(None).map_err(|e| e.to_string())?;

    if row.id.is_empty() {
        return Err("empty identifier".to_string());
    }

    let timestamp = parse_timestamp(&row.timestamp)
        .ok_or_else(|| format!("bad timestamp '{}'", row.timestamp))?;
    let kind = Kind::from_code(&row.kind).ok_or_else(|| format!("bad kind '{}'", row.kind))?;

    Ok(Record {
        id: row.id,
        timestamp,
        kind,
        text: row.text,
    })
}

/// Decodes a single ledger line
pub fn decode_record(line: &str) -> Result<Record, String> {
    let mut row = StringRecord::new();
    match reader(line.as_bytes()).read_record(&mut row) {
        Ok(true) => record_from_row(&row),
        Ok(false) => Err("empty row".to_string()),
        Err(e) => Err(e.to_string()),
    }
}
