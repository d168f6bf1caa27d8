//! Record parsers for Beads data sources.
//!
//! Two encodings are supported and the caller picks one:
//! - [`SourceFormat::Jsonl`] - one JSON record per line (`issues.jsonl`)
//! - [`SourceFormat::Sqlite`] - a SQLite database with an inferred schema (`beads.db`)
//!
//! Both produce a [`ParseResult`]: the parsed beads plus recoverable,
//! per-record [`ParseError`]s. Only an unreadable source (or, for SQLite,
//! a database without any candidate table) fails the whole parse.

pub mod jsonl;
pub mod sqlite;

use crate::models::Bead;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// On-disk encoding of a Beads source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jsonl,
    Sqlite,
}

impl SourceFormat {
    /// Infer the format from the file extension.
    ///
    /// `.db`, `.sqlite` and `.sqlite3` are SQLite; everything else is JSONL.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("db" | "sqlite" | "sqlite3") => SourceFormat::Sqlite,
            _ => SourceFormat::Jsonl,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Jsonl => "jsonl",
            SourceFormat::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "json" => Ok(SourceFormat::Jsonl),
            "sqlite" | "db" => Ok(SourceFormat::Sqlite),
            _ => Err(format!("Unknown source format: {}", s)),
        }
    }
}

/// Where in the source a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "index", rename_all = "lowercase")]
pub enum RecordLocation {
    /// 1-based line number in a JSONL file
    Line(usize),
    /// 1-based row number in a query result
    Row(usize),
}

impl fmt::Display for RecordLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordLocation::Line(n) => write!(f, "line {}", n),
            RecordLocation::Row(n) => write!(f, "row {}", n),
        }
    }
}

/// A recoverable problem with a single record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{location}: {message}")]
pub struct ParseError {
    pub location: RecordLocation,
    pub message: String,
}

impl ParseError {
    pub fn new(location: RecordLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }
}

/// Output of one parse pass.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    /// Beads in source order, unique by ID, tombstones removed
    pub beads: Vec<Bead>,
    /// Per-record diagnostics, in source order
    pub errors: Vec<ParseError>,
    /// Source size in bytes at the time it was read
    pub file_size: u64,
}

impl ParseResult {
    /// Assemble a result from located records.
    ///
    /// Duplicate IDs are resolved last-seen-wins: each earlier copy is
    /// removed and reported as a diagnostic at its own location. Tombstoned
    /// beads are dropped after duplicate resolution, so a tombstone that
    /// supersedes a live record removes the ID entirely.
    pub fn from_records(
        records: Vec<(RecordLocation, Bead)>,
        mut errors: Vec<ParseError>,
        file_size: u64,
    ) -> Self {
        let mut last_seen: HashMap<&str, usize> = HashMap::with_capacity(records.len());
        for (idx, (_, bead)) in records.iter().enumerate() {
            last_seen.insert(bead.id.as_str(), idx);
        }

        let mut superseded = Vec::new();
        for (idx, (location, bead)) in records.iter().enumerate() {
            if let Some(&winner) = last_seen.get(bead.id.as_str()) {
                if winner != idx {
                    let winner_location = records[winner].0;
                    superseded.push(ParseError::new(
                        *location,
                        format!(
                            "duplicate id '{}' superseded by {}",
                            bead.id, winner_location
                        ),
                    ));
                }
            }
        }
        let keep: Vec<bool> = records
            .iter()
            .enumerate()
            .map(|(idx, (_, bead))| last_seen.get(bead.id.as_str()) == Some(&idx))
            .collect();
        drop(last_seen);

        errors.extend(superseded);
        errors.sort_by_key(|e| match e.location {
            RecordLocation::Line(n) | RecordLocation::Row(n) => n,
        });

        let beads = records
            .into_iter()
            .zip(keep)
            .filter(|((_, bead), keep)| *keep && !bead.is_tombstone())
            .map(|((_, bead), _)| bead)
            .collect();

        Self {
            beads,
            errors,
            file_size,
        }
    }
}

/// Parse the source at `path` using the given encoding.
pub fn parse(path: &Path, format: SourceFormat) -> Result<ParseResult> {
    match format {
        SourceFormat::Jsonl => jsonl::parse_jsonl(path),
        SourceFormat::Sqlite => sqlite::parse_sqlite(path),
    }
}

/// Stat the source, mapping failure to [`Error::SourceUnavailable`].
pub(crate) fn source_size(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| Error::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })
}
