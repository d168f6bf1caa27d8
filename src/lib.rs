//! seeBeads - a live, queryable graph of Beads issues.
//!
//! This library ingests a Beads data file (line-delimited JSON or a SQLite
//! database), resolves parent/child and blocker relationships into an
//! in-memory graph, keeps that graph in sync with the file as it changes,
//! and fans change notifications out to any number of subscribers.

pub mod cli;
pub mod commands;
pub mod config;
pub mod graph;
pub mod hub;
pub mod models;
pub mod parser;
pub mod watcher;

pub use graph::{BeadsGraph, Filter, QueryPage, Stats, load};
pub use hub::{Event, EventKind, Hub};
pub use parser::SourceFormat;
pub use watcher::{WatchMode, WatcherHandle, start_watcher};

use std::path::PathBuf;

/// Library-level error type for seeBeads operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cannot read source {}: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No issues table found in {} (available: {available:?})", path.display())]
    NoIssuesTable { path: PathBuf, available: Vec<String> },

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for seeBeads operations.
pub type Result<T> = std::result::Result<T, Error>;
