//! The live bead graph.
//!
//! [`BeadsGraph`] owns the current [`Snapshot`] behind a reader/writer lock.
//! Reads hold the shared lock for one call. [`BeadsGraph::rebuild`] parses
//! and builds a fresh snapshot without holding the lock, then swaps it in
//! under the exclusive lock, so a reader sees either the old graph or the
//! new one in full. A failed rebuild leaves the old snapshot in place.

pub mod query;
pub mod snapshot;

pub use query::{EpicProgress, Filter, QueryPage, Stats, Velocity, priority_bucket};
pub use snapshot::{IndexSizes, Links, Snapshot};

use crate::models::{Bead, Status};
use crate::parser::{self, ParseError, SourceFormat};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

/// Short reference to a related bead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeadRef {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub priority: i64,
}

impl From<&Bead> for BeadRef {
    fn from(bead: &Bead) -> Self {
        Self {
            id: bead.id.clone(),
            title: bead.title.clone(),
            status: bead.status.clone(),
            priority: bead.priority,
        }
    }
}

/// A bead with its resolved relationships.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeadDetail {
    #[serde(flatten)]
    pub bead: Bead,
    pub parent: Option<BeadRef>,
    pub children: Vec<BeadRef>,
    pub blockers: Vec<BeadRef>,
    pub blocked: Vec<BeadRef>,
    pub ready: bool,
}

/// Where the current snapshot came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub source: PathBuf,
    pub format: SourceFormat,
    pub file_size: u64,
    pub last_updated: DateTime<Utc>,
    pub total: usize,
    pub diagnostics: usize,
    pub generation: u64,
}

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub beads: usize,
    pub diagnostics: usize,
    pub generation: u64,
}

/// Lock-guarded, versioned container for the current snapshot.
#[derive(Debug)]
pub struct BeadsGraph {
    source: PathBuf,
    format: SourceFormat,
    state: RwLock<Snapshot>,
}

/// Parse `path` and build the initial graph.
///
/// Without a format hint the format is inferred from the file extension.
pub fn load(path: impl AsRef<Path>, format: Option<SourceFormat>) -> Result<BeadsGraph> {
    BeadsGraph::load(path, format)
}

impl BeadsGraph {
    pub fn load(path: impl AsRef<Path>, format: Option<SourceFormat>) -> Result<Self> {
        let source = path.as_ref().to_path_buf();
        let format = format.unwrap_or_else(|| SourceFormat::from_path(&source));
        let snapshot = Self::build_snapshot(&source, format)?;

        tracing::info!(
            path = %source.display(),
            %format,
            beads = snapshot.len(),
            diagnostics = snapshot.diagnostics().len(),
            "loaded beads"
        );
        Ok(Self {
            source,
            format,
            state: RwLock::new(snapshot),
        })
    }

    fn build_snapshot(source: &Path, format: SourceFormat) -> Result<Snapshot> {
        let result = parser::parse(source, format)?;
        Ok(Snapshot::build(result, source, Utc::now()))
    }

    /// Re-parse the same source with the same format and swap the result in.
    pub fn rebuild(&self) -> Result<RebuildReport> {
        let mut snapshot = Self::build_snapshot(&self.source, self.format)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        snapshot.generation = state.generation + 1;
        let report = RebuildReport {
            beads: snapshot.len(),
            diagnostics: snapshot.diagnostics().len(),
            generation: snapshot.generation,
        };
        *state = snapshot;
        drop(state);

        tracing::info!(
            beads = report.beads,
            diagnostics = report.diagnostics,
            generation = report.generation,
            "rebuilt graph"
        );
        Ok(report)
    }

    /// Shared access to the current snapshot for a multi-step read.
    pub fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn generation(&self) -> u64 {
        self.read().generation()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Look up one bead with its relationships. `None` means not found.
    pub fn get(&self, id: &str) -> Option<BeadDetail> {
        let snap = self.read();
        let idx = snap.index_of(id)?;
        let refs = |beads: Vec<&Bead>| -> Vec<BeadRef> { beads.into_iter().map(BeadRef::from).collect() };
        Some(BeadDetail {
            bead: snap.beads()[idx].clone(),
            parent: snap.parent(id).map(BeadRef::from),
            children: refs(snap.children(id)),
            blockers: refs(snap.blockers(id)),
            blocked: refs(snap.blocked(id)),
            ready: snap.is_ready_idx(idx, Utc::now()),
        })
    }

    pub fn query(&self, filter: &Filter) -> QueryPage {
        self.read().query_at(filter, Utc::now())
    }

    pub fn stats(&self) -> Stats {
        self.read().stats_at(Utc::now())
    }

    pub fn epics(&self) -> Vec<EpicProgress> {
        self.read().epics()
    }

    /// Readiness of one bead against the live snapshot.
    pub fn is_ready(&self, id: &str) -> Option<bool> {
        self.read().is_ready_at(id, Utc::now())
    }

    pub fn diagnostics(&self) -> Vec<ParseError> {
        self.read().diagnostics().to_vec()
    }

    pub fn provenance(&self) -> Provenance {
        let snap = self.read();
        Provenance {
            source: self.source.clone(),
            format: self.format,
            file_size: snap.file_size(),
            last_updated: snap.last_updated(),
            total: snap.len(),
            diagnostics: snap.diagnostics().len(),
            generation: snap.generation(),
        }
    }
}
