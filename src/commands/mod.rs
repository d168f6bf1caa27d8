//! Command implementations for the seeBeads CLI.
//!
//! Each command returns a result type implementing [`Output`], which the
//! binary prints as JSON (default) or as human-readable text (`-H`).

use crate::config::{self, ConfigOverrides, Settings};
use crate::graph::{BeadDetail, BeadsGraph, EpicProgress, Filter, Provenance, QueryPage, Stats};
use crate::hub::{Event, Hub};
use crate::models::{Bead, BeadType, Status};
use crate::parser::ParseError;
use crate::watcher::start_watcher_with;
use crate::{Error, Result, SourceFormat};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
}

/// Where the data file lives and how to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLocation {
    pub beads_dir: Option<PathBuf>,
    pub data_path: PathBuf,
    pub format: SourceFormat,
}

/// Resolve the data file: an explicit `--data` path, else discovery from `dir`.
pub fn locate(
    dir: &Path,
    data: Option<&Path>,
    format: Option<SourceFormat>,
) -> Result<DataLocation> {
    let (beads_dir, data_path) = match data {
        Some(path) => (config::find_beads_dir(dir).ok(), dir.join(path)),
        None => {
            let beads_dir = config::find_beads_dir(dir)?;
            let data_path = config::find_data_path(&beads_dir)?;
            (Some(beads_dir), data_path)
        }
    };
    let format = format.unwrap_or_else(|| SourceFormat::from_path(&data_path));
    Ok(DataLocation {
        beads_dir,
        data_path,
        format,
    })
}

/// Load settings from `seebeads.kdl` (if any) and apply CLI overrides.
pub fn load_settings(location: &DataLocation, overrides: &ConfigOverrides) -> Result<Settings> {
    let file = match &location.beads_dir {
        Some(dir) => config::load_config(dir)?,
        None => None,
    };
    Ok(config::resolve_settings(file.as_ref(), overrides))
}

// === stats ===

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult(pub Stats);

impl Output for StatsResult {
    fn to_json(&self) -> String {
        json(&self.0)
    }

    fn to_human(&self) -> String {
        let s = &self.0;
        let mut out = String::new();
        let _ = writeln!(out, "{} beads", s.total);
        let _ = writeln!(
            out,
            "  ready: {}  blocked: {}  stale: {}",
            s.ready, s.blocked, s.stale
        );
        for (label, counts) in [
            ("status", &s.by_status),
            ("type", &s.by_type),
            ("priority", &s.by_priority),
        ] {
            let parts: Vec<String> = counts.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            let _ = writeln!(out, "  {}: {}", label, parts.join(" "));
        }
        let _ = write!(
            out,
            "  last 7 days: {} created, {} closed",
            s.velocity.created, s.velocity.closed
        );
        out
    }
}

pub fn stats(graph: &BeadsGraph) -> StatsResult {
    StatsResult(graph.stats())
}

// === list ===

/// Raw CLI filter values before parsing.
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub statuses: Vec<String>,
    pub types: Vec<String>,
    pub priorities: Vec<i64>,
    pub labels: Vec<String>,
    pub search: Option<String>,
    pub ready: bool,
    pub limit: usize,
    pub offset: usize,
}

impl ListArgs {
    pub fn to_filter(&self) -> Filter {
        Filter {
            statuses: self.statuses.iter().map(|s| Status::parse(s)).collect(),
            types: self.types.iter().map(|t| BeadType::parse(t)).collect(),
            priorities: self.priorities.clone(),
            labels: self.labels.clone(),
            search: self.search.clone(),
            ready: self.ready,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult {
    pub beads: Vec<Bead>,
    pub total: usize,
    pub has_more: bool,
}

impl From<(QueryPage, usize)> for ListResult {
    fn from((page, offset): (QueryPage, usize)) -> Self {
        let has_more = page.has_more(offset);
        Self {
            beads: page.beads,
            total: page.total,
            has_more,
        }
    }
}

fn bead_line(bead: &Bead) -> String {
    format!(
        "[P{}] {} {:<11} {}",
        bead.priority, bead.id, bead.status, bead.title
    )
}

impl Output for ListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.beads.is_empty() {
            return format!("No beads found ({} total matches)", self.total);
        }
        let mut lines: Vec<String> = self.beads.iter().map(bead_line).collect();
        lines.push(format!(
            "{} of {} shown{}",
            self.beads.len(),
            self.total,
            if self.has_more { " (more available)" } else { "" }
        ));
        lines.join("\n")
    }
}

pub fn list(graph: &BeadsGraph, args: &ListArgs) -> ListResult {
    let filter = args.to_filter();
    ListResult::from((graph.query(&filter), filter.offset))
}

// === show ===

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult(pub BeadDetail);

impl Output for ShowResult {
    fn to_json(&self) -> String {
        json(&self.0)
    }

    fn to_human(&self) -> String {
        let d = &self.0;
        let b = &d.bead;
        let mut out = String::new();
        let _ = writeln!(out, "{}: {}", b.id, b.title);
        let _ = writeln!(
            out,
            "  {} {} P{}{}",
            b.issue_type,
            b.status,
            b.priority,
            if d.ready { " (ready)" } else { "" }
        );
        if let Some(assignee) = &b.assignee {
            let _ = writeln!(out, "  assignee: {}", assignee);
        }
        if !b.labels.is_empty() {
            let _ = writeln!(out, "  labels: {}", b.labels.join(", "));
        }
        if let Some(parent) = &d.parent {
            let _ = writeln!(out, "  parent: {} {}", parent.id, parent.title);
        }
        for (heading, refs) in [
            ("children", &d.children),
            ("blocked by", &d.blockers),
            ("blocks", &d.blocked),
        ] {
            if refs.is_empty() {
                continue;
            }
            let _ = writeln!(out, "  {}:", heading);
            for r in refs {
                let _ = writeln!(out, "    {} [{}] {}", r.id, r.status, r.title);
            }
        }
        if !b.description.is_empty() {
            let _ = writeln!(out, "\n{}", b.description);
        }
        out.trim_end().to_string()
    }
}

pub fn show(graph: &BeadsGraph, id: &str) -> Result<ShowResult> {
    graph
        .get(id)
        .map(ShowResult)
        .ok_or_else(|| Error::NotFound(format!("bead {}", id)))
}

// === epics ===

#[derive(Debug, Clone, Serialize)]
pub struct EpicsResult {
    pub epics: Vec<EpicProgress>,
}

impl Output for EpicsResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.epics.is_empty() {
            return "No epics".to_string();
        }
        self.epics
            .iter()
            .map(|e| {
                format!(
                    "{} {} ({}/{} closed, {:.0}%)",
                    e.bead.id,
                    e.bead.title,
                    e.closed_children,
                    e.total_children,
                    e.percent() * 100.0
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn epics(graph: &BeadsGraph) -> EpicsResult {
    EpicsResult {
        epics: graph.epics(),
    }
}

// === health ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResult {
    pub status: &'static str,
    pub file_name: String,
    #[serde(flatten)]
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ParseError>>,
}

impl Output for HealthResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let p = &self.provenance;
        let mut out = format!(
            "{} ({}, {} bytes)\n  {} beads, {} diagnostics, generation {}\n  last rebuild: {}",
            self.file_name,
            p.format,
            p.file_size,
            p.total,
            p.diagnostics,
            p.generation,
            p.last_updated.to_rfc3339()
        );
        for err in self.errors.iter().flatten() {
            let _ = write!(out, "\n  {}", err);
        }
        out
    }
}

pub fn health(graph: &BeadsGraph, include_diagnostics: bool) -> HealthResult {
    let provenance = graph.provenance();
    let file_name = provenance
        .source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    HealthResult {
        status: "ok",
        file_name,
        provenance,
        errors: include_diagnostics.then(|| graph.diagnostics()),
    }
}

// === config ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResult {
    pub config_file: Option<PathBuf>,
    pub settings: Settings,
    /// The resolved settings rendered as `seebeads.kdl`.
    pub effective_kdl: String,
}

impl Output for ConfigResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let s = &self.settings;
        let mut out = match &self.config_file {
            Some(path) => format!("config file: {}\n", path.display()),
            None => "config file: (none)\n".to_string(),
        };
        let rows: [(&str, String, String); 6] = [
            ("agent-mode", s.agent_mode.value.to_string(), s.agent_mode.source.to_string()),
            ("debounce-ms", s.debounce_ms.value.to_string(), s.debounce_ms.source.to_string()),
            (
                "agent-debounce-ms",
                s.agent_debounce_ms.value.to_string(),
                s.agent_debounce_ms.source.to_string(),
            ),
            ("heartbeat-secs", s.heartbeat_secs.value.to_string(), s.heartbeat_secs.source.to_string()),
            (
                "subscriber-buffer",
                s.subscriber_buffer.value.to_string(),
                s.subscriber_buffer.source.to_string(),
            ),
            (
                "broadcast-buffer",
                s.broadcast_buffer.value.to_string(),
                s.broadcast_buffer.source.to_string(),
            ),
        ];
        let lines: Vec<String> = rows
            .iter()
            .map(|(name, value, source)| format!("  {:<18} {:<6} ({})", name, value, source))
            .collect();
        out.push_str(&lines.join("\n"));
        out.push_str("\n\neffective seebeads.kdl:\n");
        out.push_str(self.effective_kdl.trim_end());
        out
    }
}

pub fn config_show(location: &DataLocation, settings: Settings) -> ConfigResult {
    let config_file = location
        .beads_dir
        .as_ref()
        .map(|dir| dir.join(config::CONFIG_FILE_NAME))
        .filter(|path| path.is_file());
    let effective_kdl = settings.effective_config().to_kdl().to_string();
    ConfigResult {
        config_file,
        settings,
        effective_kdl,
    }
}

// === version ===

#[derive(Debug, Clone, Serialize)]
pub struct VersionResult {
    pub version: &'static str,
    pub commit: &'static str,
    pub built: &'static str,
}

impl Output for VersionResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("seebeads {} ({}, built {})", self.version, self.commit, self.built)
    }
}

pub fn version() -> VersionResult {
    VersionResult {
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("SB_GIT_COMMIT"),
        built: env!("SB_BUILD_TIMESTAMP"),
    }
}

// === watch ===

/// Stream change events for `graph` until `shutdown` fires.
///
/// Emits an `init` event first, then `update` after each successful rebuild
/// and periodic `heartbeat`s. If the watcher cannot start, events keep
/// flowing without updates. Stops the watcher and hub before returning.
pub async fn watch<F>(
    graph: Arc<BeadsGraph>,
    settings: &Settings,
    mut shutdown: oneshot::Receiver<()>,
    mut emit: F,
) -> Result<()>
where
    F: FnMut(&Event),
{
    let hub = Hub::spawn(settings.hub());
    let (subscriber, mut events) = hub.subscribe();
    emit(&Event::init(&graph.stats()));

    let publisher = hub.clone();
    let source = Arc::clone(&graph);
    let mut watcher = match start_watcher_with(
        graph.source(),
        Arc::clone(&graph),
        settings.debounce(),
        settings.watch_mode(),
        move |_report| {
            publisher.publish(Event::update(&source.stats()));
        },
    ) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "file watching disabled");
            None
        }
    };

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Some(event) => emit(&event),
                None => break,
            },
        }
    }

    if let Some(watcher) = watcher.as_mut() {
        watcher.stop().await;
    }
    hub.unsubscribe(subscriber);
    hub.shutdown().await;
    tracing::info!("watch stopped");
    Ok(())
}
