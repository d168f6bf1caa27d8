//! Data models for Beads issues.
//!
//! This module defines the canonical record every source encoding is
//! normalized into:
//! - `Bead` - One issue with status, type, priority, labels and dependencies
//! - `Dependency` - A declared edge from one bead to another
//! - `Comment` - A comment attached to a bead
//!
//! Relationship fields that depend on other beads (parent pointer, children,
//! resolved blockers) are not stored here; the graph resolves them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Trailing window used for staleness and velocity.
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// Issue status in the workflow.
///
/// Unknown values read from a source are kept verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    #[default]
    Open,
    InProgress,
    Blocked,
    Deferred,
    Closed,
    Tombstone,
    Pinned,
    Hooked,
    Other(String),
}

impl Status {
    /// Parse a status string. Empty input normalizes to `Open`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "" | "open" => Status::Open,
            "in_progress" => Status::InProgress,
            "blocked" => Status::Blocked,
            "deferred" => Status::Deferred,
            "closed" => Status::Closed,
            "tombstone" => Status::Tombstone,
            "pinned" => Status::Pinned,
            "hooked" => Status::Hooked,
            other => Status::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Open => "open",
            Status::InProgress => "in_progress",
            Status::Blocked => "blocked",
            Status::Deferred => "deferred",
            Status::Closed => "closed",
            Status::Tombstone => "tombstone",
            Status::Pinned => "pinned",
            Status::Hooked => "hooked",
            Status::Other(s) => s,
        }
    }

    /// Closed or tombstoned: a bead in this state never blocks another.
    pub fn is_resolved(&self) -> bool {
        matches!(self, Status::Closed | Status::Tombstone)
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        Status::parse(&s)
    }
}

impl From<Status> for String {
    fn from(s: Status) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Issue type. Unknown values are kept verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BeadType {
    #[default]
    Task,
    Bug,
    Feature,
    Epic,
    Chore,
    Message,
    MergeRequest,
    Molecule,
    Gate,
    Event,
    Other(String),
}

impl BeadType {
    /// Parse a type string. Empty input normalizes to `Task`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "" | "task" => BeadType::Task,
            "bug" => BeadType::Bug,
            "feature" => BeadType::Feature,
            "epic" => BeadType::Epic,
            "chore" => BeadType::Chore,
            "message" => BeadType::Message,
            "merge-request" => BeadType::MergeRequest,
            "molecule" => BeadType::Molecule,
            "gate" => BeadType::Gate,
            "event" => BeadType::Event,
            other => BeadType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BeadType::Task => "task",
            BeadType::Bug => "bug",
            BeadType::Feature => "feature",
            BeadType::Epic => "epic",
            BeadType::Chore => "chore",
            BeadType::Message => "message",
            BeadType::MergeRequest => "merge-request",
            BeadType::Molecule => "molecule",
            BeadType::Gate => "gate",
            BeadType::Event => "event",
            BeadType::Other(s) => s,
        }
    }
}

impl From<String> for BeadType {
    fn from(s: String) -> Self {
        BeadType::parse(&s)
    }
}

impl From<BeadType> for String {
    fn from(t: BeadType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for BeadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of relationship a dependency edge expresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DependencyType {
    Blocks,
    ParentChild,
    ConditionalBlocks,
    WaitsFor,
    Related,
    DiscoveredFrom,
    RepliesTo,
    RelatesTo,
    Duplicates,
    Supersedes,
    Other(String),
}

impl DependencyType {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "blocks" => DependencyType::Blocks,
            "parent-child" => DependencyType::ParentChild,
            "conditional-blocks" => DependencyType::ConditionalBlocks,
            "waits-for" => DependencyType::WaitsFor,
            "related" => DependencyType::Related,
            "discovered-from" => DependencyType::DiscoveredFrom,
            "replies-to" => DependencyType::RepliesTo,
            "relates-to" => DependencyType::RelatesTo,
            "duplicates" => DependencyType::Duplicates,
            "supersedes" => DependencyType::Supersedes,
            other => DependencyType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DependencyType::Blocks => "blocks",
            DependencyType::ParentChild => "parent-child",
            DependencyType::ConditionalBlocks => "conditional-blocks",
            DependencyType::WaitsFor => "waits-for",
            DependencyType::Related => "related",
            DependencyType::DiscoveredFrom => "discovered-from",
            DependencyType::RepliesTo => "replies-to",
            DependencyType::RelatesTo => "relates-to",
            DependencyType::Duplicates => "duplicates",
            DependencyType::Supersedes => "supersedes",
            DependencyType::Other(s) => s,
        }
    }

    /// Returns true if this dependency type gates readiness.
    pub fn affects_ready(&self) -> bool {
        matches!(
            self,
            DependencyType::Blocks
                | DependencyType::ParentChild
                | DependencyType::ConditionalBlocks
                | DependencyType::WaitsFor
        )
    }
}

impl Default for DependencyType {
    fn default() -> Self {
        DependencyType::Other(String::new())
    }
}

impl From<String> for DependencyType {
    fn from(s: String) -> Self {
        DependencyType::parse(&s)
    }
}

impl From<DependencyType> for String {
    fn from(d: DependencyType) -> Self {
        d.as_str().to_string()
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reads an explicit `null` as the field's default.
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A declared relationship from `issue_id` to `depends_on_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(default, deserialize_with = "null_default")]
    pub issue_id: String,

    pub depends_on_id: String,

    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub kind: DependencyType,

    #[serde(default, deserialize_with = "null_default")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl Dependency {
    /// Create an edge of the given kind with a zero creation timestamp.
    pub fn new(issue_id: &str, depends_on_id: &str, kind: DependencyType) -> Self {
        Self {
            issue_id: issue_id.to_string(),
            depends_on_id: depends_on_id.to_string(),
            kind,
            created_at: DateTime::<Utc>::default(),
            created_by: None,
            metadata: None,
            thread_id: None,
        }
    }
}

/// A comment on a bead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default, deserialize_with = "null_default")]
    pub id: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub issue_id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub author: String,
    #[serde(default, deserialize_with = "null_default")]
    pub text: String,
    #[serde(default, deserialize_with = "null_default")]
    pub created_at: DateTime<Utc>,
}

/// A single issue tracked by Beads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bead {
    /// Unique identifier (e.g., "bd-a1b2" or "bd-a1b2.1" for a child)
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,

    #[serde(default, deserialize_with = "null_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub design: String,

    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub acceptance_criteria: String,

    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "String::is_empty")]
    pub notes: String,

    #[serde(default, deserialize_with = "null_default")]
    pub status: Status,

    /// Priority level (0 is most urgent, typically 0-4)
    #[serde(default, deserialize_with = "null_default")]
    pub priority: i64,

    #[serde(default, deserialize_with = "null_default")]
    pub issue_type: BeadType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<i64>,

    #[serde(default, deserialize_with = "null_default")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default, deserialize_with = "null_default")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    /// Work should not start before this instant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defer_until: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,

    /// Unordered; duplicates are tolerated
    #[serde(default, deserialize_with = "null_default")]
    pub labels: Vec<String>,

    #[serde(default, deserialize_with = "null_default")]
    pub dependencies: Vec<Dependency>,

    #[serde(default, deserialize_with = "null_default", skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_reason: Option<String>,

    /// Parent ID derived from the hierarchical ID (or a source column)
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Targets of ready-affecting dependencies, as declared (may dangle)
    #[serde(skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub blocker_ids: Vec<String>,

    /// Beads in the same graph that this one blocks. Filled by the graph.
    #[serde(skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub blocked_ids: Vec<String>,
}

impl Bead {
    /// Create an open task with the given ID and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        let parent_id = parent_id_of(&id).map(str::to_string);
        Self {
            id,
            title: title.into(),
            description: String::new(),
            design: String::new(),
            acceptance_criteria: String::new(),
            notes: String::new(),
            status: Status::default(),
            priority: 0,
            issue_type: BeadType::default(),
            close_reason: None,
            assignee: None,
            estimated_minutes: None,
            created_at: DateTime::<Utc>::default(),
            created_by: None,
            updated_at: DateTime::<Utc>::default(),
            closed_at: None,
            due_at: None,
            defer_until: None,
            external_ref: None,
            labels: Vec::new(),
            dependencies: Vec::new(),
            comments: Vec::new(),
            deleted_at: None,
            deleted_by: None,
            delete_reason: None,
            parent_id,
            blocker_ids: Vec::new(),
            blocked_ids: Vec::new(),
        }
    }

    /// Recompute the parse-time derived fields.
    ///
    /// An explicit `parent_id` (tabular sources) is kept; otherwise it is
    /// derived from the ID. Blocker IDs come from ready-affecting edges,
    /// deduplicated, with self-references dropped.
    pub fn derive_relations(&mut self) {
        if self.parent_id.as_deref().is_none_or(str::is_empty) {
            self.parent_id = parent_id_of(&self.id).map(str::to_string);
        }

        let mut blockers: Vec<String> = Vec::new();
        for dep in &self.dependencies {
            let target = dep.depends_on_id.trim();
            if !dep.kind.affects_ready() || target.is_empty() || target == self.id {
                continue;
            }
            if !blockers.iter().any(|b| b == target) {
                blockers.push(target.to_string());
            }
        }
        self.blocker_ids = blockers;
    }

    pub fn is_tombstone(&self) -> bool {
        self.status == Status::Tombstone
    }

    /// Readiness against the given resolved blockers.
    ///
    /// Ready iff the status is exactly open, any defer-until is not in the
    /// future, and every blocker is closed or tombstoned.
    pub fn is_ready_at<'a, I>(&self, blockers: I, now: DateTime<Utc>) -> bool
    where
        I: IntoIterator<Item = &'a Bead>,
    {
        if self.status != Status::Open {
            return false;
        }
        if self.defer_until.is_some_and(|t| t > now) {
            return false;
        }
        blockers.into_iter().all(|b| b.status.is_resolved())
    }

    /// Not closed and not updated within the trailing window.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.status != Status::Closed && self.updated_at < now - Duration::days(RECENT_WINDOW_DAYS)
    }
}

/// Derive the parent ID from a hierarchical ID.
///
/// `bd-1234.1` -> `bd-1234`, `bd-1234.1.2` -> `bd-1234.1`, `bd-1234` -> none.
pub fn parent_id_of(id: &str) -> Option<&str> {
    let (parent, _) = id.rsplit_once('.')?;
    if parent.is_empty() { None } else { Some(parent) }
}
