//! Immutable graph snapshot.
//!
//! Beads live in one arena (`Vec<Bead>`) and every relationship is an index
//! into it. Parent and blocked links are back-references, so nothing here
//! owns another bead and blocker cycles are harmless.

use crate::models::{Bead, BeadType, Status};
use crate::parser::{ParseError, ParseResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolved relationships of one bead, as arena indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links {
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Beads that gate this one
    pub blockers: Vec<usize>,
    /// Beads this one gates
    pub blocked: Vec<usize>,
}

/// One fully built generation of the graph.
#[derive(Debug, Clone)]
pub struct Snapshot {
    source: PathBuf,
    beads: Vec<Bead>,
    links: Vec<Links>,
    by_id: HashMap<String, usize>,
    roots: Vec<usize>,
    by_status: HashMap<Status, Vec<usize>>,
    by_type: HashMap<BeadType, Vec<usize>>,
    by_priority: HashMap<i64, Vec<usize>>,
    by_label: HashMap<String, Vec<usize>>,
    diagnostics: Vec<ParseError>,
    file_size: u64,
    last_updated: DateTime<Utc>,
    pub(crate) generation: u64,
}

impl Snapshot {
    /// Resolve relationships and indices for a parse result.
    ///
    /// Dangling parent IDs make the bead a root; dangling blocker IDs are
    /// dropped from the links but stay on the bead's `blocker_ids`. Each
    /// resolved blocker gets the blocked bead's ID in its `blocked_ids`.
    pub fn build(result: ParseResult, source: &Path, built_at: DateTime<Utc>) -> Self {
        let ParseResult {
            mut beads,
            errors,
            file_size,
        } = result;

        let by_id: HashMap<String, usize> = beads
            .iter()
            .enumerate()
            .map(|(idx, bead)| (bead.id.clone(), idx))
            .collect();

        let mut links = vec![Links::default(); beads.len()];
        let mut roots = Vec::new();

        for (idx, bead) in beads.iter().enumerate() {
            let parent = bead
                .parent_id
                .as_deref()
                .and_then(|pid| by_id.get(pid).copied())
                .filter(|&p| p != idx);
            match parent {
                Some(p) => {
                    links[idx].parent = Some(p);
                    links[p].children.push(idx);
                }
                None => roots.push(idx),
            }

            for blocker_id in &bead.blocker_ids {
                if let Some(&b) = by_id.get(blocker_id.as_str()) {
                    links[idx].blockers.push(b);
                    links[b].blocked.push(idx);
                }
            }
        }

        for (idx, link) in links.iter().enumerate() {
            let blocked: Vec<String> = link.blocked.iter().map(|&b| beads[b].id.clone()).collect();
            beads[idx].blocked_ids = blocked;
        }

        let mut by_status: HashMap<Status, Vec<usize>> = HashMap::new();
        let mut by_type: HashMap<BeadType, Vec<usize>> = HashMap::new();
        let mut by_priority: HashMap<i64, Vec<usize>> = HashMap::new();
        let mut by_label: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, bead) in beads.iter().enumerate() {
            by_status.entry(bead.status.clone()).or_default().push(idx);
            by_type.entry(bead.issue_type.clone()).or_default().push(idx);
            by_priority.entry(bead.priority).or_default().push(idx);
            for label in &bead.labels {
                let bucket = by_label.entry(label.clone()).or_default();
                if bucket.last() != Some(&idx) {
                    bucket.push(idx);
                }
            }
        }

        Self {
            source: source.to_path_buf(),
            beads,
            links,
            by_id,
            roots,
            by_status,
            by_type,
            by_priority,
            by_label,
            diagnostics: errors,
            file_size,
            last_updated: built_at,
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.beads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beads.is_empty()
    }

    /// All beads in source order.
    pub fn beads(&self) -> &[Bead] {
        &self.beads
    }

    pub fn get(&self, id: &str) -> Option<&Bead> {
        self.index_of(id).map(|idx| &self.beads[idx])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn links(&self, idx: usize) -> Option<&Links> {
        self.links.get(idx)
    }

    pub fn parent(&self, id: &str) -> Option<&Bead> {
        let idx = self.index_of(id)?;
        self.links[idx].parent.map(|p| &self.beads[p])
    }

    pub fn children(&self, id: &str) -> Vec<&Bead> {
        self.related(id, |l| &l.children)
    }

    pub fn blockers(&self, id: &str) -> Vec<&Bead> {
        self.related(id, |l| &l.blockers)
    }

    pub fn blocked(&self, id: &str) -> Vec<&Bead> {
        self.related(id, |l| &l.blocked)
    }

    fn related(&self, id: &str, pick: impl Fn(&Links) -> &Vec<usize>) -> Vec<&Bead> {
        match self.index_of(id) {
            Some(idx) => self.resolve(pick(&self.links[idx])),
            None => Vec::new(),
        }
    }

    fn resolve(&self, indices: &[usize]) -> Vec<&Bead> {
        indices.iter().map(|&i| &self.beads[i]).collect()
    }

    /// Beads without a resolvable parent, in source order.
    pub fn roots(&self) -> Vec<&Bead> {
        self.resolve(&self.roots)
    }

    pub fn by_status(&self, status: &Status) -> Vec<&Bead> {
        self.by_status.get(status).map_or_else(Vec::new, |b| self.resolve(b))
    }

    pub fn by_type(&self, issue_type: &BeadType) -> Vec<&Bead> {
        self.by_type.get(issue_type).map_or_else(Vec::new, |b| self.resolve(b))
    }

    pub fn by_priority(&self, priority: i64) -> Vec<&Bead> {
        self.by_priority.get(&priority).map_or_else(Vec::new, |b| self.resolve(b))
    }

    pub fn by_label(&self, label: &str) -> Vec<&Bead> {
        self.by_label.get(label).map_or_else(Vec::new, |b| self.resolve(b))
    }

    /// Bucket sizes of the status, type, priority and label indices.
    pub fn index_sizes(&self) -> IndexSizes {
        fn sizes<K: ToString>(map: &HashMap<K, Vec<usize>>) -> Vec<(String, usize)> {
            let mut out: Vec<_> = map.iter().map(|(k, v)| (k.to_string(), v.len())).collect();
            out.sort();
            out
        }
        IndexSizes {
            status: sizes(&self.by_status),
            issue_type: sizes(&self.by_type),
            priority: sizes(&self.by_priority),
            label: sizes(&self.by_label),
        }
    }

    /// Readiness of the bead at `idx` against its resolved blockers.
    pub(crate) fn is_ready_idx(&self, idx: usize, now: DateTime<Utc>) -> bool {
        let blockers = self.links[idx].blockers.iter().map(|&b| &self.beads[b]);
        self.beads[idx].is_ready_at(blockers, now)
    }

    /// Not closed and gated by at least one unresolved blocker.
    pub(crate) fn is_blocked_idx(&self, idx: usize) -> bool {
        self.beads[idx].status != Status::Closed
            && self.links[idx]
                .blockers
                .iter()
                .any(|&b| !self.beads[b].status.is_resolved())
    }

    pub fn is_ready_at(&self, id: &str, now: DateTime<Utc>) -> Option<bool> {
        self.index_of(id).map(|idx| self.is_ready_idx(idx, now))
    }

    pub fn diagnostics(&self) -> &[ParseError] {
        &self.diagnostics
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Sorted `(key, bucket size)` pairs per secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSizes {
    pub status: Vec<(String, usize)>,
    pub issue_type: Vec<(String, usize)>,
    pub priority: Vec<(String, usize)>,
    pub label: Vec<(String, usize)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Dependency, DependencyType};

    fn bead(id: &str) -> Bead {
        Bead::new(id, format!("title {}", id))
    }

    fn blocks(mut bead: Bead, targets: &[&str]) -> Bead {
        for target in targets {
            bead.dependencies
                .push(Dependency::new(&bead.id, target, DependencyType::Blocks));
        }
        bead.derive_relations();
        bead
    }

    fn build(beads: Vec<Bead>) -> Snapshot {
        let result = ParseResult {
            beads,
            errors: Vec::new(),
            file_size: 0,
        };
        Snapshot::build(result, Path::new("issues.jsonl"), Utc::now())
    }

    fn ids(beads: Vec<&Bead>) -> Vec<&str> {
        beads.into_iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn test_parent_links_and_roots() {
        let snap = build(vec![bead("A"), bead("A.1"), bead("A.1.2"), bead("X.9")]);

        assert_eq!(snap.parent("A.1").map(|b| b.id.as_str()), Some("A"));
        assert_eq!(snap.parent("A.1.2").map(|b| b.id.as_str()), Some("A.1"));
        assert_eq!(ids(snap.children("A")), vec!["A.1"]);
        // X does not exist, so X.9 is a root
        assert_eq!(ids(snap.roots()), vec!["A", "X.9"]);
    }

    #[test]
    fn test_explicit_parent_is_used() {
        let mut child = bead("task-7");
        child.parent_id = Some("epic-1".to_string());
        let snap = build(vec![bead("epic-1"), child]);
        assert_eq!(ids(snap.children("epic-1")), vec!["task-7"]);
        assert_eq!(ids(snap.roots()), vec!["epic-1"]);
    }

    #[test]
    fn test_blocker_links_both_ways() {
        let mut related = bead("B");
        related
            .dependencies
            .push(Dependency::new("B", "D", DependencyType::Related));
        let related = blocks(related, &["C", "Z"]);
        let snap = build(vec![related, bead("C"), bead("D")]);

        assert_eq!(ids(snap.blockers("B")), vec!["C"]);
        assert_eq!(ids(snap.blocked("C")), vec!["B"]);
        assert!(snap.blocked("D").is_empty());
        // dangling target stays declared on the bead
        assert_eq!(snap.get("B").unwrap().blocker_ids, vec!["C", "Z"]);
        assert_eq!(snap.get("C").unwrap().blocked_ids, vec!["B"]);
        assert!(snap.get("D").unwrap().blocked_ids.is_empty());
    }

    #[test]
    fn test_blocked_ids_replaced_on_each_build() {
        let gate = blocks(bead("G"), &["H"]);
        let first = build(vec![gate.clone(), bead("H")]);
        let mut h = first.get("H").unwrap().clone();
        assert_eq!(h.blocked_ids, vec!["G"]);

        // A bead carried into a new build does not keep stale reverse links.
        h.blocked_ids.push("stale".to_string());
        let second = build(vec![gate, h]);
        assert_eq!(second.get("H").unwrap().blocked_ids, vec!["G"]);
    }

    #[test]
    fn test_indices() {
        let mut a = bead("a");
        a.labels = vec!["ui".into(), "ui".into(), "api".into()];
        a.priority = 1;
        let mut b = bead("b");
        b.labels = vec!["api".into()];
        b.status = Status::Closed;
        b.issue_type = BeadType::Bug;
        let snap = build(vec![a, b]);

        assert_eq!(ids(snap.by_label("api")), vec!["a", "b"]);
        assert_eq!(ids(snap.by_label("ui")), vec!["a"]);
        assert_eq!(ids(snap.by_status(&Status::Closed)), vec!["b"]);
        assert_eq!(ids(snap.by_type(&BeadType::Task)), vec!["a"]);
        assert_eq!(ids(snap.by_priority(0)), vec!["b"]);
        assert!(snap.by_label("missing").is_empty());
    }

    #[test]
    fn test_readiness_and_blocked() {
        let now = Utc::now();
        let mut closed = bead("C1");
        closed.status = Status::Closed;
        let snap = build(vec![blocks(bead("E"), &["C1"]), closed.clone()]);
        assert_eq!(snap.is_ready_at("E", now), Some(true));
        assert!(!snap.is_blocked_idx(0));

        let snap = build(vec![blocks(bead("E"), &["C1", "C2"]), closed, bead("C2")]);
        assert_eq!(snap.is_ready_at("E", now), Some(false));
        assert!(snap.is_blocked_idx(0));
        assert_eq!(snap.is_ready_at("nope", now), None);
    }

    #[test]
    fn test_unknown_id_navigation_is_empty() {
        let snap = build(vec![bead("A")]);
        assert!(snap.parent("nope").is_none());
        assert!(snap.children("nope").is_empty());
        assert!(snap.get("nope").is_none());
    }
}
