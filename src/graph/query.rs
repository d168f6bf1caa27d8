//! Read-side queries over a [`Snapshot`]: filtering, stats and epic progress.

use super::snapshot::Snapshot;
use crate::models::{Bead, BeadType, RECENT_WINDOW_DAYS, Status};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Criteria for [`Snapshot::query_at`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub statuses: Vec<Status>,
    pub types: Vec<BeadType>,
    pub priorities: Vec<i64>,
    /// Every label must be present (exact, case-sensitive)
    pub labels: Vec<String>,
    /// Case-insensitive substring over id, title and description
    pub search: Option<String>,
    pub ready: bool,
    /// Page size; 0 returns everything after `offset`
    pub limit: usize,
    pub offset: usize,
}

impl Filter {
    fn matches(&self, bead: &Bead, needle: Option<&str>) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&bead.status) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&bead.issue_type) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&bead.priority) {
            return false;
        }
        if !self.labels.iter().all(|l| bead.labels.contains(l)) {
            return false;
        }
        if let Some(needle) = needle {
            let hit = bead.id.to_lowercase().contains(needle)
                || bead.title.to_lowercase().contains(needle)
                || bead.description.to_lowercase().contains(needle);
            if !hit {
                return false;
            }
        }
        true
    }
}

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPage {
    pub beads: Vec<Bead>,
    /// Matches before pagination
    pub total: usize,
}

impl QueryPage {
    /// Whether matches remain past this page.
    pub fn has_more(&self, offset: usize) -> bool {
        offset.saturating_add(self.beads.len()) < self.total
    }
}

/// Created/closed counts over the trailing window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Velocity {
    #[serde(rename = "created_7d")]
    pub created: usize,
    #[serde(rename = "closed_7d")]
    pub closed: usize,
}

/// Aggregate counts over the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub blocked: usize,
    pub ready: usize,
    pub stale: usize,
    pub velocity: Velocity,
}

/// An epic with its direct-children completion counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicProgress {
    #[serde(flatten)]
    pub bead: Bead,
    pub total_children: usize,
    pub closed_children: usize,
}

impl EpicProgress {
    /// Completion ratio in `[0, 1]`; an epic without children is 0.
    pub fn percent(&self) -> f64 {
        if self.total_children == 0 {
            0.0
        } else {
            self.closed_children as f64 / self.total_children as f64
        }
    }
}

/// Bucket label for a priority: `p0`..`p4`, anything else counts as `p2`.
pub fn priority_bucket(priority: i64) -> &'static str {
    match priority {
        0 => "p0",
        1 => "p1",
        3 => "p3",
        4 => "p4",
        _ => "p2",
    }
}

impl Snapshot {
    /// Filter, sort (priority asc, newest first) and paginate.
    pub fn query_at(&self, filter: &Filter, now: DateTime<Utc>) -> QueryPage {
        let needle = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matched: Vec<usize> = (0..self.len())
            .filter(|&idx| {
                let bead = &self.beads()[idx];
                filter.matches(bead, needle.as_deref())
                    && (!filter.ready || self.is_ready_idx(idx, now))
            })
            .collect();

        matched.sort_by(|&a, &b| {
            let (a, b) = (&self.beads()[a], &self.beads()[b]);
            a.priority
                .cmp(&b.priority)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let total = matched.len();
        let take = if filter.limit == 0 { usize::MAX } else { filter.limit };
        let beads = matched
            .into_iter()
            .skip(filter.offset)
            .take(take)
            .map(|idx| self.beads()[idx].clone())
            .collect();

        QueryPage { beads, total }
    }

    /// Single-pass aggregate counts.
    pub fn stats_at(&self, now: DateTime<Utc>) -> Stats {
        let window_start = now - Duration::days(RECENT_WINDOW_DAYS);
        let mut stats = Stats {
            total: self.len(),
            ..Stats::default()
        };

        for (idx, bead) in self.beads().iter().enumerate() {
            *stats.by_status.entry(bead.status.to_string()).or_default() += 1;
            *stats.by_type.entry(bead.issue_type.to_string()).or_default() += 1;
            *stats
                .by_priority
                .entry(priority_bucket(bead.priority).to_string())
                .or_default() += 1;

            if self.is_blocked_idx(idx) {
                stats.blocked += 1;
            }
            if self.is_ready_idx(idx, now) {
                stats.ready += 1;
            }
            if bead.is_stale_at(now) {
                stats.stale += 1;
            }
            if bead.created_at > window_start {
                stats.velocity.created += 1;
            }
            if bead.closed_at.is_some_and(|t| t > window_start) {
                stats.velocity.closed += 1;
            }
        }
        stats
    }

    /// Epics in source order with one-level child counts.
    pub fn epics(&self) -> Vec<EpicProgress> {
        self.by_type(&BeadType::Epic)
            .into_iter()
            .map(|epic| {
                let children = self.children(&epic.id);
                EpicProgress {
                    bead: epic.clone(),
                    total_children: children.len(),
                    closed_children: children
                        .iter()
                        .filter(|c| c.status == Status::Closed)
                        .count(),
                }
            })
            .collect()
    }
}
