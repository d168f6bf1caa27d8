//! KDL schema for `seebeads.kdl`.
//!
//! ```kdl
//! // Viewer settings, all optional
//! agent-mode #true
//! debounce-ms 100
//! agent-debounce-ms 2000
//! heartbeat-secs 30
//! subscriber-buffer 64
//! broadcast-buffer 256
//! ```
//!
//! Unknown nodes are ignored so the file can carry settings for other tools.

use crate::{Error, Result};
use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::Serialize;
use std::ops::RangeInclusive;
use std::path::Path;

pub const DEBOUNCE_MS_RANGE: RangeInclusive<i64> = 1..=60_000;
pub const AGENT_DEBOUNCE_MS_RANGE: RangeInclusive<i64> = 1..=600_000;
pub const HEARTBEAT_SECS_RANGE: RangeInclusive<i64> = 1..=3_600;
pub const BUFFER_RANGE: RangeInclusive<i64> = 1..=65_536;

/// Settings read from `seebeads.kdl`. `None` means "not set in the file".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ViewerConfig {
    /// Start the watcher in agent mode
    pub agent_mode: Option<bool>,
    pub debounce_ms: Option<i64>,
    pub agent_debounce_ms: Option<i64>,
    pub heartbeat_secs: Option<i64>,
    pub subscriber_buffer: Option<i64>,
    pub broadcast_buffer: Option<i64>,
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(KdlEntry::value)
}

fn integer(doc: &KdlDocument, name: &str) -> Option<i64> {
    first_value(doc, name)
        .and_then(KdlValue::as_integer)
        .and_then(|i| i64::try_from(i).ok())
}

fn check(name: &str, value: Option<i64>, range: &RangeInclusive<i64>) -> std::result::Result<(), String> {
    match value {
        Some(v) if !range.contains(&v) => Err(format!(
            "{} must be {}-{}, got {}",
            name,
            range.start(),
            range.end(),
            v
        )),
        _ => Ok(()),
    }
}

impl ViewerConfig {
    /// Parse config from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            agent_mode: first_value(doc, "agent-mode").and_then(KdlValue::as_bool),
            debounce_ms: integer(doc, "debounce-ms"),
            agent_debounce_ms: integer(doc, "agent-debounce-ms"),
            heartbeat_secs: integer(doc, "heartbeat-secs"),
            subscriber_buffer: integer(doc, "subscriber-buffer"),
            broadcast_buffer: integer(doc, "broadcast-buffer"),
        }
    }

    /// Parse and validate KDL text.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_validated(text).map_err(Error::Config)
    }

    fn parse_validated(text: &str) -> std::result::Result<Self, String> {
        let doc: KdlDocument = text.parse().map_err(|e: kdl::KdlError| e.to_string())?;
        let config = Self::from_kdl(&doc);
        config.validate()?;
        Ok(config)
    }

    /// Read `path`, returning `None` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse_validated(&text)
                .map(Some)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns an error message for the first out-of-range value.
    pub fn validate(&self) -> std::result::Result<(), String> {
        check("debounce-ms", self.debounce_ms, &DEBOUNCE_MS_RANGE)?;
        check("agent-debounce-ms", self.agent_debounce_ms, &AGENT_DEBOUNCE_MS_RANGE)?;
        check("heartbeat-secs", self.heartbeat_secs, &HEARTBEAT_SECS_RANGE)?;
        check("subscriber-buffer", self.subscriber_buffer, &BUFFER_RANGE)?;
        check("broadcast-buffer", self.broadcast_buffer, &BUFFER_RANGE)?;
        Ok(())
    }

    /// Render the set values as a `seebeads.kdl` document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();
        if let Some(agent_mode) = self.agent_mode {
            let mut node = KdlNode::new("agent-mode");
            node.push(KdlEntry::new(KdlValue::Bool(agent_mode)));
            doc.nodes_mut().push(node);
        }
        let integers = [
            ("debounce-ms", self.debounce_ms),
            ("agent-debounce-ms", self.agent_debounce_ms),
            ("heartbeat-secs", self.heartbeat_secs),
            ("subscriber-buffer", self.subscriber_buffer),
            ("broadcast-buffer", self.broadcast_buffer),
        ];
        for (name, value) in integers {
            if let Some(v) = value {
                let mut node = KdlNode::new(name);
                node.push(KdlEntry::new(KdlValue::Integer(v as i128)));
                doc.nodes_mut().push(node);
            }
        }
        doc.autoformat();
        doc
    }
}
