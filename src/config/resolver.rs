//! Precedence resolution for viewer settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. `seebeads.kdl` in the data directory
//! 3. Built-in defaults

use crate::config::ViewerConfig;
use crate::hub::{DEFAULT_BROADCAST_BUFFER, DEFAULT_HEARTBEAT, DEFAULT_SUBSCRIBER_BUFFER, HubSettings};
use crate::watcher::{AGENT_DEBOUNCE, DebounceSettings, INTERACTIVE_DEBOUNCE, WatchMode};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from CLI flag
    CliFlag,
    /// Value from seebeads.kdl
    File,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::File => write!(f, "file"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for settings resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub agent_mode: Option<bool>,
    pub debounce_ms: Option<u64>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent_mode(mut self, agent_mode: bool) -> Self {
        self.agent_mode = Some(agent_mode);
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = Some(debounce_ms);
        self
    }
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub agent_mode: Resolved<bool>,
    pub debounce_ms: Resolved<u64>,
    pub agent_debounce_ms: Resolved<u64>,
    pub heartbeat_secs: Resolved<u64>,
    pub subscriber_buffer: Resolved<usize>,
    pub broadcast_buffer: Resolved<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_mode: Resolved::new(false, ValueSource::Default),
            debounce_ms: Resolved::new(INTERACTIVE_DEBOUNCE.as_millis() as u64, ValueSource::Default),
            agent_debounce_ms: Resolved::new(AGENT_DEBOUNCE.as_millis() as u64, ValueSource::Default),
            heartbeat_secs: Resolved::new(DEFAULT_HEARTBEAT.as_secs(), ValueSource::Default),
            subscriber_buffer: Resolved::new(DEFAULT_SUBSCRIBER_BUFFER, ValueSource::Default),
            broadcast_buffer: Resolved::new(DEFAULT_BROADCAST_BUFFER, ValueSource::Default),
        }
    }
}

impl Settings {
    pub fn watch_mode(&self) -> WatchMode {
        if self.agent_mode.value {
            WatchMode::Agent
        } else {
            WatchMode::Interactive
        }
    }

    pub fn debounce(&self) -> DebounceSettings {
        DebounceSettings {
            interactive: Duration::from_millis(self.debounce_ms.value),
            agent: Duration::from_millis(self.agent_debounce_ms.value),
        }
    }

    /// The effective values as a config file would spell them.
    pub fn effective_config(&self) -> ViewerConfig {
        ViewerConfig {
            agent_mode: Some(self.agent_mode.value),
            debounce_ms: i64::try_from(self.debounce_ms.value).ok(),
            agent_debounce_ms: i64::try_from(self.agent_debounce_ms.value).ok(),
            heartbeat_secs: i64::try_from(self.heartbeat_secs.value).ok(),
            subscriber_buffer: i64::try_from(self.subscriber_buffer.value).ok(),
            broadcast_buffer: i64::try_from(self.broadcast_buffer.value).ok(),
        }
    }

    pub fn hub(&self) -> HubSettings {
        HubSettings {
            heartbeat: Duration::from_secs(self.heartbeat_secs.value),
            subscriber_buffer: self.subscriber_buffer.value,
            broadcast_buffer: self.broadcast_buffer.value,
        }
    }
}

/// A file value, skipped if it does not fit `T`.
fn from_file<T: TryFrom<i64>>(value: Option<i64>) -> Option<Resolved<T>> {
    value
        .and_then(|v| T::try_from(v).ok())
        .map(|v| Resolved::new(v, ValueSource::File))
}

/// Resolve settings with full precedence chain.
pub fn resolve_settings(file: Option<&ViewerConfig>, overrides: &ConfigOverrides) -> Settings {
    let mut result = Settings::default();
    let file = file.cloned().unwrap_or_default();

    if let Some(agent_mode) = overrides.agent_mode {
        result.agent_mode = Resolved::new(agent_mode, ValueSource::CliFlag);
    } else if let Some(agent_mode) = file.agent_mode {
        result.agent_mode = Resolved::new(agent_mode, ValueSource::File);
    }

    if let Some(ms) = overrides.debounce_ms {
        result.debounce_ms = Resolved::new(ms, ValueSource::CliFlag);
    } else if let Some(ms) = from_file(file.debounce_ms) {
        result.debounce_ms = ms;
    }

    if let Some(ms) = from_file(file.agent_debounce_ms) {
        result.agent_debounce_ms = ms;
    }
    if let Some(secs) = from_file(file.heartbeat_secs) {
        result.heartbeat_secs = secs;
    }
    if let Some(size) = from_file(file.subscriber_buffer) {
        result.subscriber_buffer = size;
    }
    if let Some(size) = from_file(file.broadcast_buffer) {
        result.broadcast_buffer = size;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_source_display() {
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(format!("{}", ValueSource::File), "file");
        assert_eq!(format!("{}", ValueSource::Default), "default");
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = resolve_settings(None, &ConfigOverrides::default());

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.watch_mode(), WatchMode::Interactive);
        assert_eq!(settings.debounce(), DebounceSettings::default());
        assert_eq!(settings.hub(), HubSettings::default());
    }

    #[test]
    fn test_resolve_from_file() {
        let file = ViewerConfig {
            agent_mode: Some(true),
            agent_debounce_ms: Some(500),
            subscriber_buffer: Some(8),
            ..ViewerConfig::default()
        };
        let settings = resolve_settings(Some(&file), &ConfigOverrides::default());

        assert_eq!(settings.agent_mode, Resolved::new(true, ValueSource::File));
        assert_eq!(settings.watch_mode(), WatchMode::Agent);
        assert_eq!(settings.debounce().agent, Duration::from_millis(500));
        assert_eq!(settings.hub().subscriber_buffer, 8);
        assert_eq!(settings.heartbeat_secs.source, ValueSource::Default);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = ViewerConfig {
            agent_mode: Some(true),
            debounce_ms: Some(300),
            ..ViewerConfig::default()
        };
        let overrides = ConfigOverrides::new()
            .with_agent_mode(false)
            .with_debounce_ms(50);
        let settings = resolve_settings(Some(&file), &overrides);

        assert_eq!(settings.agent_mode, Resolved::new(false, ValueSource::CliFlag));
        assert_eq!(settings.debounce_ms, Resolved::new(50, ValueSource::CliFlag));
    }

    #[test]
    fn test_effective_config_round_trips_through_resolution() {
        let overrides = ConfigOverrides::new().with_debounce_ms(40);
        let settings = resolve_settings(None, &overrides);
        let effective = settings.effective_config();

        assert_eq!(effective.debounce_ms, Some(40));
        assert_eq!(effective.heartbeat_secs, Some(30));
        assert!(effective.validate().is_ok());
        let again = resolve_settings(Some(&effective), &ConfigOverrides::default());
        assert_eq!(again.debounce(), settings.debounce());
        assert_eq!(again.hub(), settings.hub());
    }

    #[test]
    fn test_settings_json() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["debounceMs"]["value"], 100);
        assert_eq!(json["debounceMs"]["source"], "default");
        assert_eq!(json["heartbeatSecs"]["value"], 30);
    }
}
