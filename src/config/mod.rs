//! Settings and data path discovery.
//!
//! ## seebeads.kdl
//!
//! Optional viewer settings, read from the `.beads` data directory.
//! See [`schema`] for the node names.
//!
//! ## Data path discovery
//!
//! [`find_beads_dir`] walks up from a starting directory to the nearest
//! `.beads` directory; [`find_data_path`] picks the source file inside it.
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{ConfigOverrides, Resolved, Settings, ValueSource, resolve_settings};
pub use schema::ViewerConfig;

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Name of the data directory.
pub const BEADS_DIR: &str = ".beads";

/// Name of the settings file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "seebeads.kdl";

/// Source files in order of preference.
pub const DATA_FILES: &[&str] = &["beads.db", "issues.jsonl", "beads.jsonl"];

/// Walk up from `start` to the first directory containing `.beads`.
pub fn find_beads_dir(start: &Path) -> Result<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(BEADS_DIR))
        .find(|candidate| candidate.is_dir())
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no {} directory in {} or any parent",
                BEADS_DIR,
                start.display()
            ))
        })
}

/// Pick the source file inside a `.beads` directory.
pub fn find_data_path(beads_dir: &Path) -> Result<PathBuf> {
    DATA_FILES
        .iter()
        .map(|name| beads_dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            Error::NotFound(format!(
                "no beads data file ({}) in {}",
                DATA_FILES.join(", "),
                beads_dir.display()
            ))
        })
}

/// Load `seebeads.kdl` from the data directory, if present.
pub fn load_config(beads_dir: &Path) -> Result<Option<ViewerConfig>> {
    ViewerConfig::load(&beads_dir.join(CONFIG_FILE_NAME))
}
