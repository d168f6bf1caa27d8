//! Common test utilities for seebeads integration tests.
//!
//! Provides `TestEnv`, a temporary project directory with a `.beads`
//! data directory inside it.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A sample graph: an epic with two children, one blocked by a bug.
pub const SAMPLE_JSONL: &str = concat!(
    r#"{"id":"bd-1","title":"Launch epic","issue_type":"epic","priority":1,"created_at":"2025-01-01T00:00:00Z","updated_at":"2025-01-01T00:00:00Z"}"#,
    "\n",
    r#"{"id":"bd-1.1","title":"Write docs","status":"closed","priority":2,"labels":["docs"],"created_at":"2025-01-02T00:00:00Z","updated_at":"2025-01-02T00:00:00Z"}"#,
    "\n",
    r#"{"id":"bd-1.2","title":"Ship release","priority":0,"labels":["release"],"created_at":"2025-01-03T00:00:00Z","updated_at":"2025-01-03T00:00:00Z","dependencies":[{"issue_id":"bd-1.2","depends_on_id":"bd-2","type":"blocks"}]}"#,
    "\n",
    r#"{"id":"bd-2","title":"Crash on login","issue_type":"bug","priority":0,"labels":["release","auth"],"created_at":"2025-01-04T00:00:00Z","updated_at":"2025-01-04T00:00:00Z"}"#,
    "\n",
);

/// A temporary project with a `.beads` directory.
pub struct TestEnv {
    pub project_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let env = Self {
            project_dir: TempDir::new().unwrap(),
        };
        std::fs::create_dir(env.beads_dir()).unwrap();
        env
    }

    /// A project whose `.beads/issues.jsonl` holds [`SAMPLE_JSONL`].
    pub fn with_sample() -> Self {
        let env = Self::new();
        env.write_jsonl(SAMPLE_JSONL);
        env
    }

    /// Get a Command for the seebeads binary, run from the project directory.
    ///
    /// Clears the env vars the CLI reads so the host cannot leak in.
    pub fn seebeads(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_seebeads"));
        cmd.current_dir(self.project_dir.path());
        cmd.env_remove("SEEBEADS_DIR");
        cmd.env_remove("SEEBEADS_DATA");
        cmd.env("SEEBEADS_LOG", "off");
        cmd
    }

    pub fn path(&self) -> &Path {
        self.project_dir.path()
    }

    pub fn beads_dir(&self) -> PathBuf {
        self.project_dir.path().join(".beads")
    }

    pub fn jsonl_path(&self) -> PathBuf {
        self.beads_dir().join("issues.jsonl")
    }

    pub fn db_path(&self) -> PathBuf {
        self.beads_dir().join("beads.db")
    }

    pub fn write_jsonl(&self, content: &str) {
        std::fs::write(self.jsonl_path(), content).unwrap();
    }

    /// Replace the JSONL file the way editors and tools do: write a temp
    /// file, then rename it over the original.
    pub fn replace_jsonl(&self, content: &str) {
        let tmp = self.beads_dir().join(".issues.jsonl.tmp");
        std::fs::write(&tmp, content).unwrap();
        std::fs::rename(&tmp, self.jsonl_path()).unwrap();
    }

    /// Create `.beads/beads.db` from a SQL script.
    pub fn write_db(&self, sql: &str) {
        let conn = rusqlite::Connection::open(self.db_path()).unwrap();
        conn.execute_batch(sql).unwrap();
    }

    pub fn write_config(&self, kdl: &str) {
        std::fs::write(self.beads_dir().join("seebeads.kdl"), kdl).unwrap();
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a command's stdout as JSON.
pub fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}
