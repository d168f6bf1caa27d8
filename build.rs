//! Stamps `seebeads version` output with the build time and git commit.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");

    let built = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=SB_BUILD_TIMESTAMP={}", built);
    println!("cargo:rustc-env=SB_GIT_COMMIT={}", short_commit().as_deref().unwrap_or("unknown"));
}

/// Abbreviated HEAD hash, or `None` outside a git checkout.
fn short_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())?;
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string()).filter(|h| !h.is_empty())
}
