//! Source file watcher with debounced reconciliation.
//!
//! The parent directory is watched rather than the file itself so that a
//! write-to-temp-then-rename replacement is still observed. Events for
//! other files in that directory are ignored.
//!
//! The background loop is a small state machine:
//!
//! ```text
//! Idle --event--> Debouncing --event--> Debouncing (deadline reset)
//!                 Debouncing --deadline--> Reconciling --done--> Idle
//! ```
//!
//! Stopping wins over every other branch, including an in-flight rebuild.

use crate::graph::{BeadsGraph, RebuildReport};
use crate::{Result, SourceFormat};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Debounce window used in interactive mode.
pub const INTERACTIVE_DEBOUNCE: Duration = Duration::from_millis(100);

/// Debounce window used in agent mode.
pub const AGENT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Capacity of the notify-to-loop signal channel.
const SIGNAL_BUFFER: usize = 64;

/// Operating point of the debounce window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchMode {
    #[default]
    Interactive,
    /// Long window for bursts of automated writes
    Agent,
}

impl WatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchMode::Interactive => "interactive",
            WatchMode::Agent => "agent",
        }
    }
}

/// Debounce windows for both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceSettings {
    pub interactive: Duration,
    pub agent: Duration,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            interactive: INTERACTIVE_DEBOUNCE,
            agent: AGENT_DEBOUNCE,
        }
    }
}

impl DebounceSettings {
    pub fn window(&self, mode: WatchMode) -> Duration {
        match mode {
            WatchMode::Interactive => self.interactive,
            WatchMode::Agent => self.agent,
        }
    }
}

/// Something the watcher can ask to re-read the source.
pub trait Reconciler: Send + Sync + 'static {
    fn reconcile(&self) -> Result<RebuildReport>;
}

impl Reconciler for BeadsGraph {
    fn reconcile(&self) -> Result<RebuildReport> {
        self.rebuild()
    }
}

/// Handle to a running watcher.
///
/// Dropping the handle also ends the loop, but only [`WatcherHandle::stop`]
/// waits for it to exit.
#[derive(Debug)]
pub struct WatcherHandle {
    path: PathBuf,
    mode_tx: watch::Sender<WatchMode>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> WatchMode {
        *self.mode_tx.borrow()
    }

    /// Switch the debounce window. Applies from the next event on.
    pub fn set_mode(&self, mode: WatchMode) {
        let previous = self.mode_tx.send_replace(mode);
        if previous != mode {
            tracing::info!(mode = mode.as_str(), "watch mode changed");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for it to exit. Safe to call more than once.
    ///
    /// Once this returns no further change callbacks fire and the OS watch
    /// has been released.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "watcher task ended abnormally");
            }
            tracing::debug!(path = %self.path.display(), "watcher stopped");
        }
    }
}

/// Watch `path` and rebuild `graph` after each debounced burst of changes,
/// calling `on_change` after every successful rebuild.
///
/// Must be called from within a tokio runtime.
pub fn start_watcher<R, F>(
    path: &Path,
    graph: Arc<R>,
    mode: WatchMode,
    on_change: F,
) -> Result<WatcherHandle>
where
    R: Reconciler,
    F: Fn(RebuildReport) + Send + 'static,
{
    start_watcher_with(path, graph, DebounceSettings::default(), mode, on_change)
}

/// [`start_watcher`] with explicit debounce windows.
pub fn start_watcher_with<R, F>(
    path: &Path,
    graph: Arc<R>,
    settings: DebounceSettings,
    mode: WatchMode,
    on_change: F,
) -> Result<WatcherHandle>
where
    R: Reconciler,
    F: Fn(RebuildReport) + Send + 'static,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let names = watched_names(path);

    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
    let mut fs_watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event, &names) => {
                tracing::debug!(kind = ?event.kind, paths = ?event.paths, "source changed");
                // A full channel already guarantees a pending debounce.
                let _ = signal_tx.try_send(());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "file watch error"),
        },
        Config::default(),
    )?;
    fs_watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    tracing::info!(
        path = %path.display(),
        mode = mode.as_str(),
        "watching source"
    );
    Ok(spawn_loop(
        path.to_path_buf(),
        signal_rx,
        settings,
        mode,
        graph,
        on_change,
        Some(fs_watcher),
    ))
}

/// File names whose changes count as a source change.
fn watched_names(path: &Path) -> Vec<OsString> {
    let Some(name) = path.file_name() else {
        return Vec::new();
    };
    let mut names = vec![name.to_os_string()];
    if SourceFormat::from_path(path) == SourceFormat::Sqlite {
        let mut wal = name.to_os_string();
        wal.push("-wal");
        names.push(wal);
    }
    names
}

/// Creation, content write or rename touching one of `names`.
fn is_relevant(event: &Event, names: &[OsString]) -> bool {
    let kind_matches = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    kind_matches
        && event.paths.iter().any(|p| {
            p.file_name()
                .is_some_and(|n| names.iter().any(|w| w.as_os_str() == n))
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Debouncing { deadline: Instant },
}

fn spawn_loop<R, F>(
    path: PathBuf,
    signals: mpsc::Receiver<()>,
    settings: DebounceSettings,
    mode: WatchMode,
    reconciler: Arc<R>,
    on_change: F,
    fs_watcher: Option<RecommendedWatcher>,
) -> WatcherHandle
where
    R: Reconciler,
    F: Fn(RebuildReport) + Send + 'static,
{
    let (mode_tx, mode_rx) = watch::channel(mode);
    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(run_loop(
        signals, stop_rx, mode_rx, settings, reconciler, on_change, fs_watcher,
    ));
    WatcherHandle {
        path,
        mode_tx,
        stop_tx: Some(stop_tx),
        task: Some(task),
    }
}

async fn run_loop<R, F>(
    mut signals: mpsc::Receiver<()>,
    mut stop: oneshot::Receiver<()>,
    mode: watch::Receiver<WatchMode>,
    settings: DebounceSettings,
    reconciler: Arc<R>,
    on_change: F,
    fs_watcher: Option<RecommendedWatcher>,
) where
    R: Reconciler,
    F: Fn(RebuildReport) + Send + 'static,
{
    // Released when the loop exits.
    let _fs_watcher = fs_watcher;
    let mut state = LoopState::Idle;

    loop {
        let deadline = match state {
            LoopState::Idle => None,
            LoopState::Debouncing { deadline } => Some(deadline),
        };

        tokio::select! {
            biased;
            _ = &mut stop => break,
            signal = signals.recv() => match signal {
                Some(()) => {
                    let window = settings.window(*mode.borrow());
                    state = LoopState::Debouncing { deadline: Instant::now() + window };
                }
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                state = LoopState::Idle;
                let target = Arc::clone(&reconciler);
                let rebuild = tokio::task::spawn_blocking(move || target.reconcile());
                tokio::select! {
                    biased;
                    _ = &mut stop => break,
                    joined = rebuild => match joined {
                        Ok(Ok(report)) => on_change(report),
                        Ok(Err(e)) => tracing::warn!(error = %e, "rebuild failed; keeping previous graph"),
                        Err(e) => tracing::warn!(error = %e, "rebuild task panicked"),
                    },
                }
            }
        }
    }
}
