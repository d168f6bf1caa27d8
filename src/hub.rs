//! Fan-out of graph change events to live subscribers.
//!
//! One task owns the subscriber registry. Producers talk to it through
//! channels only, and every delivery is a non-blocking `try_send`: a
//! subscriber whose queue is full misses that event, nobody waits for it.

use crate::graph::Stats;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;
pub const DEFAULT_BROADCAST_BUFFER: usize = 256;
/// Shortest heartbeat period the loop accepts.
pub const MIN_HEARTBEAT: Duration = Duration::from_millis(1);

/// Discriminator of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Init,
    Update,
    Heartbeat,
}

/// A change notification as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: Value,
}

impl Event {
    /// Initial state sent when a client connects.
    pub fn init(stats: &Stats) -> Self {
        Self {
            kind: EventKind::Init,
            data: json!({ "stats": stats }),
        }
    }

    /// The graph was rebuilt.
    pub fn update(stats: &Stats) -> Self {
        Self {
            kind: EventKind::Update,
            data: json!({ "type": "stats", "stats": stats }),
        }
    }

    pub fn heartbeat(now: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Heartbeat,
            data: json!({ "timestamp": now.to_rfc3339_opts(SecondsFormat::Secs, true) }),
        }
    }

    /// Compact single-line JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Opaque identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Queue sizes and heartbeat period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubSettings {
    pub heartbeat: Duration,
    pub subscriber_buffer: usize,
    pub broadcast_buffer: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            broadcast_buffer: DEFAULT_BROADCAST_BUFFER,
        }
    }
}

/// Receiving end of a subscription.
///
/// Yields `None` once the subscriber is unregistered or the hub shuts down.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl futures::Stream for Subscription {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}

enum Control {
    Register(SubscriberId, mpsc::Sender<Event>),
    Unregister(SubscriberId),
}

/// Cloneable handle to the hub loop.
#[derive(Debug, Clone)]
pub struct Hub {
    control: mpsc::UnboundedSender<Control>,
    broadcast: mpsc::Sender<Event>,
    settings: HubSettings,
    shared: std::sync::Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    stop: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Register(id, _) => write!(f, "Register({})", id),
            Control::Unregister(id) => write!(f, "Unregister({})", id),
        }
    }
}

impl Hub {
    /// Start the hub loop. Must be called from within a tokio runtime.
    ///
    /// A heartbeat shorter than [`MIN_HEARTBEAT`] is raised to it.
    pub fn spawn(settings: HubSettings) -> Self {
        let settings = HubSettings {
            heartbeat: settings.heartbeat.max(MIN_HEARTBEAT),
            ..settings
        };
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(settings.broadcast_buffer.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(run(control_rx, broadcast_rx, stop_rx, settings.heartbeat));
        Self {
            control: control_tx,
            broadcast: broadcast_tx,
            settings,
            shared: std::sync::Arc::new(Shared {
                stop: std::sync::Mutex::new(Some(stop_tx)),
                task: tokio::sync::Mutex::new(Some(task)),
            }),
        }
    }

    pub fn settings(&self) -> HubSettings {
        self.settings
    }

    /// Register a new subscriber with its own bounded queue.
    pub fn subscribe(&self) -> (SubscriberId, Subscription) {
        let id = SubscriberId(Uuid::new_v4());
        let (tx, rx) = mpsc::channel(self.settings.subscriber_buffer.max(1));
        if self.control.send(Control::Register(id, tx)).is_err() {
            tracing::debug!(subscriber = %id, "hub stopped; subscription is closed");
        }
        (id, Subscription { id, rx })
    }

    /// Remove a subscriber and close its queue.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.control.send(Control::Unregister(id));
    }

    /// Queue an event for every subscriber without waiting.
    ///
    /// Returns false if the event was dropped because the inbound queue is
    /// full or the hub has stopped.
    pub fn publish(&self, event: Event) -> bool {
        match self.broadcast.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(kind = ?event.kind, "broadcast queue full; dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Stop the loop and wait for it. Every subscription then yields `None`.
    pub async fn shutdown(&self) {
        let stop = self
            .shared
            .stop
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        if let Some(task) = self.shared.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "hub task ended abnormally");
            }
        }
    }
}

async fn run(
    mut control: mpsc::UnboundedReceiver<Control>,
    mut broadcast: mpsc::Receiver<Event>,
    mut stop: oneshot::Receiver<()>,
    heartbeat: Duration,
) {
    let mut subscribers: HashMap<SubscriberId, mpsc::Sender<Event>> = HashMap::new();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            msg = control.recv() => match msg {
                Some(Control::Register(id, tx)) => {
                    subscribers.insert(id, tx);
                    tracing::debug!(subscriber = %id, total = subscribers.len(), "subscriber connected");
                }
                Some(Control::Unregister(id)) => {
                    if subscribers.remove(&id).is_some() {
                        tracing::debug!(subscriber = %id, total = subscribers.len(), "subscriber disconnected");
                    }
                }
                None => break,
            },
            event = broadcast.recv() => match event {
                Some(event) => deliver(&mut subscribers, &event),
                None => break,
            },
            _ = ticker.tick() => deliver(&mut subscribers, &Event::heartbeat(Utc::now())),
        }
    }
    tracing::debug!(subscribers = subscribers.len(), "hub stopped");
}

/// Try to enqueue `event` for every subscriber. Closed queues are pruned.
fn deliver(subscribers: &mut HashMap<SubscriberId, mpsc::Sender<Event>>, event: &Event) {
    subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!(subscriber = %id, kind = ?event.kind, "subscriber queue full; event dropped");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(subscriber = %id, "subscriber gone");
            false
        }
    });
}
