//! Process-wide pub/sub fan-out (§4.7). One `tokio::sync::broadcast` channel
//! carries every topic as a tagged `Event`, so a single `subscribe()` call
//! observes the whole stream in arrival order; a subscriber that only cares
//! about one topic filters on the match arm instead of opening a second
//! channel. Publish is always in-order per subscriber because
//! `broadcast::Sender::send` just clones into each receiver's queue, and a
//! lagging subscriber only skips ahead on its own channel, never blocking or
//! dropping messages for anyone else.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::Job;
use crate::error::ErrorKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: i64,
    pub phase: String,
    pub percent: f32,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
    pub elapsed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    pub is_running: bool,
    pub is_paused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseAfterCurrentEvent {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub job_id: Option<i64>,
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Tagged union of every event topic carried by the bus. Kept as one enum
/// (rather than one broadcast channel per Rust type) so a single `subscribe`
/// call can observe the whole event stream in arrival order, which is what
/// the HTTP/IPC adapter layer wants; per-topic filtering happens at the
/// subscriber, same as `unsubscribeAll(topic)` is a filter predicate here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload", rename_all = "camelCase")]
pub enum Event {
    Progress(ProgressEvent),
    StatusChange(StatusChangeEvent),
    JobUpdate(Box<Job>),
    JobComplete(Box<Job>),
    PauseAfterCurrentChange(PauseAfterCurrentEvent),
    Error(ErrorEvent),
    ConfigChanged,
}

const CHANNEL_CAPACITY: usize = 1024;

/// Subscriber handle. Wraps a `broadcast::Receiver` so callers use
/// `recv().await` without reaching into `tokio::sync` directly; a lagging
/// subscriber's missed-message error is logged and treated as "skip ahead",
/// not a bus-wide failure.
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event bus subscriber lagged, skipping ahead");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

pub struct EventBus {
    sender: Mutex<broadcast::Sender<Event>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender: Mutex::new(sender) }
    }

    pub fn subscribe(&self) -> Subscription {
        let rx = self.sender.lock().expect("event bus mutex poisoned").subscribe();
        Subscription { rx }
    }

    /// Publish never fails the caller: with zero subscribers `send` returns
    /// an error that we intentionally discard, matching "exceptions in
    /// subscribers are logged and do not affect other subscribers".
    pub fn publish(&self, event: Event) {
        let sender = self.sender.lock().expect("event bus mutex poisoned");
        if sender.send(event).is_err() {
            tracing::trace!("event bus publish with no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_per_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(Event::ConfigChanged);
        bus.publish(Event::StatusChange(StatusChangeEvent { is_running: true, is_paused: false }));

        assert!(matches!(sub.recv().await, Some(Event::ConfigChanged)));
        assert!(matches!(sub.recv().await, Some(Event::StatusChange(_))));
    }

    #[tokio::test]
    async fn independent_subscribers_each_see_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(Event::ConfigChanged);
        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::ConfigChanged);
    }
}
