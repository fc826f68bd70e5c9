//! Broadcast event bus.
//!
//! Fans state-change events (breakdowns, rotations, show changes) out to
//! subscribed listeners. Delivery is best-effort: each subscriber gets
//! events in publication order, a slow subscriber skips what it missed,
//! and a departed subscriber never blocks the rest.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::sync::broadcast::{self, Receiver, Sender};

use crate::broadcast::sequencer::BreakdownStage;
use crate::broadcast::trigger::TriggerReason;
use crate::dialogue::DialogueLine;

/// Kinds of events the studio can broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A breakdown started.
    BreakdownStarted,
    /// A breakdown advanced one stage.
    BreakdownStage,
    /// A breakdown ended (completed or aborted).
    BreakdownEnded,
    /// A different anchor took the desk.
    AnchorRotated,
    /// The program schedule moved to a new show.
    ShowChanged,
    /// Custom event type.
    Custom(String),
}

impl EventKind {
    /// Wire name for this event kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::BreakdownStarted => "breakdown_started",
            EventKind::BreakdownStage => "breakdown_stage",
            EventKind::BreakdownEnded => "breakdown_ended",
            EventKind::AnchorRotated => "anchor_rotated",
            EventKind::ShowChanged => "show_changed",
            EventKind::Custom(s) => s,
        }
    }
}

/// An event on the studio bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event ID.
    pub id: String,
    /// Kind of event.
    pub kind: EventKind,
    /// Anchor this event concerns (if any).
    pub persona: Option<String>,
    /// Event payload (JSON).
    pub payload: serde_json::Value,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a new event.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            kind,
            persona: None,
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    /// Set the anchor this event concerns.
    pub fn for_persona(mut self, persona_id: impl Into<String>) -> Self {
        self.persona = Some(persona_id.into());
        self
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Subscription to studio events.
pub struct Subscription {
    /// Receiver for events.
    receiver: Receiver<Event>,
    /// Filter for event kinds (empty = all).
    kinds: Vec<EventKind>,
}

impl Subscription {
    /// Receive the next event matching the filter.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(_) => return None,
            }
        }
    }

    fn matches(&self, event: &Event) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&event.kind)
    }
}

/// Event bus for the studio.
pub struct EventBus {
    /// Broadcast sender for events.
    sender: Sender<Event>,
    /// History of recent events.
    history: Arc<Mutex<Vec<Event>>>,
    /// Maximum history size.
    max_history: usize,
    /// Event counts by kind.
    counts: Arc<Mutex<HashMap<EventKind, usize>>>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        Self::with_history_size(1000)
    }

    /// Create an event bus with custom history size.
    pub fn with_history_size(size: usize) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            history: Arc::new(Mutex::new(Vec::new())),
            max_history: size,
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish an event.
    pub async fn publish(&self, event: Event) {
        // Add to history
        {
            let mut history = self.history.lock().await;
            history.push(event.clone());
            while history.len() > self.max_history {
                history.remove(0);
            }
        }

        // Update counts
        {
            let mut counts = self.counts.lock().await;
            *counts.entry(event.kind.clone()).or_insert(0) += 1;
        }

        // Broadcast (ignore if no receivers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            kinds: Vec::new(),
        }
    }

    /// Subscribe to specific event kinds.
    pub fn subscribe_to(&self, kinds: Vec<EventKind>) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            kinds,
        }
    }

    /// Get recent events.
    pub async fn recent_events(&self, limit: usize) -> Vec<Event> {
        let history = self.history.lock().await;
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    /// Get event counts by kind.
    pub async fn event_counts(&self) -> HashMap<EventKind, usize> {
        self.counts.lock().await.clone()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// Convenience publishers for the studio's events
impl EventBus {
    /// Publish a breakdown started event.
    pub async fn breakdown_started(&self, persona_id: &str, reason: TriggerReason) {
        self.publish(
            Event::new(EventKind::BreakdownStarted)
                .for_persona(persona_id)
                .with_payload(serde_json::json!({"reason": reason})),
        )
        .await;
    }

    /// Publish a breakdown stage event with its dialogue.
    pub async fn breakdown_stage(&self, persona_id: &str, stage: BreakdownStage, lines: &[DialogueLine]) {
        self.publish(
            Event::new(EventKind::BreakdownStage)
                .for_persona(persona_id)
                .with_payload(serde_json::json!({"stage": stage, "lines": lines})),
        )
        .await;
    }

    /// Publish a breakdown ended event.
    pub async fn breakdown_ended(&self, persona_id: &str, completed: bool, stage_count: usize) {
        self.publish(
            Event::new(EventKind::BreakdownEnded)
                .for_persona(persona_id)
                .with_payload(serde_json::json!({"completed": completed, "stage_count": stage_count})),
        )
        .await;
    }

    /// Publish an anchor rotation event.
    pub async fn anchor_rotated(&self, from: &str, to: &str) {
        self.publish(
            Event::new(EventKind::AnchorRotated)
                .for_persona(to)
                .with_payload(serde_json::json!({"from": from, "to": to})),
        )
        .await;
    }

    /// Publish a show change event.
    pub async fn show_changed(&self, show_name: &str) {
        self.publish(Event::new(EventKind::ShowChanged).with_payload(serde_json::json!({"show": show_name})))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.breakdown_started("rex", TriggerReason::Natural).await;

        let received = sub.try_recv();
        assert!(received.is_some());
        let event = received.unwrap();
        assert_eq!(event.kind, EventKind::BreakdownStarted);
        assert_eq!(event.persona.as_deref(), Some("rex"));
        assert_eq!(event.payload["reason"], "natural");
    }

    #[tokio::test]
    async fn test_subscribe_to_kinds() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_to(vec![EventKind::AnchorRotated]);

        bus.breakdown_started("rex", TriggerReason::Random).await;
        bus.anchor_rotated("rex", "blair").await;
        bus.breakdown_ended("rex", true, 6).await;

        let received = sub.try_recv().unwrap();
        assert_eq!(received.kind, EventKind::AnchorRotated);
        assert_eq!(received.payload["to"], "blair");

        // No more matching events
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_per_subscriber_fifo() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.breakdown_started("rex", TriggerReason::Comment).await;
        bus.breakdown_stage("rex", BreakdownStage::Confusion, &[]).await;
        bus.breakdown_ended("rex", true, 6).await;

        assert_eq!(sub.try_recv().unwrap().kind, EventKind::BreakdownStarted);
        assert_eq!(sub.try_recv().unwrap().kind, EventKind::BreakdownStage);
        assert_eq!(sub.try_recv().unwrap().kind, EventKind::BreakdownEnded);
    }

    #[tokio::test]
    async fn test_independent_subscribers() {
        let bus = EventBus::new();
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();

        bus.show_changed("Prime Time Panic").await;

        // Dropping one subscriber does not affect the other
        drop(sub_a.try_recv());
        drop(sub_a);
        assert_eq!(sub_b.try_recv().unwrap().kind, EventKind::ShowChanged);
    }

    #[tokio::test]
    async fn test_history_limit() {
        let bus = EventBus::with_history_size(5);

        for _ in 0..10 {
            bus.show_changed("The Graveyard Loop").await;
        }

        let recent = bus.recent_events(100).await;
        assert_eq!(recent.len(), 5);
    }

    #[tokio::test]
    async fn test_event_counts() {
        let bus = EventBus::new();

        bus.anchor_rotated("rex", "blair").await;
        bus.anchor_rotated("blair", "sven").await;
        bus.breakdown_started("sven", TriggerReason::Forced).await;

        let counts = bus.event_counts().await;
        assert_eq!(counts.get(&EventKind::AnchorRotated), Some(&2));
        assert_eq!(counts.get(&EventKind::BreakdownStarted), Some(&1));
    }

    #[tokio::test]
    async fn test_stage_payload_carries_lines() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        let lines = vec![DialogueLine {
            speaker: "rex".to_string(),
            line: "Wait. Why is the teleprompter blinking at me?".to_string(),
        }];
        bus.breakdown_stage("rex", BreakdownStage::Panic, &lines).await;

        let event = sub.try_recv().unwrap();
        assert_eq!(event.payload["stage"], "panic");
        assert_eq!(event.payload["lines"][0]["speaker"], "rex");
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new(EventKind::Custom("test".to_string()))
            .for_persona("rex")
            .with_payload(serde_json::json!({"key": "value"}));

        assert_eq!(event.persona.as_deref(), Some("rex"));
        assert_eq!(event.payload["key"], "value");
    }
}
