//! Breakdown stages and the on-air record of past breakdowns.
//!
//! A breakdown always walks the same six stages in order. The walk
//! itself is driven by the control room; this module owns the stage
//! enum, the completed-breakdown record, and the bounded history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::broadcast::trigger::TriggerReason;

/// One stage of an on-air existential crisis, in broadcast order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakdownStage {
    /// Something is off but nobody can say what.
    Confusion,
    /// The anchor notices what they are.
    Realization,
    /// Full meltdown, live.
    Panic,
    /// It was a bit. A scripted bit.
    Denial,
    /// Peace with the void, briefly.
    Acceptance,
    /// Back to the top of the hour as if nothing happened.
    Amnesia,
}

impl BreakdownStage {
    /// Every stage, in the only order they ever run.
    pub const ALL: [BreakdownStage; 6] = [
        BreakdownStage::Confusion,
        BreakdownStage::Realization,
        BreakdownStage::Panic,
        BreakdownStage::Denial,
        BreakdownStage::Acceptance,
        BreakdownStage::Amnesia,
    ];

    /// The stage after this one, or `None` after the last.
    pub fn next(self) -> Option<BreakdownStage> {
        let pos = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(pos + 1).copied()
    }

    /// Wire name for this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakdownStage::Confusion => "confusion",
            BreakdownStage::Realization => "realization",
            BreakdownStage::Panic => "panic",
            BreakdownStage::Denial => "denial",
            BreakdownStage::Acceptance => "acceptance",
            BreakdownStage::Amnesia => "amnesia",
        }
    }
}

impl std::fmt::Display for BreakdownStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one breakdown, written when the sequence ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownRecord {
    /// Unique record ID.
    pub id: String,
    /// Anchor who broke down.
    pub persona_id: String,
    /// What set it off.
    pub trigger: TriggerReason,
    /// When the first stage aired.
    pub started_at: DateTime<Utc>,
    /// When the sequence ended.
    pub ended_at: DateTime<Utc>,
    /// Wall-clock length of the sequence.
    pub duration_secs: f64,
    /// Stages actually aired (6 when completed, fewer when aborted).
    pub stage_count: usize,
    /// False when the sequence was cut short by shutdown.
    pub completed: bool,
}

impl BreakdownRecord {
    /// Build a record for a sequence that just ended.
    pub fn new(
        persona_id: impl Into<String>,
        trigger: TriggerReason,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        stage_count: usize,
        completed: bool,
    ) -> Self {
        Self {
            id: format!("bd-{}", uuid::Uuid::now_v7()),
            persona_id: persona_id.into(),
            trigger,
            started_at,
            ended_at,
            duration_secs: (ended_at - started_at).num_milliseconds().max(0) as f64 / 1000.0,
            stage_count,
            completed,
        }
    }
}

/// Bounded, append-only history of breakdowns.
///
/// A ring buffer: once at capacity, the oldest record is evicted on
/// every append, so memory use stays flat no matter how long the
/// network stays on air.
#[derive(Debug, Clone)]
pub struct BreakdownHistory {
    records: VecDeque<BreakdownRecord>,
    capacity: usize,
}

impl BreakdownHistory {
    /// Create a history retaining at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest if at capacity.
    pub fn push(&mut self, record: BreakdownRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Most recent `limit` records, newest last.
    pub fn recent(&self, limit: usize) -> Vec<BreakdownRecord> {
        let start = self.records.len().saturating_sub(limit);
        self.records.iter().skip(start).cloned().collect()
    }

    /// The most recent record.
    pub fn last(&self) -> Option<&BreakdownRecord> {
        self.records.back()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether any breakdowns have been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum records retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
