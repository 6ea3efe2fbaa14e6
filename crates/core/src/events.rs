//! Decision events published on every lifecycle transition, entry evaluation
//! and adjustment, and the sinks that receive them.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// What a decision event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    /// `CREATED → ARMED`.
    Armed,
    /// Outcome of an entry evaluation on an armed strategy.
    EntryEval,
    /// Entry orders submitted and filled; strategy is now active.
    EntryExecuted,
    /// Entry orders submitted but the group failed; strategy stays armed.
    EntryFailed,
    /// Manual pause.
    Paused,
    /// Pause triggered by a P&L or delta guard.
    AutoPaused,
    Resumed,
    /// Transition to `CLOSING` and the exit submission outcome.
    Closing,
    /// Policy-reported structural change (roll, shift, re-entry).
    Adjustment,
    /// Adjustment not attempted because a guard (cooldown) held it back.
    AdjustmentSkipped,
    /// The policy's adjustment returned an error.
    AdjustmentFailed,
    /// A transition was requested from a state that does not allow it.
    TransitionRejected,
}

impl DecisionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Armed => "ARMED",
            Self::EntryEval => "ENTRY_EVAL",
            Self::EntryExecuted => "ENTRY_EXECUTED",
            Self::EntryFailed => "ENTRY_FAILED",
            Self::Paused => "PAUSED",
            Self::AutoPaused => "AUTO_PAUSED",
            Self::Resumed => "RESUMED",
            Self::Closing => "CLOSING",
            Self::Adjustment => "ADJUSTMENT",
            Self::AdjustmentSkipped => "ADJUSTMENT_SKIPPED",
            Self::AdjustmentFailed => "ADJUSTMENT_FAILED",
            Self::TransitionRejected => "TRANSITION_REJECTED",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form structured context attached to a decision.
pub type DecisionDetails = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub kind: DecisionKind,
    pub message: String,
    pub strategy_id: String,
    pub details: DecisionDetails,
    pub timestamp: DateTime<Utc>,
}

/// Receives decision events. Implementations must not block.
pub trait DecisionSink: Send + Sync {
    fn publish_decision(&self, event: DecisionEvent);
}

// =============================================================================
// Sinks
// =============================================================================

/// Default sink: one structured log line per decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDecisionSink;

impl DecisionSink for LoggingDecisionSink {
    fn publish_decision(&self, event: DecisionEvent) {
        let details = Value::Object(event.details);
        tracing::info!(
            strategy_id = %event.strategy_id,
            kind = %event.kind,
            %details,
            "{}",
            event.message
        );
    }
}

/// Fans decisions out to subscribers over a broadcast channel.
///
/// Publishing never fails; with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastDecisionSink {
    tx: broadcast::Sender<DecisionEvent>,
}

impl BroadcastDecisionSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DecisionEvent> {
        self.tx.subscribe()
    }
}

impl DecisionSink for BroadcastDecisionSink {
    fn publish_decision(&self, event: DecisionEvent) {
        let _ = self.tx.send(event);
    }
}

/// Publishes to several sinks in order.
#[derive(Clone, Default)]
pub struct CompositeDecisionSink {
    sinks: Vec<Arc<dyn DecisionSink>>,
}

impl CompositeDecisionSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl fmt::Debug for CompositeDecisionSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeDecisionSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl DecisionSink for CompositeDecisionSink {
    fn publish_decision(&self, event: DecisionEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish_decision(event.clone());
            }
            last.publish_decision(event);
        }
    }
}

/// Keeps every event in memory. Handy for tests and dashboards replaying a
/// session.
#[derive(Debug, Default)]
pub struct RecordingDecisionSink {
    events: Mutex<Vec<DecisionEvent>>,
}

impl RecordingDecisionSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<DecisionEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<DecisionKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    #[must_use]
    pub fn count(&self, kind: DecisionKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl DecisionSink for RecordingDecisionSink {
    fn publish_decision(&self, event: DecisionEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: DecisionKind) -> DecisionEvent {
        DecisionEvent {
            kind,
            message: "test".to_string(),
            strategy_id: "s-1".to_string(),
            details: DecisionDetails::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_recording_sink_counts_kinds() {
        let sink = RecordingDecisionSink::new();
        sink.publish_decision(event(DecisionKind::Armed));
        sink.publish_decision(event(DecisionKind::EntryEval));
        sink.publish_decision(event(DecisionKind::EntryEval));

        assert_eq!(sink.count(DecisionKind::EntryEval), 2);
        assert_eq!(sink.kinds()[0], DecisionKind::Armed);
    }

    #[test]
    fn test_composite_sink_fans_out() {
        let a = Arc::new(RecordingDecisionSink::new());
        let b = Arc::new(RecordingDecisionSink::new());
        let composite = CompositeDecisionSink::new().with(a.clone()).with(b.clone());

        composite.publish_decision(event(DecisionKind::Paused));

        assert_eq!(a.count(DecisionKind::Paused), 1);
        assert_eq!(b.count(DecisionKind::Paused), 1);
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastDecisionSink::new(16);
        let mut rx = sink.subscribe();

        sink.publish_decision(event(DecisionKind::Resumed));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, DecisionKind::Resumed);
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&DecisionKind::EntryEval).unwrap();
        assert_eq!(json, "\"ENTRY_EVAL\"");
    }
}
