//! Loop state and per-message outcomes.

use chrono::{DateTime, Utc};

/// State carried from one cycle to the next.
///
/// Passed by value: each cycle consumes the previous state and returns the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopState {
    /// When the most recent cycle started.
    pub last_poll: Option<DateTime<Utc>>,
    /// Cycle-level failures since the last successful cycle.
    pub consecutive_failures: u32,
    /// Cycles run so far, successful or not.
    pub cycles: u64,
}

impl LoopState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State after a cycle that listed the mailbox successfully.
    pub fn succeeded(self, started: DateTime<Utc>) -> Self {
        Self {
            last_poll: Some(started),
            consecutive_failures: 0,
            cycles: self.cycles + 1,
        }
    }

    /// State after a cycle-level failure.
    pub fn failed(self, started: DateTime<Utc>) -> Self {
        Self {
            last_poll: Some(started),
            consecutive_failures: self.consecutive_failures.saturating_add(1),
            cycles: self.cycles + 1,
        }
    }
}

/// Terminal state of one message within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Not an appointment request (or our own mail). Marked read.
    NotRelevant,
    /// Booking link sent. Marked read.
    Booked,
    /// No free slot; the sender was told so. Marked read.
    NoAvailabilityNotified,
    /// No free slot; left unread for a later cycle.
    Deferred,
    /// Classifier output was malformed and the drop policy applies. Marked read.
    Dropped,
    /// A step failed. Left unread, retried next cycle.
    Failed,
}

impl MessageOutcome {
    /// Whether the message was marked read.
    pub fn marked_read(self) -> bool {
        !matches!(self, Self::Deferred | Self::Failed)
    }

    /// Short label for logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::NotRelevant => "not_relevant",
            Self::Booked => "booked",
            Self::NoAvailabilityNotified => "no_availability_notified",
            Self::Deferred => "deferred",
            Self::Dropped => "dropped",
            Self::Failed => "failed",
        }
    }
}

/// Summary of one completed cycle, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub outcomes: Vec<(String, MessageOutcome)>,
}

impl CycleReport {
    pub fn record(&mut self, id: &str, outcome: MessageOutcome) {
        self.outcomes.push((id.to_string(), outcome));
    }

    pub fn count(&self, outcome: MessageOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }

    pub fn outcome_of(&self, id: &str) -> Option<MessageOutcome> {
        self.outcomes.iter().find(|(m, _)| m == id).map(|(_, o)| *o)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
