//! # Protocol Events
//!
//! Notifications emitted by the protocol-state core after `Finalize` and
//! `MarkValid`, plus the critical-error channel for chain-halting conditions.

use serde::{Deserialize, Serialize};
use shared_types::entities::Header;

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    /// A block was finalized.
    BlockFinalized(Header),

    /// A block's child passed validity checks, so the block itself can be processed.
    BlockProcessable(Header),

    /// The first block of the setup phase was finalized.
    EpochSetupPhaseStarted { counter: u64, header: Header },

    /// The first block of the committed phase was finalized.
    EpochCommittedPhaseStarted { counter: u64, header: Header },

    /// The first block of a new epoch was finalized.
    EpochTransition { counter: u64, header: Header },

    /// A condition that stops the node from making progress.
    CriticalError { reason: String },
}

impl ProtocolEvent {
    /// Get the topic for this event (used for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::BlockFinalized(_) => EventTopic::Finalization,
            Self::BlockProcessable(_) => EventTopic::Processing,
            Self::EpochSetupPhaseStarted { .. }
            | Self::EpochCommittedPhaseStarted { .. }
            | Self::EpochTransition { .. } => EventTopic::EpochPhase,
            Self::CriticalError { .. } => EventTopic::Critical,
        }
    }

    /// Header the event refers to, if any.
    #[must_use]
    pub fn header(&self) -> Option<&Header> {
        match self {
            Self::BlockFinalized(header) | Self::BlockProcessable(header) => Some(header),
            Self::EpochSetupPhaseStarted { header, .. }
            | Self::EpochCommittedPhaseStarted { header, .. }
            | Self::EpochTransition { header, .. } => Some(header),
            Self::CriticalError { .. } => None,
        }
    }
}

/// Event topics for filtering subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Block finalization.
    Finalization,
    /// Blocks becoming processable.
    Processing,
    /// Epoch phase changes and transitions.
    EpochPhase,
    /// Chain-halting conditions.
    Critical,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ProtocolEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
