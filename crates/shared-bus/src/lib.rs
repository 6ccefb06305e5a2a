//! # Shared Bus - Protocol Event Bus
//!
//! Broadcasts protocol-state notifications (finalization, processability,
//! epoch phase changes, critical errors) to any number of in-process
//! subscribers.
//!
//! ```text
//! ┌────────────────┐                    ┌──────────────┐
//! │ Protocol State │                    │  Subscriber  │
//! │  (Distributor) │    publish()       │  (sync, API) │
//! │                │ ──────┐            │              │
//! └────────────────┘       │            └──────────────┘
//!                          ▼                    ↑
//!                    ┌──────────────┐           │
//!                    │  Event Bus   │           │
//!                    │              │ ──────────┘
//!                    └──────────────┘  subscribe()
//! ```
//!
//! Publishing never blocks: slow subscribers lag and skip events rather than
//! holding back the finalizing thread.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{EventFilter, EventTopic, ProtocolEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
