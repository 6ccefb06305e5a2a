//! Notification fan-out for finalization and epoch phase changes.

pub mod distributor;

pub use distributor::{Distributor, NoopConsumer};
