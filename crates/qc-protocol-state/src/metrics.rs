//! # Protocol State Metrics
//!
//! Prometheus metrics for the finalized and sealed chain and the epoch lifecycle.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-protocol-state = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `protocol_state_finalized_height` - Gauge of the latest finalized height
//! - `protocol_state_sealed_height` - Gauge of the latest sealed height
//! - `protocol_state_epoch_counter` - Gauge of the current epoch counter
//! - `protocol_state_epoch_phase` - Gauge of the epoch phase (0=Staking, 1=Setup, 2=Committed)
//! - `protocol_state_extensions_accepted_total` - Counter of inserted blocks (by mode)
//! - `protocol_state_extensions_rejected_total` - Counter of rejected blocks (by reason)

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_gauge, register_int_counter_vec, Gauge, IntCounterVec};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Latest finalized height
    pub static ref FINALIZED_HEIGHT: Gauge = register_gauge!(
        "protocol_state_finalized_height",
        "Height of the latest finalized block"
    )
    .expect("Failed to create FINALIZED_HEIGHT metric");

    /// Latest sealed height
    pub static ref SEALED_HEIGHT: Gauge = register_gauge!(
        "protocol_state_sealed_height",
        "Height of the latest sealed block"
    )
    .expect("Failed to create SEALED_HEIGHT metric");

    /// Current epoch counter as of the finalized block
    pub static ref EPOCH_COUNTER: Gauge = register_gauge!(
        "protocol_state_epoch_counter",
        "Epoch counter at the latest finalized block"
    )
    .expect("Failed to create EPOCH_COUNTER metric");

    /// Epoch phase as of the finalized block
    pub static ref EPOCH_PHASE: Gauge = register_gauge!(
        "protocol_state_epoch_phase",
        "Epoch phase at the latest finalized block (0=Staking, 1=Setup, 2=Committed)"
    )
    .expect("Failed to create EPOCH_PHASE metric");

    /// Inserted blocks, labeled by mode
    pub static ref EXTENSIONS_ACCEPTED: IntCounterVec = register_int_counter_vec!(
        "protocol_state_extensions_accepted_total",
        "Total number of blocks inserted",
        &["mode"]
    )
    .expect("Failed to create EXTENSIONS_ACCEPTED metric");

    /// Rejected blocks, labeled by reason
    pub static ref EXTENSIONS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "protocol_state_extensions_rejected_total",
        "Total number of blocks rejected",
        &["reason"]
    )
    .expect("Failed to create EXTENSIONS_REJECTED metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record a finalized block and the sealed height it implies
#[cfg(feature = "metrics")]
pub fn record_finalized(finalized_height: u64, sealed_height: u64) {
    FINALIZED_HEIGHT.set(finalized_height as f64);
    SEALED_HEIGHT.set(sealed_height as f64);
}

/// Update the epoch gauges
#[cfg(feature = "metrics")]
pub fn set_epoch(counter: u64, phase: u8) {
    EPOCH_COUNTER.set(counter as f64);
    EPOCH_PHASE.set(phase as f64);
}

/// Record an inserted block
#[cfg(feature = "metrics")]
pub fn record_extension_accepted(mode: &str) {
    EXTENSIONS_ACCEPTED.with_label_values(&[mode]).inc();
}

/// Record a rejected block with reason
#[cfg(feature = "metrics")]
pub fn record_extension_rejected(reason: &str) {
    EXTENSIONS_REJECTED.with_label_values(&[reason]).inc();
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_finalized(_finalized_height: u64, _sealed_height: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn set_epoch(_counter: u64, _phase: u8) {}

#[cfg(not(feature = "metrics"))]
pub fn record_extension_accepted(_mode: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_extension_rejected(_reason: &str) {}
