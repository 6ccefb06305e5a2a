//! Error types for the protocol state
//!
//! Callers tell the four outcome classes apart with the `is_*` helpers:
//!
//! | Class | Helper | Caller action |
//! |-------|--------|---------------|
//! | Missing dependency | `is_missing_parent` | requeue until the parent arrives |
//! | Invalid input | `is_invalid_extension` | drop this block permanently |
//! | Outdated | `is_outdated_extension` | drop; the proposer is not at fault |
//! | Fatal | `is_fatal` | stop progress, alert an operator |

use crate::config::ConfigError;
use crate::ports::outbound::ReceiptError;
use shared_types::{Identifier, StorageError};
use thiserror::Error;

/// Protocol state errors
#[derive(Debug, Error)]
pub enum StateError {
    /// Parent of the candidate block is not in the store
    #[error("Missing parent {parent_id} for block at height {height}")]
    MissingParent { parent_id: String, height: u64 },

    /// Candidate block is structurally or semantically invalid
    #[error("Invalid extension: {reason}")]
    InvalidExtension { reason: String },

    /// Receipt validator rejected an included receipt
    #[error("Invalid extension: receipt {receipt_id} rejected")]
    InvalidReceipt {
        receipt_id: String,
        #[source]
        source: ReceiptError,
    },

    /// Candidate conflicts with finalized history
    #[error("Outdated extension: {reason}")]
    OutdatedExtension { reason: String },

    /// FinalView crossed without a committed next epoch
    #[error("Epoch halt: epoch {counter} ended at view {final_view} but view {view} has no committed next epoch")]
    EpochHalt {
        counter: u64,
        final_view: u64,
        view: u64,
    },

    /// Root block, result, seal or identities are inconsistent
    #[error("Invalid bootstrap: {reason}")]
    InvalidBootstrap { reason: String },

    #[error("Protocol state already bootstrapped")]
    AlreadyBootstrapped,

    #[error("Protocol state not bootstrapped")]
    NotBootstrapped,

    /// Finalize called out of order or on an unknown block
    #[error("Invalid finalization: {reason}")]
    InvalidFinalization { reason: String },

    #[error("Unknown block {block_id}")]
    UnknownBlock { block_id: String },

    /// A snapshot query has no answer at its reference block
    #[error("Not available: {what}")]
    NotAvailable { what: String },

    /// Opaque failure inside the receipt validator
    #[error("Receipt validator failure: {0}")]
    ReceiptValidator(#[source] ReceiptError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl StateError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        StateError::InvalidExtension {
            reason: reason.into(),
        }
    }

    pub fn outdated(reason: impl Into<String>) -> Self {
        StateError::OutdatedExtension {
            reason: reason.into(),
        }
    }

    pub fn missing_parent(parent_id: &Identifier, height: u64) -> Self {
        StateError::MissingParent {
            parent_id: hex::encode(parent_id),
            height,
        }
    }

    pub fn unknown_block(block_id: &Identifier) -> Self {
        StateError::UnknownBlock {
            block_id: hex::encode(block_id),
        }
    }

    pub fn not_available(what: impl Into<String>) -> Self {
        StateError::NotAvailable { what: what.into() }
    }

    pub fn is_missing_parent(&self) -> bool {
        matches!(self, StateError::MissingParent { .. })
    }

    /// Permanent rejection of this exact block.
    pub fn is_invalid_extension(&self) -> bool {
        matches!(
            self,
            StateError::InvalidExtension { .. } | StateError::InvalidReceipt { .. }
        )
    }

    pub fn is_outdated_extension(&self) -> bool {
        matches!(self, StateError::OutdatedExtension { .. })
    }

    /// Conditions under which the node must stop making progress.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StateError::EpochHalt { .. }
                | StateError::Storage(StorageError::Corruption(_))
                | StateError::Storage(StorageError::Database(_))
        )
    }
}

/// Result type for protocol state operations
pub type StateResult<T> = Result<T, StateError>;
