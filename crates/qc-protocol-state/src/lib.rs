//! # qc-protocol-state
//!
//! Protocol state core: fork-aware block extension, finalization, sealing and
//! the epoch lifecycle driven by sealed service events.
//!
//! ## Overview
//!
//! This crate provides:
//! - **Mutator**: `Bootstrap`, `Extend`, `HeaderExtend`, `Finalize`, `MarkValid`
//! - **Seal Chain Validation**: one contiguous seal chain per payload
//! - **Epoch Status Tracking**: Staking → Setup → Committed → next epoch, per block
//! - **Snapshots**: `Final`, `Sealed`, `AtBlockID`, `AtHeight`
//! - **Event Distribution**: finalization and epoch phase notifications
//!
//! ## Architecture
//!
//! ```text
//!                ┌────────────────────────────────────────────┐
//!  candidate ──→ │ ProtocolState                              │
//!                │   extension checks → seal chain → status   │ ──→ EntityStore
//!  finalize  ──→ │   height index, sealed pointer             │
//!                └──────────────┬─────────────────────────────┘
//!                               │ Distributor
//!                               ├──→ BusConsumer ──→ shared-bus
//!                               └──→ other consumers
//! ```
//!
//! ## Epoch Lifecycle
//!
//! ```text
//! [STAKING] ──setup sealed──→ [SETUP] ──commit sealed──→ [COMMITTED]
//!     ↑                                                       │
//!     └─────────────── first view after FinalView ────────────┘
//!
//! FinalView crossed while not COMMITTED ──→ EpochHalt (fatal)
//! ```
//!
//! ## Errors
//!
//! | Error | Meaning |
//! |-------|---------|
//! | `MissingParent` | retry once the parent is known |
//! | `InvalidExtension` | drop the block permanently |
//! | `OutdatedExtension` | conflicts with finalized history |
//! | `EpochHalt` | fatal, operator intervention required |
//!
//! ## Example
//!
//! ```rust,ignore
//! use qc_protocol_state::{MutatorApi, ProtocolState, ProtocolStateConfig, StateApi};
//!
//! let state = ProtocolState::new(store, validator, ProtocolStateConfig::from_env())?;
//! state.bootstrap(&root, &result, &seal)?;
//!
//! state.extend(&block)?;
//! state.finalize(&block.id())?;
//!
//! let phase = state.final_snapshot()?.phase();
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{
    AcceptAllReceiptValidator, AcceptAllSignatures, BusConsumer, Ed25519SignatureVerifier,
    InMemoryKVStore, KvEntityStore, StructuralReceiptValidator,
};
pub use config::{ConfigError, ProtocolStateConfig};
pub use domain::{EpochPhase, EpochStatus};
pub use error::{StateError, StateResult};
pub use events::{Distributor, NoopConsumer};
pub use ports::{
    EntityStore, KeyValueStore, MutatorApi, ProtocolConsumer, ReceiptError, ReceiptValidator,
    SignatureVerifier, StateApi,
};
pub use service::{Dkg, Epoch, Epochs, ProtocolState, Snapshot};
