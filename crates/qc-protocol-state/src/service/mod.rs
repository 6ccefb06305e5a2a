//! # Protocol State Service
//!
//! Implements `MutatorApi` and `StateApi` over an `EntityStore`.
//!
//! ## Architecture
//!
//! ```text
//!  candidate ──→ extension checks ──→ seal chain ──→ status derivation ──→ EntityBatch
//!                                                                              │
//!  finalize ──→ height index + sealed pointer ──→ commit ──→ Distributor ──→ consumers
//! ```
//!
//! Writers must be serialized by the caller. Readers go straight to the
//! store, which only ever exposes fully committed batches.

mod extension;
mod mutator;
mod snapshot;

pub use snapshot::{Dkg, Epoch, Epochs, Snapshot};

use crate::config::ProtocolStateConfig;
use crate::domain::epoch::EpochStatus;
use crate::domain::transition::EpochEventSource;
use crate::error::{StateError, StateResult};
use crate::events::Distributor;
use crate::ports::outbound::{EntityStore, ReceiptValidator};
use lru::LruCache;
use parking_lot::Mutex;
use shared_types::{EpochSetup, Header, Identifier, StorageError};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// The protocol state: mutator and read side over one store.
pub struct ProtocolState<S: EntityStore, R: ReceiptValidator> {
    pub(crate) store: Arc<S>,
    pub(crate) validator: Arc<R>,
    pub(crate) distributor: Arc<Distributor>,
    pub(crate) config: ProtocolStateConfig,
    /// Committed epoch statuses by block id.
    pub(crate) statuses: Mutex<LruCache<Identifier, EpochStatus>>,
}

impl<S: EntityStore, R: ReceiptValidator> ProtocolState<S, R> {
    pub fn new(store: Arc<S>, validator: Arc<R>, config: ProtocolStateConfig) -> StateResult<Self> {
        Self::with_distributor(store, validator, Arc::new(Distributor::new()), config)
    }

    /// Fails with `StateError::Config` if `config` does not validate.
    pub fn with_distributor(
        store: Arc<S>,
        validator: Arc<R>,
        distributor: Arc<Distributor>,
        config: ProtocolStateConfig,
    ) -> StateResult<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.status_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            store,
            validator,
            distributor,
            config,
            statuses: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    pub fn config(&self) -> &ProtocolStateConfig {
        &self.config
    }

    /// Epoch status of a stored block.
    pub(crate) fn status_of(&self, block_id: &Identifier) -> StateResult<EpochStatus> {
        if let Some(status) = self.statuses.lock().get(block_id) {
            return Ok(status.clone());
        }
        let status = self.store.retrieve_epoch_status(block_id)?;
        self.statuses.lock().put(*block_id, status.clone());
        Ok(status)
    }

    pub(crate) fn header_of(&self, block_id: &Identifier) -> StateResult<Header> {
        self.store.retrieve_header(block_id).map_err(|e| match e {
            StorageError::NotFound(_) => StateError::unknown_block(block_id),
            other => other.into(),
        })
    }

    pub(crate) fn root_height(&self) -> StateResult<u64> {
        bootstrapped(self.store.retrieve_root_height())
    }

    pub(crate) fn finalized_height(&self) -> StateResult<u64> {
        bootstrapped(self.store.retrieve_finalized_height())
    }

    pub(crate) fn sealed_height(&self) -> StateResult<u64> {
        bootstrapped(self.store.retrieve_sealed_height())
    }
}

/// Maps a missing bookkeeping pointer to `NotBootstrapped`.
fn bootstrapped<T>(result: Result<T, StorageError>) -> StateResult<T> {
    result.map_err(|e| match e {
        StorageError::NotFound(_) => StateError::NotBootstrapped,
        other => other.into(),
    })
}

/// Setup lookups for status derivation, served from the entity store.
pub(crate) struct StoredEvents<'a, S: EntityStore>(pub &'a S);

impl<S: EntityStore> EpochEventSource for StoredEvents<'_, S> {
    fn epoch_setup(&self, setup_id: &Identifier) -> Result<EpochSetup, StorageError> {
        self.0.retrieve_epoch_setup(setup_id)
    }
}

/// Metric label for a rejected extension.
pub(crate) fn rejection_label(err: &StateError) -> &'static str {
    match err {
        StateError::MissingParent { .. } => "missing_parent",
        StateError::OutdatedExtension { .. } => "outdated",
        StateError::EpochHalt { .. } => "epoch_halt",
        StateError::InvalidReceipt { .. } => "invalid_receipt",
        e if e.is_invalid_extension() => "invalid",
        _ => "internal",
    }
}
