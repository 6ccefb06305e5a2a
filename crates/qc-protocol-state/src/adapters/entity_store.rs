//! # Key-Value Entity Store
//!
//! `EntityStore` over any `KeyValueStore`. Values are bincode encoded and
//! keys are namespaced by `KeyPrefix`.
//!
//! | Write | Key | Policy |
//! |-------|-----|--------|
//! | header, payload, seal, result, setup, commit | `{prefix}{id}` | content addressed, idempotent |
//! | seal index, epoch status, validity, payload validated | `{prefix}{block_id}` | idempotent per block |
//! | height index | `n:{height}` | strict, `AlreadyExists` on conflict |
//! | finalized / sealed / root height | `m:{name}` | overwrite |

use crate::domain::epoch::EpochStatus;
use crate::ports::outbound::{BatchOperation, EntityBatch, EntityStore, EntityWrite, KeyValueStore};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{
    EpochCommit, EpochSetup, ExecutionResult, Header, Identifier, Payload, Seal, StorageError,
};
use std::collections::HashMap;

/// Key namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    Header,
    Payload,
    Seal,
    SealByBlock,
    Result,
    EpochSetup,
    EpochCommit,
    EpochStatus,
    Height,
    Validity,
    PayloadValidated,
    Meta,
}

impl KeyPrefix {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            KeyPrefix::Header => b"h:",
            KeyPrefix::Payload => b"p:",
            KeyPrefix::Seal => b"s:",
            KeyPrefix::SealByBlock => b"sb:",
            KeyPrefix::Result => b"r:",
            KeyPrefix::EpochSetup => b"es:",
            KeyPrefix::EpochCommit => b"ec:",
            KeyPrefix::EpochStatus => b"st:",
            KeyPrefix::Height => b"n:",
            KeyPrefix::Validity => b"v:",
            KeyPrefix::PayloadValidated => b"pv:",
            KeyPrefix::Meta => b"m:",
        }
    }

    pub fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = self.as_bytes().to_vec();
        key.extend_from_slice(suffix);
        key
    }

    pub fn height_key(height: u64) -> Vec<u8> {
        KeyPrefix::Height.key(&height.to_be_bytes())
    }
}

const FINALIZED_HEIGHT: &[u8] = b"finalized";
const SEALED_HEIGHT: &[u8] = b"sealed";
const ROOT_HEIGHT: &[u8] = b"root";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePolicy {
    Idempotent,
    Strict,
    Overwrite,
}

/// Entity store backed by a key-value engine.
pub struct KvEntityStore<K: KeyValueStore> {
    kv: RwLock<K>,
}

impl<K: KeyValueStore> KvEntityStore<K> {
    pub fn new(kv: K) -> Self {
        Self {
            kv: RwLock::new(kv),
        }
    }

    fn read<T: DeserializeOwned>(&self, key: &[u8], what: &str) -> Result<T, StorageError> {
        let bytes = self
            .kv
            .read()
            .get(key)?
            .ok_or_else(|| StorageError::NotFound(what.to_string()))?;
        bincode::deserialize(&bytes)
            .map_err(|e| StorageError::Corruption(format!("{what}: {e}")))
    }

    fn read_by_id<T: DeserializeOwned>(
        &self,
        prefix: KeyPrefix,
        id: &Identifier,
        kind: &str,
    ) -> Result<T, StorageError> {
        self.read(&prefix.key(id), &format!("{kind} {}", hex::encode(id)))
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
        bincode::serialize(value).map_err(|e| StorageError::Corruption(format!("encode: {e}")))
    }

    fn plan(write: EntityWrite) -> Result<(Vec<u8>, Vec<u8>, WritePolicy), StorageError> {
        use WritePolicy::*;
        Ok(match write {
            EntityWrite::Header(header) => (
                KeyPrefix::Header.key(&header.id()),
                Self::encode(&header)?,
                Idempotent,
            ),
            EntityWrite::Payload { block_id, payload } => (
                KeyPrefix::Payload.key(&block_id),
                Self::encode(&payload)?,
                Idempotent,
            ),
            EntityWrite::Seal(seal) => (
                KeyPrefix::Seal.key(&seal.id()),
                Self::encode(&seal)?,
                Idempotent,
            ),
            EntityWrite::SealIndex { block_id, seal_id } => (
                KeyPrefix::SealByBlock.key(&block_id),
                Self::encode(&seal_id)?,
                Idempotent,
            ),
            EntityWrite::Result(result) => (
                KeyPrefix::Result.key(&result.id()),
                Self::encode(&result)?,
                Idempotent,
            ),
            EntityWrite::EpochSetup(setup) => (
                KeyPrefix::EpochSetup.key(&setup.id()),
                Self::encode(&setup)?,
                Idempotent,
            ),
            EntityWrite::EpochCommit(commit) => (
                KeyPrefix::EpochCommit.key(&commit.id()),
                Self::encode(&commit)?,
                Idempotent,
            ),
            EntityWrite::EpochStatus { block_id, status } => (
                KeyPrefix::EpochStatus.key(&block_id),
                Self::encode(&status)?,
                Idempotent,
            ),
            EntityWrite::HeightIndex { height, block_id } => (
                KeyPrefix::height_key(height),
                Self::encode(&block_id)?,
                Strict,
            ),
            EntityWrite::FinalizedHeight(height) => (
                KeyPrefix::Meta.key(FINALIZED_HEIGHT),
                Self::encode(&height)?,
                Overwrite,
            ),
            EntityWrite::SealedHeight(height) => (
                KeyPrefix::Meta.key(SEALED_HEIGHT),
                Self::encode(&height)?,
                Overwrite,
            ),
            EntityWrite::RootHeight(height) => (
                KeyPrefix::Meta.key(ROOT_HEIGHT),
                Self::encode(&height)?,
                Overwrite,
            ),
            EntityWrite::Validity { block_id } => (
                KeyPrefix::Validity.key(&block_id),
                Self::encode(&true)?,
                Idempotent,
            ),
            EntityWrite::PayloadValidated { block_id } => (
                KeyPrefix::PayloadValidated.key(&block_id),
                Self::encode(&true)?,
                Idempotent,
            ),
        })
    }
}

impl<K: KeyValueStore> EntityStore for KvEntityStore<K> {
    fn retrieve_header(&self, block_id: &Identifier) -> Result<Header, StorageError> {
        self.read_by_id(KeyPrefix::Header, block_id, "header")
    }

    fn header_exists(&self, block_id: &Identifier) -> Result<bool, StorageError> {
        self.kv.read().exists(&KeyPrefix::Header.key(block_id))
    }

    fn retrieve_payload(&self, block_id: &Identifier) -> Result<Payload, StorageError> {
        self.read_by_id(KeyPrefix::Payload, block_id, "payload")
    }

    fn retrieve_seal(&self, seal_id: &Identifier) -> Result<Seal, StorageError> {
        self.read_by_id(KeyPrefix::Seal, seal_id, "seal")
    }

    fn lookup_seal_by_block(&self, block_id: &Identifier) -> Result<Seal, StorageError> {
        let seal_id: Identifier = self.read_by_id(KeyPrefix::SealByBlock, block_id, "seal index")?;
        self.retrieve_seal(&seal_id)
    }

    fn retrieve_execution_result(
        &self,
        result_id: &Identifier,
    ) -> Result<ExecutionResult, StorageError> {
        self.read_by_id(KeyPrefix::Result, result_id, "execution result")
    }

    fn lookup_block_height(&self, height: u64) -> Result<Identifier, StorageError> {
        self.read(
            &KeyPrefix::height_key(height),
            &format!("finalized block at height {height}"),
        )
    }

    fn retrieve_epoch_setup(&self, setup_id: &Identifier) -> Result<EpochSetup, StorageError> {
        self.read_by_id(KeyPrefix::EpochSetup, setup_id, "epoch setup")
    }

    fn retrieve_epoch_commit(&self, commit_id: &Identifier) -> Result<EpochCommit, StorageError> {
        self.read_by_id(KeyPrefix::EpochCommit, commit_id, "epoch commit")
    }

    fn retrieve_epoch_status(&self, block_id: &Identifier) -> Result<EpochStatus, StorageError> {
        self.read_by_id(KeyPrefix::EpochStatus, block_id, "epoch status")
    }

    fn retrieve_block_validity(&self, block_id: &Identifier) -> Result<bool, StorageError> {
        self.kv.read().exists(&KeyPrefix::Validity.key(block_id))
    }

    fn retrieve_payload_validated(&self, block_id: &Identifier) -> Result<bool, StorageError> {
        self.kv
            .read()
            .exists(&KeyPrefix::PayloadValidated.key(block_id))
    }

    fn retrieve_finalized_height(&self) -> Result<u64, StorageError> {
        self.read(&KeyPrefix::Meta.key(FINALIZED_HEIGHT), "finalized height")
    }

    fn retrieve_sealed_height(&self) -> Result<u64, StorageError> {
        self.read(&KeyPrefix::Meta.key(SEALED_HEIGHT), "sealed height")
    }

    fn retrieve_root_height(&self) -> Result<u64, StorageError> {
        self.read(&KeyPrefix::Meta.key(ROOT_HEIGHT), "root height")
    }

    fn commit(&self, batch: EntityBatch) -> Result<(), StorageError> {
        let mut kv = self.kv.write();
        let mut staged: HashMap<Vec<u8>, Vec<u8>> = HashMap::with_capacity(batch.len());
        let mut operations = Vec::with_capacity(batch.len());

        for write in batch.into_writes() {
            let (key, value, policy) = Self::plan(write)?;
            match policy {
                WritePolicy::Idempotent => {
                    if staged.contains_key(&key) || kv.exists(&key)? {
                        continue;
                    }
                }
                WritePolicy::Strict => {
                    let existing = match staged.get(&key) {
                        Some(v) => Some(v.clone()),
                        None => kv.get(&key)?,
                    };
                    match existing {
                        Some(v) if v == value => continue,
                        Some(_) => {
                            return Err(StorageError::AlreadyExists(format!(
                                "index key {}",
                                hex::encode(&key)
                            )))
                        }
                        None => {}
                    }
                }
                WritePolicy::Overwrite => {}
            }
            staged.insert(key.clone(), value.clone());
            operations.push(BatchOperation::put(key, value));
        }

        if operations.is_empty() {
            return Ok(());
        }
        kv.atomic_batch_write(operations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryKVStore;

    fn store() -> KvEntityStore<InMemoryKVStore> {
        KvEntityStore::new(InMemoryKVStore::new())
    }

    fn header(height: u64) -> Header {
        Header {
            chain_id: "test".into(),
            height,
            view: height,
            ..Default::default()
        }
    }

    #[test]
    fn test_header_round_trip_and_missing() {
        let store = store();
        let h = header(3);
        let mut batch = EntityBatch::new();
        batch.insert_header(&h);
        store.commit(batch).unwrap();

        assert_eq!(store.retrieve_header(&h.id()).unwrap(), h);
        assert!(store.header_exists(&h.id()).unwrap());
        assert!(store.retrieve_header(&[9; 32]).unwrap_err().is_not_found());
    }

    #[test]
    fn test_height_index_is_strict_and_atomic() {
        let store = store();
        let mut batch = EntityBatch::new();
        batch.index_height(5, [1; 32]).set_finalized_height(5);
        store.commit(batch).unwrap();

        // Same value again is accepted.
        let mut batch = EntityBatch::new();
        batch.index_height(5, [1; 32]);
        store.commit(batch).unwrap();

        // Conflicting value fails and nothing else in the batch lands.
        let h = header(6);
        let mut batch = EntityBatch::new();
        batch
            .insert_header(&h)
            .index_height(5, [2; 32])
            .set_finalized_height(6);
        let err = store.commit(batch).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert!(!store.header_exists(&h.id()).unwrap());
        assert_eq!(store.retrieve_finalized_height().unwrap(), 5);
        assert_eq!(store.lookup_block_height(5).unwrap(), [1; 32]);
    }

    #[test]
    fn test_seal_lookup_by_block() {
        let store = store();
        let seal = Seal {
            block_id: [3; 32],
            ..Default::default()
        };
        let mut batch = EntityBatch::new();
        batch.insert_seal(&seal).index_seal([7; 32], seal.id());
        store.commit(batch).unwrap();
        assert_eq!(store.lookup_seal_by_block(&[7; 32]).unwrap(), seal);
    }

    #[test]
    fn test_pointers_overwrite_and_validity() {
        let store = store();
        let mut batch = EntityBatch::new();
        batch
            .set_sealed_height(1)
            .set_sealed_height(2)
            .mark_valid([4; 32])
            .mark_payload_validated([5; 32]);
        store.commit(batch).unwrap();
        assert_eq!(store.retrieve_sealed_height().unwrap(), 2);
        assert!(store.retrieve_block_validity(&[4; 32]).unwrap());
        assert!(!store.retrieve_block_validity(&[5; 32]).unwrap());
        assert!(store.retrieve_payload_validated(&[5; 32]).unwrap());
        assert!(!store.retrieve_payload_validated(&[4; 32]).unwrap());
    }

    #[test]
    fn test_corrupt_value_is_reported() {
        let mut kv = InMemoryKVStore::new();
        kv.put(&KeyPrefix::Meta.key(b"root"), &[1]).unwrap();
        let store = KvEntityStore::new(kv);
        assert!(matches!(
            store.retrieve_root_height(),
            Err(StorageError::Corruption(_))
        ));
    }
}
