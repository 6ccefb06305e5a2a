//! In-memory key-value store.

use crate::ports::outbound::{BatchOperation, KeyValueStore};
use shared_types::StorageError;
use std::collections::BTreeMap;

/// Ordered in-memory store.
///
/// Batches are applied in one pass over an owned map, so a failing batch
/// cannot leave partial writes behind.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        Ok(self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_put_and_delete() {
        let mut store = InMemoryKVStore::new();
        store.put(b"a:1", b"one").unwrap();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"a:2".to_vec(), b"two".to_vec()),
                BatchOperation::delete(b"a:1".to_vec()),
            ])
            .unwrap();
        assert!(!store.exists(b"a:1").unwrap());
        assert_eq!(store.get(b"a:2").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn test_prefix_scan_is_ordered_and_bounded() {
        let mut store = InMemoryKVStore::new();
        for key in [&b"h:\x02"[..], b"h:\x01", b"i:\x00", b"g:\xff"] {
            store.put(key, b"x").unwrap();
        }
        let keys: Vec<Vec<u8>> = store
            .prefix_scan(b"h:")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"h:\x01".to_vec(), b"h:\x02".to_vec()]);
    }
}
