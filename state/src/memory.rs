//! In-memory key-value store for testing and light nodes

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::Read;
use tessera_core::{KvPair, MutationBatch, Prefix, TesseraError, TesseraResult};

use crate::snapshot::{read_dump, StoreDump};
use crate::store::{logical_pair, physical_bounds, KvStore};

#[derive(Default)]
struct Inner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    closed: bool,
}

impl Inner {
    fn check_open(&self) -> TesseraResult<()> {
        if self.closed {
            return Err(TesseraError::StoreClosed);
        }
        Ok(())
    }
}

/// In-memory store with the same observable behaviour as the sled store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with logical pairs
    pub fn with_data(data: Vec<(Prefix, KvPair)>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for (prefix, pair) in data {
                inner.data.insert(prefix.physical_key(&pair.key), pair.value);
            }
        }
        store
    }
}

impl KvStore for MemoryStore {
    fn get(&self, prefix: Prefix, key: &[u8]) -> TesseraResult<Option<Vec<u8>>> {
        let inner = self.inner.read();
        inner.check_open()?;
        Ok(inner.data.get(&prefix.physical_key(key)).cloned())
    }

    fn get_range(&self, prefix: Prefix, start: &[u8], end: &[u8]) -> TesseraResult<Vec<KvPair>> {
        let inner = self.inner.read();
        inner.check_open()?;
        let Some((lower, upper)) = physical_bounds(prefix, start, end) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .data
            .range(lower..=upper)
            .map(|(key, value)| logical_pair(key, value))
            .collect())
    }

    fn mutate(&self, batch: MutationBatch) -> TesseraResult<()> {
        let mut inner = self.inner.write();
        inner.check_open()?;
        for mutation in batch {
            let key = mutation.physical_key();
            inner.data.insert(key, mutation.value);
        }
        Ok(())
    }

    fn dump(&self) -> TesseraResult<StoreDump> {
        let inner = self.inner.read();
        inner.check_open()?;
        let entries = inner
            .data
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(StoreDump::new(entries))
    }

    fn load(&self, input: &mut dyn Read) -> TesseraResult<()> {
        let entries = read_dump(input)?;
        let mut inner = self.inner.write();
        inner.check_open()?;
        inner.data = entries.into_iter().collect();
        Ok(())
    }

    fn close(&self) -> TesseraResult<()> {
        self.inner.write().closed = true;
        Ok(())
    }

    fn len(&self) -> TesseraResult<usize> {
        let inner = self.inner.read();
        inner.check_open()?;
        Ok(inner.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;

    #[test]
    fn test_memory_store_get() {
        conformance::get_and_not_found(&MemoryStore::new());
    }

    #[test]
    fn test_memory_store_range() {
        conformance::range_is_inclusive_and_ordered(&MemoryStore::new());
    }

    #[test]
    fn test_memory_store_prefix_isolation() {
        conformance::prefixes_are_isolated(&MemoryStore::new());
    }

    #[test]
    fn test_memory_store_empty_batch() {
        conformance::empty_batch_is_noop(&MemoryStore::new());
    }

    #[test]
    fn test_memory_store_dump_load() {
        conformance::dump_load_roundtrip(&MemoryStore::new(), &MemoryStore::new());
    }

    #[test]
    fn test_memory_store_corrupt_load() {
        conformance::corrupt_load_keeps_prior_state(&MemoryStore::new());
    }

    #[test]
    fn test_memory_store_atomic_batches() {
        conformance::batches_are_atomic_to_readers(&MemoryStore::new());
    }

    #[test]
    fn test_memory_store_close() {
        conformance::closed_store_rejects_operations(&MemoryStore::new());
    }

    #[test]
    fn test_with_data() {
        let store = MemoryStore::with_data(vec![
            (Prefix::History, KvPair::new("a", "1")),
            (Prefix::Version, KvPair::new("a", "2")),
        ]);
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get(Prefix::Version, b"a").unwrap(), Some(b"2".to_vec()));
    }
}
