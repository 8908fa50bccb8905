//! Persistent key-value store using sled database

use parking_lot::RwLock;
use sled::{Db, Tree};
use std::io::Read;
use std::path::Path;
use tessera_core::{KvPair, MutationBatch, Prefix, StorageConfig, TesseraError, TesseraResult};
use tracing::{debug, info};

use crate::snapshot::{read_dump, StoreDump};
use crate::store::{logical_pair, physical_bounds, KvStore};

const DATA_TREE: &str = "tessera";

fn storage_err(err: sled::Error) -> TesseraError {
    match err {
        sled::Error::Corruption { .. } => TesseraError::Corruption(err.to_string()),
        other => TesseraError::Storage(other.to_string()),
    }
}

/// Persistent store backed by sled database
pub struct SledStore {
    db: Db,
    data: Tree,
    sync_writes: bool,
    /// Readers share, `mutate`/`load`/`close` take it exclusively. Holds the closed flag.
    closed: RwLock<bool>,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> TesseraResult<Self> {
        let path = path.as_ref();
        let db = sled::Config::new()
            .path(path)
            .cache_capacity(config.cache_capacity_bytes)
            .flush_every_ms(config.flush_every_ms)
            .open()
            .map_err(storage_err)?;

        let store = Self::from_db(db, config.sync_writes)?;
        info!(
            "Opened store at {} ({} entries)",
            path.display(),
            store.data.len()
        );
        Ok(store)
    }

    /// Store that lives only as long as the handle, for tests and scratch use
    pub fn temporary() -> TesseraResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::from_db(db, false)
    }

    fn from_db(db: Db, sync_writes: bool) -> TesseraResult<Self> {
        let data = db.open_tree(DATA_TREE).map_err(storage_err)?;
        Ok(Self {
            db,
            data,
            sync_writes,
            closed: RwLock::new(false),
        })
    }

    fn flush_if_sync(&self) -> TesseraResult<()> {
        if self.sync_writes {
            self.db.flush().map_err(storage_err)?;
        }
        Ok(())
    }
}

impl KvStore for SledStore {
    fn get(&self, prefix: Prefix, key: &[u8]) -> TesseraResult<Option<Vec<u8>>> {
        let closed = self.closed.read();
        if *closed {
            return Err(TesseraError::StoreClosed);
        }
        self.data
            .get(prefix.physical_key(key))
            .map(|opt| opt.map(|v| v.to_vec()))
            .map_err(storage_err)
    }

    fn get_range(&self, prefix: Prefix, start: &[u8], end: &[u8]) -> TesseraResult<Vec<KvPair>> {
        let closed = self.closed.read();
        if *closed {
            return Err(TesseraError::StoreClosed);
        }
        let Some((lower, upper)) = physical_bounds(prefix, start, end) else {
            return Ok(Vec::new());
        };

        self.data
            .range(lower..=upper)
            .map(|result| {
                result
                    .map(|(key, value)| logical_pair(&key, &value))
                    .map_err(storage_err)
            })
            .collect()
    }

    fn mutate(&self, batch: MutationBatch) -> TesseraResult<()> {
        let closed = self.closed.write();
        if *closed {
            return Err(TesseraError::StoreClosed);
        }
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len();
        let mut writes = sled::Batch::default();
        for mutation in batch {
            writes.insert(mutation.physical_key(), mutation.value);
        }

        // Apply all writes atomically
        self.data.apply_batch(writes).map_err(storage_err)?;
        self.flush_if_sync()?;
        debug!("Committed batch of {} mutations", count);
        Ok(())
    }

    fn dump(&self) -> TesseraResult<StoreDump> {
        let closed = self.closed.read();
        if *closed {
            return Err(TesseraError::StoreClosed);
        }
        let entries: Result<Vec<(Vec<u8>, Vec<u8>)>, _> = self
            .data
            .iter()
            .map(|result| result.map(|(key, value)| (key.to_vec(), value.to_vec())))
            .collect();

        Ok(StoreDump::new(entries.map_err(storage_err)?))
    }

    fn load(&self, input: &mut dyn Read) -> TesseraResult<()> {
        let entries = read_dump(input)?;

        let closed = self.closed.write();
        if *closed {
            return Err(TesseraError::StoreClosed);
        }

        // One batch removes the old content and writes the new, so readers see
        // either the previous store or the loaded one
        let mut writes = sled::Batch::default();
        for key in self.data.iter().keys() {
            writes.remove(key.map_err(storage_err)?);
        }
        let count = entries.len();
        for (key, value) in entries {
            writes.insert(key, value);
        }

        self.data.apply_batch(writes).map_err(storage_err)?;
        self.flush_if_sync()?;
        info!("Loaded {} entries from dump", count);
        Ok(())
    }

    fn close(&self) -> TesseraResult<()> {
        let mut closed = self.closed.write();
        if *closed {
            return Ok(());
        }
        self.db.flush().map_err(storage_err)?;
        *closed = true;
        info!("Store closed");
        Ok(())
    }

    fn len(&self) -> TesseraResult<usize> {
        let closed = self.closed.read();
        if *closed {
            return Err(TesseraError::StoreClosed);
        }
        Ok(self.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::conformance;
    use tempfile::TempDir;
    use tessera_core::Mutation;

    #[test]
    fn test_sled_store_get() {
        conformance::get_and_not_found(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_sled_store_range() {
        conformance::range_is_inclusive_and_ordered(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_sled_store_prefix_isolation() {
        conformance::prefixes_are_isolated(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_sled_store_empty_batch() {
        conformance::empty_batch_is_noop(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_sled_store_dump_load() {
        let source = SledStore::temporary().unwrap();
        let target = SledStore::temporary().unwrap();
        conformance::dump_load_roundtrip(&source, &target);
    }

    #[test]
    fn test_sled_store_corrupt_load() {
        conformance::corrupt_load_keeps_prior_state(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_sled_store_atomic_batches() {
        conformance::batches_are_atomic_to_readers(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_sled_store_close() {
        conformance::closed_store_rejects_operations(&SledStore::temporary().unwrap());
    }

    #[test]
    fn test_sled_store_reopen() {
        let tmp = TempDir::new().unwrap();
        let config = StorageConfig {
            sync_writes: true,
            ..StorageConfig::default()
        };

        // Write data
        {
            let store = SledStore::open(tmp.path(), &config).unwrap();
            let batch = MutationBatch::new()
                .with(Mutation::new(Prefix::History, "k1", "v1"))
                .with(Mutation::new(Prefix::Version, "version", 3u64.to_be_bytes()));
            store.mutate(batch).unwrap();
            store.close().unwrap();
        }

        // Reopen and verify
        {
            let store = SledStore::open(tmp.path(), &config).unwrap();
            assert_eq!(store.get(Prefix::History, b"k1").unwrap(), Some(b"v1".to_vec()));
            assert_eq!(
                store.get(Prefix::Version, b"version").unwrap(),
                Some(3u64.to_be_bytes().to_vec())
            );
            assert_eq!(store.len().unwrap(), 2);
        }
    }

    #[test]
    fn test_sled_dump_into_memory_store() {
        let source = SledStore::temporary().unwrap();
        let target = crate::memory::MemoryStore::new();
        conformance::dump_load_roundtrip(&source, &target);
    }
}
