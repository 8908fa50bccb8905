//! Core key-value store trait

use std::io::Read;
use tessera_core::{KvPair, MutationBatch, Prefix, TesseraResult};

use crate::snapshot::StoreDump;

/// Durable, prefix-partitioned byte store.
///
/// Every physical key is `[prefix] ++ key`. Callers only ever see logical keys;
/// the prefix byte is stripped from everything returned.
///
/// Implementations isolate readers from writers: `get`, `get_range` and `dump`
/// never observe a half-applied `mutate` or `load`.
pub trait KvStore: Send + Sync {
    /// Point lookup. Absence is `Ok(None)`, never an error.
    fn get(&self, prefix: Prefix, key: &[u8]) -> TesseraResult<Option<Vec<u8>>>;

    /// All pairs in `prefix` with `start <= key <= end`, ascending by key
    fn get_range(&self, prefix: Prefix, start: &[u8], end: &[u8]) -> TesseraResult<Vec<KvPair>>;

    /// Apply every mutation in `batch` or none of them
    fn mutate(&self, batch: MutationBatch) -> TesseraResult<()>;

    /// Pin a consistent view of every namespace for transfer
    fn dump(&self) -> TesseraResult<StoreDump>;

    /// Replace all content with the dump read from `input`.
    ///
    /// The stream is fully decoded and verified before the store is touched, so a
    /// failed load leaves prior content intact.
    fn load(&self, input: &mut dyn Read) -> TesseraResult<()>;

    /// Flush and release resources. A second close is a no-op.
    fn close(&self) -> TesseraResult<()>;

    /// Number of physical entries across all namespaces
    fn len(&self) -> TesseraResult<usize>;

    fn is_empty(&self) -> TesseraResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Physical bounds for an inclusive logical range, or `None` if the range is empty
pub(crate) fn physical_bounds(prefix: Prefix, start: &[u8], end: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    if start > end {
        return None;
    }
    Some((prefix.physical_key(start), prefix.physical_key(end)))
}

/// Strip the prefix byte from a physical key
pub(crate) fn logical_pair(physical_key: &[u8], value: &[u8]) -> KvPair {
    KvPair::new(&physical_key[1..], value)
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every `KvStore` implementation must share.

    use super::*;
    use tessera_core::{Mutation, TesseraError};

    fn put(store: &dyn KvStore, prefix: Prefix, key: &str, value: &str) {
        store
            .mutate(MutationBatch::single(Mutation::new(prefix, key, value)))
            .unwrap();
    }

    pub fn get_and_not_found(store: &dyn KvStore) {
        assert_eq!(store.get(Prefix::History, b"missing").unwrap(), None);

        put(store, Prefix::History, "a", "1");
        assert_eq!(store.get(Prefix::History, b"a").unwrap(), Some(b"1".to_vec()));

        put(store, Prefix::History, "a", "2");
        assert_eq!(store.get(Prefix::History, b"a").unwrap(), Some(b"2".to_vec()));
    }

    pub fn range_is_inclusive_and_ordered(store: &dyn KvStore) {
        for key in ["d", "b", "a", "c", "e"] {
            put(store, Prefix::History, key, &key.to_uppercase());
        }

        let range = store.get_range(Prefix::History, b"b", b"d").unwrap();
        let keys: Vec<_> = range.iter().map(|p| p.key.clone()).collect();
        assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
        assert_eq!(range[0].value, b"B".to_vec());

        assert!(store.get_range(Prefix::History, b"d", b"b").unwrap().is_empty());
    }

    pub fn prefixes_are_isolated(store: &dyn KvStore) {
        put(store, Prefix::History, "version", "history-side");
        put(store, Prefix::Version, "version", "meta-side");

        let history = store.get_range(Prefix::History, b"", b"\xff").unwrap();
        assert_eq!(history, vec![KvPair::new("version", "history-side")]);

        let meta = store.get_range(Prefix::Version, b"", b"\xff").unwrap();
        assert_eq!(meta, vec![KvPair::new("version", "meta-side")]);
    }

    pub fn empty_batch_is_noop(store: &dyn KvStore) {
        store.mutate(MutationBatch::new()).unwrap();
        assert!(store.is_empty().unwrap());
    }

    pub fn dump_load_roundtrip(source: &dyn KvStore, target: &dyn KvStore) {
        put(source, Prefix::History, "a", "1");
        put(source, Prefix::History, "b", "2");
        put(source, Prefix::Version, "version", "\0\0\0\0\0\0\0\x07");
        put(target, Prefix::History, "stale", "gone");

        let bytes = source.dump().unwrap().to_bytes().unwrap();
        target.load(&mut bytes.as_slice()).unwrap();

        assert_eq!(target.len().unwrap(), 3);
        assert_eq!(target.get(Prefix::History, b"stale").unwrap(), None);
        for prefix in Prefix::ALL {
            assert_eq!(
                source.get_range(prefix, b"", b"\xff").unwrap(),
                target.get_range(prefix, b"", b"\xff").unwrap()
            );
        }
    }

    pub fn corrupt_load_keeps_prior_state(store: &dyn KvStore) {
        put(store, Prefix::History, "keep", "me");
        let mut bytes = store.dump().unwrap().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        assert!(store.load(&mut bytes.as_slice()).is_err());
        assert!(store.load(&mut &b"garbage"[..]).is_err());
        assert_eq!(store.get(Prefix::History, b"keep").unwrap(), Some(b"me".to_vec()));
    }

    pub fn batches_are_atomic_to_readers(store: &dyn KvStore) {
        put(store, Prefix::History, "left", "0");
        put(store, Prefix::History, "right", "0");

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 1..200u32 {
                    let value = i.to_string();
                    let batch = MutationBatch::new()
                        .with(Mutation::new(Prefix::History, "left", value.clone()))
                        .with(Mutation::new(Prefix::History, "right", value));
                    store.mutate(batch).unwrap();
                }
            });
            for _ in 0..2 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let range = store.get_range(Prefix::History, b"left", b"right").unwrap();
                        assert_eq!(range.len(), 2);
                        assert_eq!(range[0].value, range[1].value, "torn batch observed");
                    }
                });
            }
        });
    }

    pub fn closed_store_rejects_operations(store: &dyn KvStore) {
        store.close().unwrap();
        store.close().unwrap();
        assert!(matches!(
            store.get(Prefix::History, b"a"),
            Err(TesseraError::StoreClosed)
        ));
        assert!(store.mutate(MutationBatch::new()).is_err());
        assert!(store.dump().is_err());
    }
}
