//! State machine applied by the replication engine

use parking_lot::RwLock;
use serde::Serialize;
use std::io::{Read, Write};
use tessera_core::{
    FatalError, FsmSnapshot, Hash, HashAlgorithm, KvPair, LogEntry, Mutation, MutationBatch,
    NodeConfig, Prefix, ReplicatedStateMachine, StateVersion, TesseraError, TesseraResult,
    VERSION_KEY,
};
use tessera_crypto::commitment;
use tessera_state::{KvStore, SledStore, StoreDump};
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandEnvelope, InsertCommand};

/// Receipt returned for a successful insert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertReceipt {
    pub key: String,
    /// Version attributed to this insert
    pub version: StateVersion,
    /// Commitment to the written key/value pair
    pub commitment: Hash,
}

/// Successful outcome of an applied command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CommandOutput {
    Inserted(InsertReceipt),
}

/// Per-entry result handed back to the replication engine
pub type ApplyResult = TesseraResult<CommandOutput>;

/// Read the next version to attribute from the metadata namespace.
///
/// An absent version key means no command was ever applied, and counting
/// starts at zero.
pub fn recover_version<S: KvStore + ?Sized>(store: &S) -> TesseraResult<StateVersion> {
    match store.get(Prefix::Version, VERSION_KEY)? {
        Some(bytes) => {
            let stored = StateVersion::from_bytes(&bytes).ok_or_else(|| {
                TesseraError::Corruption(format!(
                    "version key holds {} bytes, expected 8",
                    bytes.len()
                ))
            })?;
            Ok(stored.next())
        }
        None => Ok(StateVersion::ZERO),
    }
}

/// Version bookkeeping guarded by the machine's exclusion lock.
///
/// `next` is derived from replicated state alone and is what inserts attribute
/// and persist. `high_water` only ever grows and never reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VersionState {
    next: StateVersion,
    high_water: StateVersion,
}

impl VersionState {
    fn recovered(next: StateVersion) -> Self {
        Self {
            next,
            high_water: next,
        }
    }

    fn advance_to(&mut self, next: StateVersion) {
        self.next = next;
        self.high_water = self.high_water.max(next);
    }
}

/// Replicated state machine over a key-value store
pub struct StateMachine<S: KvStore = SledStore> {
    store: S,
    hasher: HashAlgorithm,
    /// Restore holds this exclusively, Snapshot shares it.
    version: RwLock<VersionState>,
}

impl StateMachine<SledStore> {
    /// Open the sled store under `config.data_dir`
    pub fn open(config: &NodeConfig) -> TesseraResult<Self> {
        let store = SledStore::open(&config.data_dir, &config.storage)?;
        Self::with_store(store, config.hasher)
    }
}

impl<S: KvStore> StateMachine<S> {
    pub fn with_store(store: S, hasher: HashAlgorithm) -> TesseraResult<Self> {
        let version = recover_version(&store)?;
        info!("State machine ready at {}", version);
        Ok(Self {
            store,
            hasher,
            version: RwLock::new(VersionState::recovered(version)),
        })
    }

    /// Highest version this process has reached. Never decreases, not even
    /// when a restore installs older state.
    pub fn version(&self) -> StateVersion {
        self.version.read().high_water
    }

    /// Version the next applied command will be attributed, as recovered from
    /// the store's own metadata
    pub fn next_version(&self) -> StateVersion {
        self.version.read().next
    }

    pub fn get(&self, prefix: Prefix, key: &[u8]) -> TesseraResult<Option<Vec<u8>>> {
        self.store.get(prefix, key)
    }

    pub fn get_range(&self, prefix: Prefix, start: &[u8], end: &[u8]) -> TesseraResult<Vec<KvPair>> {
        self.store.get_range(prefix, start, end)
    }

    fn execute(&self, command: Command, version: &mut VersionState) -> ApplyResult {
        match command {
            Command::Insert(insert) => self.apply_insert(insert, version).map(CommandOutput::Inserted),
        }
    }

    fn apply_insert(&self, insert: InsertCommand, version: &mut VersionState) -> TesseraResult<InsertReceipt> {
        let attributed = version.next;
        let commitment = commitment(self.hasher, insert.key.as_bytes(), insert.value.as_bytes());

        let batch = MutationBatch::new()
            .with(Mutation::new(Prefix::History, insert.key.as_bytes(), insert.value.into_bytes()))
            .with(Mutation::new(Prefix::Version, VERSION_KEY, attributed.to_bytes()));
        self.store.mutate(batch)?;

        version.advance_to(attributed.next());
        Ok(InsertReceipt {
            key: insert.key,
            version: attributed,
            commitment,
        })
    }
}

impl<S: KvStore> ReplicatedStateMachine for StateMachine<S> {
    type Output = CommandOutput;
    type Snapshot = StoreSnapshot;

    fn apply(&self, entry: &LogEntry) -> Result<ApplyResult, FatalError> {
        let envelope = CommandEnvelope::decode(&entry.data).map_err(|e| {
            error!("Undecodable log entry {} (term {}): {}", entry.index, entry.term, e);
            FatalError {
                index: entry.index,
                term: entry.term,
                reason: e.to_string(),
            }
        })?;

        let mut version = self.version.write();
        let result = Command::from_envelope(&envelope).and_then(|command| {
            debug!("Applying {} at index {}", command.name(), entry.index);
            self.execute(command, &mut version)
        });

        match &result {
            Err(e) if e.is_storage() => error!("Store rejected entry {}: {}", entry.index, e),
            Err(e) => warn!("Command at index {} failed: {}", entry.index, e),
            Ok(_) => {}
        }
        Ok(result)
    }

    fn snapshot(&self) -> TesseraResult<StoreSnapshot> {
        let version = self.version.read();
        let dump = self.store.dump()?;
        info!("Captured snapshot of {} entries at {}", dump.len(), version.next);
        Ok(StoreSnapshot {
            dump,
            version: version.next,
        })
    }

    fn restore(&self, input: &mut dyn Read) -> TesseraResult<()> {
        let mut version = self.version.write();
        self.store.load(input)?;

        let recovered = recover_version(&self.store)?;
        let previous = version.next;
        version.advance_to(recovered);
        info!(
            "Restored snapshot: next version {} -> {}, high water {}",
            previous, recovered, version.high_water
        );
        Ok(())
    }

    fn close(&self) -> TesseraResult<()> {
        self.store.close()
    }
}

/// Point-in-time capture of the store, pinned when [`StateMachine::snapshot`] ran
pub struct StoreSnapshot {
    dump: StoreDump,
    version: StateVersion,
}

impl StoreSnapshot {
    /// Next version to attribute at capture time
    pub fn version(&self) -> StateVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.dump.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dump.is_empty()
    }
}

impl FsmSnapshot for StoreSnapshot {
    fn persist(&mut self, sink: &mut dyn Write) -> TesseraResult<()> {
        let count = self.dump.write_to(sink)?;
        debug!("Persisted snapshot with {} entries", count);
        Ok(())
    }

    fn release(&mut self) {
        self.dump = StoreDump::default();
    }
}
