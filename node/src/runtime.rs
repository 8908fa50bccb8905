//! Node runtime hosting the state machine

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::{
    FatalError, FsmSnapshot, KvPair, LogEntry, NodeConfig, Prefix, ReplicatedStateMachine,
    StateVersion,
};
use tessera_fsm::{ApplyResult, Command, StateMachine};
use tracing::{info, warn};

/// Outcome of replaying a log file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: u64,
    pub failed: u64,
}

/// Runtime owning the state machine for the lifetime of the process.
///
/// Stands in for the replication engine: it assigns log indices to the
/// entries it applies and never applies concurrently with a snapshot.
pub struct NodeRuntime {
    machine: Arc<StateMachine>,
    next_index: AtomicU64,
}

impl NodeRuntime {
    pub async fn open(config: NodeConfig) -> anyhow::Result<Self> {
        let (name, data_dir) = (config.name.clone(), config.data_dir.clone());
        let machine = tokio::task::spawn_blocking(move || StateMachine::open(&config))
            .await?
            .with_context(|| format!("opening store at {}", data_dir.display()))?;

        info!("Node '{}' opened at {}", name, machine.version());
        Ok(Self {
            machine: Arc::new(machine),
            next_index: AtomicU64::new(1),
        })
    }

    pub fn version(&self) -> StateVersion {
        self.machine.version()
    }

    pub fn next_version(&self) -> StateVersion {
        self.machine.next_version()
    }

    /// Apply raw entry bytes as the next log entry
    pub async fn apply(&self, data: Vec<u8>) -> Result<ApplyResult, FatalError> {
        let entry = LogEntry::new(self.next_index.fetch_add(1, Ordering::SeqCst), 0, data);
        let machine = self.machine.clone();
        match tokio::task::spawn_blocking(move || machine.apply(&entry)).await {
            Ok(result) => result,
            Err(join) => std::panic::resume_unwind(join.into_panic()),
        }
    }

    pub async fn insert(&self, key: &str, value: &str) -> anyhow::Result<ApplyResult> {
        let data = Command::insert(key, value).encode()?;
        Ok(self.apply(data).await?)
    }

    /// Apply every non-empty line of `path` as one entry, in order
    pub async fn replay(&self, path: &Path) -> anyhow::Result<ReplaySummary> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading log {}", path.display()))?;

        let mut summary = ReplaySummary::default();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match self.apply(line.as_bytes().to_vec()).await? {
                Ok(_) => summary.applied += 1,
                Err(e) => {
                    warn!("Entry rejected: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Replayed {}: {} applied, {} failed",
            path.display(),
            summary.applied,
            summary.failed
        );
        Ok(summary)
    }

    pub async fn get(&self, prefix: Prefix, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let machine = self.machine.clone();
        let key = key.as_bytes().to_vec();
        Ok(tokio::task::spawn_blocking(move || machine.get(prefix, &key)).await??)
    }

    pub async fn range(&self, prefix: Prefix, start: &str, end: &str) -> anyhow::Result<Vec<KvPair>> {
        let machine = self.machine.clone();
        let (start, end) = (start.as_bytes().to_vec(), end.as_bytes().to_vec());
        Ok(tokio::task::spawn_blocking(move || machine.get_range(prefix, &start, &end)).await??)
    }

    /// Capture a snapshot and persist it to `path`. Returns the entry count.
    pub async fn snapshot_to(&self, path: &Path) -> anyhow::Result<usize> {
        let machine = self.machine.clone();
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
            let mut snapshot = machine.snapshot()?;
            let count = snapshot.len();

            let mut file = std::fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            snapshot.persist(&mut file)?;
            file.sync_all()?;
            snapshot.release();

            info!("Snapshot of {} entries written to {}", count, path.display());
            Ok(count)
        })
        .await?
    }

    pub async fn restore_from(&self, path: &Path) -> anyhow::Result<()> {
        let machine = self.machine.clone();
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut file = std::fs::File::open(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            machine.restore(&mut file)?;
            Ok(())
        })
        .await?
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        let machine = self.machine.clone();
        tokio::task::spawn_blocking(move || machine.close()).await??;
        Ok(())
    }
}
