//! Core traits defining tessera interfaces
//!
//! These traits describe the callback contract a replication engine drives.

use crate::error::FatalError;
use crate::types::LogEntry;
use std::io::{Read, Write};

/// Result type for tessera operations
pub type TesseraResult<T> = Result<T, crate::error::TesseraError>;

/// Captured point-in-time state handed to the replication engine
pub trait FsmSnapshot: Send {
    /// Write the captured state to `sink`
    fn persist(&mut self, sink: &mut dyn Write) -> TesseraResult<()>;

    /// Called by the engine once it is finished with the snapshot
    fn release(&mut self) {}
}

/// Callback contract exposed to the log-replication engine.
///
/// The engine calls `apply` once per committed entry in log order and never
/// concurrently with another `apply` or with `snapshot`. `restore` may race with
/// `snapshot`; implementations exclude the two themselves.
pub trait ReplicatedStateMachine: Send + Sync {
    /// Successful per-entry output returned to the submitting client
    type Output;

    type Snapshot: FsmSnapshot;

    /// Apply one committed entry.
    ///
    /// The outer `Err` is unrecoverable and the host must halt. The inner result
    /// is the per-command outcome; a failed command still consumes the log position.
    fn apply(&self, entry: &LogEntry) -> Result<TesseraResult<Self::Output>, FatalError>;

    /// Capture the current state for log compaction
    fn snapshot(&self) -> TesseraResult<Self::Snapshot>;

    /// Replace all state with the snapshot read from `input`
    fn restore(&self, input: &mut dyn Read) -> TesseraResult<()>;

    /// Release the underlying store
    fn close(&self) -> TesseraResult<()>;
}
