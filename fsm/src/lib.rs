//! Tessera State Machine
//! 
//! Applies committed log entries to the key-value store, captures snapshots
//! for log compaction and restores state from a transferred snapshot.
//! 
//! - `command`: wire format of log entry payloads
//! - `machine`: the state machine driven by the replication engine

pub mod command;
pub mod machine;

pub use command::*;
pub use machine::*;
