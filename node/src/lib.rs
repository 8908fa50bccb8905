//! Tessera Node Implementation
//! 
//! Hosts a state machine over a data directory and drives the replication
//! callback contract (apply, snapshot, restore, close) on behalf of an operator.

mod runtime;

pub use runtime::*;
