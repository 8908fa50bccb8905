//! Tessera State Storage
//! 
//! Durable, prefix-partitioned key-value storage with atomic mutation
//! batches and whole-store dump/load for snapshot transfer.

pub mod store;
pub mod memory;
pub mod persistent;
pub mod snapshot;

pub use store::*;
pub use memory::*;
pub use persistent::*;
pub use snapshot::*;
