//! Tessera Core Library
//! 
//! Core types, traits, and configuration shared by the tessera crates:
//! the prefix-partitioned key model, the mutation batch, the log entry the
//! replication engine delivers, and the callback contract a state machine
//! exposes back to that engine.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
