//! Tessera Cryptography Module
//! 
//! Hashing used for insert commitments and snapshot checksums:
//! - BLAKE3 (default)
//! - SHA-256 (selectable through configuration)

pub mod hashing;

pub use hashing::*;
