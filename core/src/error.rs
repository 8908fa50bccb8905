//! Error types for tessera

use thiserror::Error;

/// Main error type for tessera
#[derive(Error, Debug)]
pub enum TesseraError {
    // ============ Storage Errors ============
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage corruption detected: {0}")]
    Corruption(String),

    #[error("Store is closed")]
    StoreClosed,

    // ============ Codec Errors ============
    #[error("Malformed command envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(u32),

    #[error("Malformed {command} payload: {reason}")]
    MalformedPayload { command: &'static str, reason: String },

    // ============ Snapshot Errors ============
    #[error("Invalid snapshot format: {0}")]
    SnapshotFormat(String),

    #[error("Snapshot checksum mismatch: expected {expected}, got {got}")]
    SnapshotChecksum { expected: String, got: String },

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    Config(String),

    // ============ General Errors ============
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl TesseraError {
    /// True for errors produced by the storage layer rather than by input validation
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            TesseraError::Storage(_) | TesseraError::Corruption(_) | TesseraError::StoreClosed
        )
    }
}

impl From<std::io::Error> for TesseraError {
    fn from(err: std::io::Error) -> Self {
        TesseraError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for TesseraError {
    fn from(err: bincode::Error) -> Self {
        TesseraError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(err: serde_json::Error) -> Self {
        TesseraError::Serialization(err.to_string())
    }
}

/// Unrecoverable failure while applying a committed entry.
///
/// Returned when the outer envelope of a log entry cannot be decoded. Every
/// replica would fail identically, so the host must stop applying rather than
/// skip the entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecoverable log entry at index {index} (term {term}): {reason}")]
pub struct FatalError {
    pub index: u64,
    pub term: u64,
    pub reason: String,
}
