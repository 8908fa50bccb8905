//! Core types for tessera
//!
//! Defines the key model, mutation batches and log entries used across the system.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Well-known key in the [`Prefix::Version`] namespace holding the last attributed version
pub const VERSION_KEY: &[u8] = b"version";

/// 32-byte hash type
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", &self.to_hex()[..16])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(0x{})", self.to_hex())
    }
}

/// State machine version counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StateVersion(pub u64);

impl StateVersion {
    pub const ZERO: StateVersion = StateVersion(0);

    pub fn new(value: u64) -> Self {
        StateVersion(value)
    }

    pub fn next(&self) -> StateVersion {
        StateVersion(self.0.saturating_add(1))
    }

    /// Fixed-width big-endian encoding stored under [`VERSION_KEY`]
    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Decode the fixed-width encoding; `None` if the width is wrong
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 8] = bytes.try_into().ok()?;
        Some(StateVersion(u64::from_be_bytes(arr)))
    }
}

impl fmt::Display for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Single-byte namespace tag prepended to every physical key.
///
/// Tag values are persisted on disk and inside snapshots and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Prefix {
    /// Application records written by applied commands
    History = 0x00,
    /// Store-internal metadata, including [`VERSION_KEY`]
    Version = 0x01,
}

impl Prefix {
    pub const ALL: [Prefix; 2] = [Prefix::History, Prefix::Version];

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Prefix::History),
            0x01 => Some(Prefix::Version),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Prefix::History => "history",
            Prefix::Version => "version",
        }
    }

    /// Physical store key: the tag byte followed by the logical key
    pub fn physical_key(self, key: &[u8]) -> Vec<u8> {
        let mut physical = Vec::with_capacity(key.len() + 1);
        physical.push(self.as_byte());
        physical.extend_from_slice(key);
        physical
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Prefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "history" => Ok(Prefix::History),
            "version" | "meta" => Ok(Prefix::Version),
            other => Err(format!("unknown namespace '{}'", other)),
        }
    }
}

/// Key-value pair with the prefix byte already stripped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KvPair {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One write into a namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub prefix: Prefix,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Mutation {
    pub fn new(prefix: Prefix, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn physical_key(&self) -> Vec<u8> {
        self.prefix.physical_key(&self.key)
    }
}

/// Ordered set of mutations applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    mutations: Vec<Mutation>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(mutation: Mutation) -> Self {
        Self {
            mutations: vec![mutation],
        }
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn with(mut self, mutation: Mutation) -> Self {
        self.push(mutation);
        self
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

impl From<Vec<Mutation>> for MutationBatch {
    fn from(mutations: Vec<Mutation>) -> Self {
        Self { mutations }
    }
}

impl IntoIterator for MutationBatch {
    type Item = Mutation;
    type IntoIter = std::vec::IntoIter<Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.into_iter()
    }
}

/// A committed entry as delivered by the replication engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub data: Vec<u8>,
}

impl LogEntry {
    pub fn new(index: u64, term: u64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            index,
            term,
            data: data.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_encoding() {
        let version = StateVersion::new(0x0102_0304_0506_0708);
        let bytes = version.to_bytes();
        assert_eq!(bytes, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(StateVersion::from_bytes(&bytes), Some(version));
        assert_eq!(StateVersion::from_bytes(&bytes[..7]), None);
    }

    #[test]
    fn test_version_next_saturates() {
        assert_eq!(StateVersion::new(u64::MAX).next(), StateVersion::new(u64::MAX));
        assert_eq!(StateVersion::ZERO.next(), StateVersion::new(1));
    }

    #[test]
    fn test_prefix_tags_are_stable() {
        assert_eq!(Prefix::History.as_byte(), 0x00);
        assert_eq!(Prefix::Version.as_byte(), 0x01);
        assert_eq!(Prefix::from_byte(0x01), Some(Prefix::Version));
        assert_eq!(Prefix::from_byte(0x7f), None);
        assert_eq!("history".parse::<Prefix>().unwrap(), Prefix::History);
        assert!("bogus".parse::<Prefix>().is_err());
    }

    #[test]
    fn test_physical_key() {
        let m = Mutation::new(Prefix::Version, b"version".to_vec(), vec![0u8; 8]);
        assert_eq!(m.physical_key(), b"\x01version".to_vec());
    }

    #[test]
    fn test_hash_hex() {
        let hash = Hash::from_bytes([7u8; 32]);
        assert_eq!(hash.to_hex(), "07".repeat(32));
        assert_eq!(hash.to_string(), hash.to_hex());
    }
}
