//! Store dump format used for snapshot transfer
//!
//! A dump is a self-describing stream: magic, format version, one bincode frame
//! per physical entry in ascending key order, and a closing frame carrying the
//! entry count and a BLAKE3 checksum over every entry.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use tessera_core::{Hash, Prefix, TesseraError, TesseraResult};
use tessera_crypto::IncrementalHasher;

/// Leading bytes of every dump
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"TSNP";

/// Current dump layout
pub const SNAPSHOT_FORMAT_VERSION: u8 = 1;

/// Upper bound on a single decoded frame
const MAX_FRAME_BYTES: u64 = 256 * 1024 * 1024;

fn frame_options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_FRAME_BYTES)
}

/// Decoded frame
#[derive(Debug, Deserialize)]
enum DumpFrame {
    Entry { key: Vec<u8>, value: Vec<u8> },
    End { count: u64, checksum: Hash },
}

/// Borrowed twin of [`DumpFrame`] with the same variant order and wire layout
#[derive(Serialize)]
enum DumpFrameRef<'a> {
    Entry { key: &'a [u8], value: &'a [u8] },
    End { count: u64, checksum: Hash },
}

fn checksum_entry(hasher: &mut IncrementalHasher, key: &[u8], value: &[u8]) {
    hasher.update(&(key.len() as u64).to_be_bytes());
    hasher.update(key);
    hasher.update(&(value.len() as u64).to_be_bytes());
    hasher.update(value);
}

/// Consistent, owned view of every physical entry in a store
#[derive(Debug, Clone, Default)]
pub struct StoreDump {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl StoreDump {
    /// Entries must already be in ascending physical key order
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stream the dump into `sink` frame by frame. Returns the entry count.
    pub fn write_to<W: Write + ?Sized>(&self, sink: &mut W) -> TesseraResult<u64> {
        let mut writer = BufWriter::new(sink);
        writer.write_all(SNAPSHOT_MAGIC)?;
        writer.write_all(&[SNAPSHOT_FORMAT_VERSION])?;

        let mut hasher = IncrementalHasher::new();
        for (key, value) in &self.entries {
            checksum_entry(&mut hasher, key, value);
            let frame = DumpFrameRef::Entry {
                key: key.as_slice(),
                value: value.as_slice(),
            };
            frame_options().serialize_into(&mut writer, &frame)?;
        }

        let count = self.entries.len() as u64;
        let end = DumpFrameRef::End {
            count,
            checksum: hasher.finalize(),
        };
        frame_options().serialize_into(&mut writer, &end)?;
        writer.flush()?;
        Ok(count)
    }

    pub fn to_bytes(&self) -> TesseraResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// Decode and verify a dump.
///
/// Nothing is returned unless the header, the ordering of keys, every namespace
/// tag, the entry count and the checksum all check out.
pub fn read_dump<R: Read + ?Sized>(input: &mut R) -> TesseraResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut reader = BufReader::new(input);

    let mut header = [0u8; 5];
    reader
        .read_exact(&mut header)
        .map_err(|e| TesseraError::SnapshotFormat(format!("truncated header: {}", e)))?;
    if &header[..4] != SNAPSHOT_MAGIC {
        return Err(TesseraError::SnapshotFormat("bad magic".into()));
    }
    if header[4] != SNAPSHOT_FORMAT_VERSION {
        return Err(TesseraError::SnapshotFormat(format!(
            "unsupported format version {}",
            header[4]
        )));
    }

    let mut hasher = IncrementalHasher::new();
    let mut entries: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    loop {
        let frame: DumpFrame = frame_options()
            .deserialize_from(&mut reader)
            .map_err(|e| TesseraError::SnapshotFormat(format!("frame {}: {}", entries.len(), e)))?;

        match frame {
            DumpFrame::Entry { key, value } => {
                let tag = key
                    .first()
                    .copied()
                    .ok_or_else(|| TesseraError::SnapshotFormat("empty physical key".into()))?;
                if Prefix::from_byte(tag).is_none() {
                    return Err(TesseraError::SnapshotFormat(format!(
                        "unknown namespace tag {:#04x}",
                        tag
                    )));
                }
                if let Some((previous, _)) = entries.last() {
                    if previous >= &key {
                        return Err(TesseraError::SnapshotFormat(
                            "entries out of order".into(),
                        ));
                    }
                }
                checksum_entry(&mut hasher, &key, &value);
                entries.push((key, value));
            }
            DumpFrame::End { count, checksum } => {
                if count != entries.len() as u64 {
                    return Err(TesseraError::SnapshotFormat(format!(
                        "expected {} entries, read {}",
                        count,
                        entries.len()
                    )));
                }
                let computed = hasher.finalize();
                if computed != checksum {
                    return Err(TesseraError::SnapshotChecksum {
                        expected: checksum.to_hex(),
                        got: computed.to_hex(),
                    });
                }
                return Ok(entries);
            }
        }
    }
}
