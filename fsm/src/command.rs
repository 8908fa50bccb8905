//! Log entry payload format.
//!
//! Every committed entry carries a JSON envelope `{"type": <tag>, "payload": "<hex>"}`.
//! The tag selects the schema the payload bytes decode as. Decoding happens in two
//! steps because the failure classes differ: a broken envelope means the log itself
//! is corrupt, while an unknown tag or a bad payload only fails that one command.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use tessera_core::{TesseraError, TesseraResult};

/// Discriminant carried in the envelope's `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandType {
    Insert = 0,
}

impl CommandType {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandType::Insert => "insert",
        }
    }
}

impl TryFrom<u32> for CommandType {
    type Error = TesseraError;

    fn try_from(tag: u32) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(CommandType::Insert),
            other => Err(TesseraError::UnknownCommand(other)),
        }
    }
}

/// Outer envelope of a log entry
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(rename = "type")]
    pub kind: u32,
    #[serde_as(as = "Hex")]
    pub payload: Vec<u8>,
}

impl CommandEnvelope {
    pub fn new(kind: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> TesseraResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Structural decode only; the payload is left opaque
    pub fn decode(bytes: &[u8]) -> TesseraResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| TesseraError::MalformedEnvelope(e.to_string()))
    }
}

/// Payload of [`CommandType::Insert`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertCommand {
    pub key: String,
    pub value: String,
}

/// A decoded command. One variant per [`CommandType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Insert(InsertCommand),
}

impl Command {
    pub fn insert(key: impl Into<String>, value: impl Into<String>) -> Self {
        Command::Insert(InsertCommand {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Insert(_) => CommandType::Insert,
        }
    }

    pub fn name(&self) -> &'static str {
        self.command_type().name()
    }

    pub fn to_envelope(&self) -> TesseraResult<CommandEnvelope> {
        let payload = match self {
            Command::Insert(insert) => serde_json::to_vec(insert)?,
        };
        Ok(CommandEnvelope::new(self.command_type().tag(), payload))
    }

    pub fn encode(&self) -> TesseraResult<Vec<u8>> {
        self.to_envelope()?.encode()
    }

    /// Decode the payload of an already-decoded envelope
    pub fn from_envelope(envelope: &CommandEnvelope) -> TesseraResult<Self> {
        match CommandType::try_from(envelope.kind)? {
            CommandType::Insert => {
                let insert: InsertCommand = decode_payload(CommandType::Insert, &envelope.payload)?;
                Ok(Command::Insert(insert))
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> TesseraResult<Self> {
        Self::from_envelope(&CommandEnvelope::decode(bytes)?)
    }
}

fn decode_payload<T: serde::de::DeserializeOwned>(kind: CommandType, payload: &[u8]) -> TesseraResult<T> {
    serde_json::from_slice(payload).map_err(|e| TesseraError::MalformedPayload {
        command: kind.name(),
        reason: e.to_string(),
    })
}
