//! # Message Protocol
//!
//! Defines the application-level vocabulary exchanged between the two peers of
//! an online match:
//! - Per-frame input relay
//! - Character-selection handshake and game start
//! - Shared world events (heal item spawn and collection)
//!
//! ## Wire Envelope
//!
//! Every message is a flat JSON object with a `type` discriminator and a `v`
//! protocol version next to the kind-specific fields:
//! ```text
//! {"v":1,"type":"GAME_START","p1":"fighter_2","p2":"fighter_5"}
//! ```
//!
//! Receivers ignore kinds they do not recognise, and an envelope without `v`
//! is read as version 1. Delivery is fire-and-forget: a message may never
//! arrive and may arrive out of order, so every handler must be idempotent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Version stamped into the `v` field of every outgoing envelope.
pub const PROTOCOL_VERSION: u64 = 1;

/// Every `type` value this build understands.
const KNOWN_KINDS: [&str; 5] = [
    "INPUT",
    "CHARACTER_SELECTED",
    "GAME_START",
    "SPAWN_ITEM",
    "ITEM_COLLECTED",
];

/// Errors raised while encoding or decoding an envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope is not a json object")]
    NotAnObject,
    #[error("envelope has no string `type` field")]
    MissingKind,
}

// ============================================================================
// PAYLOAD TYPES
// ============================================================================

/// Identifier of a fighter as shared between peers (e.g. `fighter_2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FighterId(pub String);

impl FighterId {
    pub fn from_index(index: u8) -> Self {
        Self(format!("fighter_{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FighterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a host-spawned heal item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// One frame of a player's intent as sent to the other peer.
///
/// Directions are level signals (held this frame). The attack fields are edge
/// signals: `true` only on the frame the button went down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFrame {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub attack1_press: bool,
    pub attack2_press: bool,
}

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Core message enum for all peer-to-peer communication during a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// **Input**
    ///
    /// Sent every frame by both peers while playing. Drives the receiver's
    /// puppet of the remote player.
    Input { input: InputFrame },

    /// **Character Selected**
    ///
    /// Client -> host. The client's confirmed fighter; the host records it as
    /// Player 2's selection.
    CharacterSelected { character: FighterId },

    /// **Game Start**
    ///
    /// Host -> client, sent once both selections are known.
    ///
    /// # Fields
    /// - `p1`: Player 1 (host) fighter
    /// - `p2`: Player 2 (client) fighter
    GameStart { p1: FighterId, p2: FighterId },

    /// **Spawn Item**
    ///
    /// Host -> client only. The client mirrors the heal item at the given
    /// arena coordinates.
    SpawnItem { id: ItemId, x: i32, y: i32 },

    /// **Item Collected**
    ///
    /// Sent by whichever peer detected the pickup. The receiver removes its
    /// copy of the item; an unknown or already removed id is a no-op.
    ItemCollected { id: ItemId },
}

impl Message {
    /// The `type` discriminator this message is sent with.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Input { .. } => "INPUT",
            Message::CharacterSelected { .. } => "CHARACTER_SELECTED",
            Message::GameStart { .. } => "GAME_START",
            Message::SpawnItem { .. } => "SPAWN_ITEM",
            Message::ItemCollected { .. } => "ITEM_COLLECTED",
        }
    }

    /// Serialize the message into a versioned JSON envelope.
    ///
    /// # Example
    /// ```ignore
    /// let bytes = Message::ItemCollected { id: ItemId(3) }.to_bytes()?;
    /// ```
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut value = serde_json::to_value(self)?;
        match &mut value {
            Value::Object(map) => {
                map.insert("v".to_string(), Value::from(PROTOCOL_VERSION));
            }
            _ => return Err(ProtocolError::NotAnObject),
        }
        Ok(serde_json::to_vec(&value)?)
    }

    /// Deserialize an envelope received from the peer.
    ///
    /// # Returns
    /// - `Ok(Some(Message))`: a recognised message
    /// - `Ok(None)`: a well-formed envelope of a kind this build does not know
    /// - `Err`: not JSON, not an object, no `type`, or a known kind with bad fields
    pub fn from_bytes(bytes: &[u8]) -> Result<Option<Self>, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let kind = match &value {
            Value::Object(map) => map
                .get("type")
                .and_then(Value::as_str)
                .ok_or(ProtocolError::MissingKind)?,
            _ => return Err(ProtocolError::NotAnObject),
        };

        if !KNOWN_KINDS.contains(&kind) {
            return Ok(None);
        }

        Ok(Some(serde_json::from_value(value)?))
    }
}

/// Protocol version carried by an envelope, `1` when the field is absent.
pub fn envelope_version(bytes: &[u8]) -> Option<u64> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    Some(value.get("v").and_then(Value::as_u64).unwrap_or(1))
}
