//! Signal-server wire protocol.
//!
//! A peer keeps the connection that registered its name open for as long as
//! it wants to own the name; the server releases the name when that
//! connection closes. Lookups use short-lived connections.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Requests sent by peers to the signal server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalRequest {
    /// Claim `name`; incoming game links are accepted on `port` at the
    /// address the server sees this connection coming from.
    Register { name: String, port: u16 },
    /// Resolve `name` to a dialable endpoint.
    Lookup { name: String },
}

/// Responses from the signal server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignalResponse {
    /// The name is ours until this connection closes.
    Registered { lease: Uuid },
    /// Another peer holds the name.
    Taken,
    Found { endpoint: String },
    NotFound,
}
