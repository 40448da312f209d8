//! # Peer Transport
//!
//! The capability the session is built on: register a named identity, open a
//! link to another name, accept links to our own name, and move opaque
//! payloads over open links.
//!
//! Every operation returns immediately. Outcomes arrive later as
//! [`TransportEvent`]s which the owner drains with [`Transport::poll_event`]
//! from its frame loop, so nothing here ever blocks the caller.
//!
//! ## Implementations
//!
//! - [`memory`]: in-process network for tests and offline demos
//! - [`tcp`]: direct TCP links with name lookup through a signal server

pub mod memory;
pub mod tcp;

use std::fmt;
use thiserror::Error;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::TcpTransport;

/// Handle of one link (established or pending) owned by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Options for an outbound link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Ask for ordered, retransmitted delivery. Callers must not rely on it.
    pub reliable: bool,
}

/// Failure classes reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The requested identity is already registered by someone else
    #[error("identity already in use")]
    UnavailableId,
    /// The remote name is not registered or cannot be reached
    #[error("peer {0} unavailable")]
    PeerUnavailable(String),
    /// The transport itself cannot reach the network
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Other(String),
}

/// Asynchronous notifications produced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// `register(name)` succeeded
    Registered { name: String },
    /// `register(name)` failed
    RegisterFailed { name: String, error: TransportError },
    /// A remote peer opened a link to our identity
    Incoming { link: LinkId },
    /// A link (incoming or outgoing) is ready for data
    Open { link: LinkId },
    /// A payload arrived on a link
    Data { link: LinkId, payload: Vec<u8> },
    /// A link closed (either side)
    Closed { link: LinkId },
    /// An outbound link could not be established
    ConnectFailed { link: LinkId, error: TransportError },
    /// A link-level error that did not close it
    LinkError { link: LinkId, error: TransportError },
    /// An error not tied to a link, e.g. the identity was lost
    Error(TransportError),
}

/// Non-blocking peer transport.
pub trait Transport {
    /// Start registering `name` as our identity.
    fn register(&mut self, name: &str);

    /// Start opening a link to `remote`. The returned id is reported by later
    /// `Open`, `ConnectFailed` or `Closed` events.
    fn connect(&mut self, remote: &str, options: ConnectOptions) -> LinkId;

    /// Hand a payload to an open link.
    fn send(&mut self, link: LinkId, payload: Vec<u8>) -> Result<(), TransportError>;

    fn is_open(&self, link: LinkId) -> bool;

    /// Close a link. Closing an unknown or closed link does nothing.
    fn close(&mut self, link: LinkId);

    /// Release the registered identity, close every link and forget queued
    /// events. Safe to call repeatedly.
    fn destroy(&mut self);

    /// Next queued event, if any.
    fn poll_event(&mut self) -> Option<TransportEvent>;
}
