//! # Session
//!
//! One [`Session`] tracks this process's single peer relationship: the role
//! it plays, the address it acquired, and the channel to the opponent.
//!
//! ## Execution Model
//!
//! The session is owned by the application shell and driven from its frame
//! loop. Operations such as [`Session::join_game`] return immediately; the
//! outcome arrives later through the callbacks, which only ever run inside
//! [`Session::pump`]. Nothing blocks and nothing runs concurrently, so the
//! session needs no locks.
//!
//! ## Lifecycle
//!
//! ```text
//! initialize() -> address acquired -> host_game() / join_game()
//!              -> channel open (on_connected) -> send()/on_data()
//!              -> clean_up() -> back to a fresh, reusable session
//! ```
//!
//! Delivery is at-most-once: sends on a channel that is not open are dropped,
//! never queued.

mod channel;
pub mod diagnostics;
mod establish;

use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::time::Instant;
use thiserror::Error;

use crate::common::address::PeerAddress;
use crate::common::config::NetworkConfig;
use crate::common::messages::Message;
use crate::transport::{LinkId, Transport, TransportEvent};

use channel::Channel;
use diagnostics::SessionLog;

/// Which side of the match this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Created the joinable address; always Player 1
    Host,
    /// Connected to a host's address; always Player 2
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Client => f.write_str("client"),
        }
    }
}

/// User-facing connection failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Host {code} not found/offline.")]
    HostNotFound { code: String },
    #[error("Network Error. Check WiFi.")]
    Network { detail: String },
    #[error("Timeout. Try different WiFi/LTE.")]
    Timeout,
    #[error("Could not get a free code after {attempts} attempts.")]
    AddressExhausted { attempts: u32 },
    #[error("Invalid code {0:?}.")]
    InvalidCode(String),
    #[error("Session is already the {0}; clean up first.")]
    RoleLocked(Role),
    #[error("Error: {0}")]
    Transport(String),
}

pub type ConnectedHandler = Box<dyn FnMut()>;
pub type ErrorHandler = Box<dyn FnMut(SessionError)>;
pub type DataHandler = Box<dyn FnMut(Message)>;

/// Progress of address acquisition.
#[derive(Debug, Clone)]
enum Identity {
    Unset,
    Acquiring {
        candidate: PeerAddress,
        attempts: u32,
        /// Set while waiting out the collision backoff
        retry_at: Option<Instant>,
    },
    Ready(PeerAddress),
}

/// An outstanding `join_game` call.
#[derive(Debug)]
struct PendingJoin {
    target: PeerAddress,
    link: Option<LinkId>,
    /// Armed on the first pump after the join
    deadline: Option<Instant>,
    /// Whether this join already reported its one error
    reported: bool,
}

/// The local end of one peer relationship.
pub struct Session<T: Transport> {
    transport: T,
    config: NetworkConfig,
    rng: StdRng,
    identity: Identity,
    role: Option<Role>,
    channel: Option<Channel>,
    join: Option<PendingJoin>,
    on_connected: Option<ConnectedHandler>,
    on_error: Option<ErrorHandler>,
    on_data: Option<DataHandler>,
    log: SessionLog,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: NetworkConfig) -> Self {
        Self::with_rng(transport, config, StdRng::from_entropy())
    }

    /// Create a session whose codes come from `rng`.
    pub fn with_rng(transport: T, config: NetworkConfig, rng: StdRng) -> Self {
        Self {
            transport,
            config,
            rng,
            identity: Identity::Unset,
            role: None,
            channel: None,
            join: None,
            on_connected: None,
            on_error: None,
            on_data: None,
            log: SessionLog::default(),
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// The acquired address, once registration succeeded.
    pub fn address(&self) -> Option<&PeerAddress> {
        match &self.identity {
            Identity::Ready(address) => Some(address),
            _ => None,
        }
    }

    /// The human-shareable code of the acquired address.
    pub fn code(&self) -> Option<&str> {
        self.address().map(PeerAddress::code)
    }

    /// Whether address acquisition has started and not yet finished.
    pub fn is_acquiring(&self) -> bool {
        matches!(self.identity, Identity::Acquiring { .. })
    }

    /// Address of the host this client joined; hosts do not learn it.
    pub fn remote_address(&self) -> Option<&PeerAddress> {
        self.channel.as_ref().and_then(|ch| ch.remote.as_ref())
    }

    /// Whether the channel to the opponent is open.
    pub fn is_connected(&self) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|ch| ch.open && self.transport.is_open(ch.link))
    }

    /// The last few connection log lines, newline separated.
    pub fn logs(&self) -> String {
        self.log.render()
    }

    /// Register the callback used for errors outside a `join_game` call,
    /// e.g. a network failure while acquiring the host address.
    pub fn set_error_handler<E>(&mut self, on_error: E)
    where
        E: FnMut(SessionError) + 'static,
    {
        self.on_error = Some(Box::new(on_error));
    }

    // ========================================================================
    // EVENT LOOP
    // ========================================================================

    /// Process everything the transport reported and fire due timers.
    pub fn pump(&mut self) {
        self.pump_at(Instant::now());
    }

    /// [`Session::pump`] with an explicit clock reading.
    pub fn pump_at(&mut self, now: Instant) {
        while let Some(event) = self.transport.poll_event() {
            self.handle_event(event, now);
        }
        self.fire_timers(now);
    }

    fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Registered { name } => self.on_registered(&name),
            TransportEvent::RegisterFailed { name, error } => {
                self.on_register_failed(&name, error, now)
            }
            TransportEvent::Incoming { link } => self.on_incoming(link),
            TransportEvent::Open { link } => self.on_open(link),
            TransportEvent::Data { link, payload } => self.on_payload(link, &payload),
            TransportEvent::Closed { link } => self.on_closed(link),
            TransportEvent::ConnectFailed { link, error } => self.on_connect_failed(link, error),
            TransportEvent::LinkError { link, error } => {
                self.log.push(format!("Conn Err: {}", error));
                debug!("{} reported {}", link, error);
            }
            TransportEvent::Error(error) => self.on_transport_error(error),
        }
    }

    /// Deliver an error to the registered callback, at most once per join.
    fn report(&mut self, error: SessionError) {
        if let Some(join) = self.join.as_mut() {
            if join.reported {
                debug!("Suppressed duplicate join error: {}", error);
                return;
            }
            join.reported = true;
            join.deadline = None;
        }

        self.log.push(format!("Err: {}", error));
        if let Some(on_error) = self.on_error.as_mut() {
            on_error(error);
        }
    }

    // ========================================================================
    // TEARDOWN
    // ========================================================================

    /// Close the channel, release the address and forget every callback.
    ///
    /// Safe to call repeatedly and on a session that never connected. The
    /// session can be initialized again afterwards.
    pub fn clean_up(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.transport.close(channel.link);
        }
        self.transport.destroy();

        self.identity = Identity::Unset;
        self.role = None;
        self.join = None;
        self.on_connected = None;
        self.on_error = None;
        self.on_data = None;
        self.log.push("Cleaned up");
    }
}
