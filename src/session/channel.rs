//! The message channel: one link to the opponent, the same for both roles.

use log::{debug, warn};

use super::{DataHandler, Role, Session};
use crate::common::address::PeerAddress;
use crate::common::messages::{envelope_version, Message, PROTOCOL_VERSION};
use crate::transport::{LinkId, Transport};

/// The link currently bound to the session.
#[derive(Debug, Clone)]
pub(super) struct Channel {
    pub(super) link: LinkId,
    pub(super) open: bool,
    pub(super) remote: Option<PeerAddress>,
}

impl Channel {
    pub(super) fn pending(link: LinkId, remote: Option<PeerAddress>) -> Self {
        Self {
            link,
            open: false,
            remote,
        }
    }
}

impl<T: Transport> Session<T> {
    /// Send a message to the opponent.
    ///
    /// Dropped without error when the channel is not open; a dropped message
    /// is gone for good and will not be sent once the channel opens.
    pub fn send(&mut self, message: &Message) {
        let link = match &self.channel {
            Some(channel) if channel.open && self.transport.is_open(channel.link) => channel.link,
            _ => {
                debug!("Channel not open, dropping {}", message.kind());
                return;
            }
        };

        let payload = match message.to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("⚠️  Failed to encode {}: {}", message.kind(), e);
                return;
            }
        };

        if let Err(e) = self.transport.send(link, payload) {
            debug!("Send of {} on {} failed: {}", message.kind(), link, e);
        }
    }

    /// Install the receive handler, replacing any previous one.
    ///
    /// `None` detaches the current handler so nothing left over from a
    /// previous match reacts to late messages.
    pub fn on_data(&mut self, handler: Option<DataHandler>) {
        self.on_data = handler;
    }

    // ========================================================================
    // TRANSPORT NOTIFICATIONS
    // ========================================================================

    pub(super) fn on_incoming(&mut self, link: LinkId) {
        if self.role != Some(Role::Host) {
            self.log.push("Refused conn: not hosting");
            self.transport.close(link);
            return;
        }
        if self.is_connected() {
            self.log.push("Refused conn: already matched");
            self.transport.close(link);
            return;
        }

        // The previous opponent left; the new one takes its place.
        if let Some(stale) = self.channel.take() {
            self.transport.close(stale.link);
        }
        self.log.push("Incoming conn...");
        self.channel = Some(Channel::pending(link, None));
    }

    pub(super) fn on_open(&mut self, link: LinkId) {
        match self.channel.as_mut() {
            Some(channel) if channel.link == link => channel.open = true,
            _ => {
                debug!("Closing stray {}", link);
                self.transport.close(link);
                return;
            }
        }

        // Connected in time: the join timer is disarmed with the join.
        self.join = None;
        self.log.push("Connected!");
        if let Some(mut on_connected) = self.on_connected.take() {
            on_connected();
        }
    }

    pub(super) fn on_payload(&mut self, link: LinkId, payload: &[u8]) {
        if !self.channel.as_ref().is_some_and(|ch| ch.link == link) {
            return;
        }

        match Message::from_bytes(payload) {
            Ok(Some(message)) => {
                if let Some(handler) = self.on_data.as_mut() {
                    handler(message);
                }
            }
            Ok(None) => {
                if let Some(version) = envelope_version(payload).filter(|v| *v > PROTOCOL_VERSION) {
                    debug!("Ignoring message from protocol v{}", version);
                } else {
                    debug!("Ignoring unrecognised message kind");
                }
            }
            Err(e) => warn!("⚠️  Dropping malformed message: {}", e),
        }
    }

    pub(super) fn on_closed(&mut self, link: LinkId) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if channel.link != link {
            return;
        }

        let was_open = channel.open;
        channel.open = false;
        self.log.push("Conn closed");

        if was_open {
            return;
        }

        // Closed before it ever opened: the host turned us away.
        let code = self
            .join
            .as_ref()
            .filter(|join| join.link == Some(link))
            .map(|join| join.target.code().to_string());
        if let Some(code) = code {
            self.channel = None;
            self.report(super::SessionError::HostNotFound { code });
        }
    }
}
