//! Address acquisition, hosting and joining.

use log::{debug, warn};
use std::time::Instant;

use super::{Channel, Identity, PendingJoin, Role, Session, SessionError};
use crate::common::address::{generate_code, normalize_code, PeerAddress};
use crate::transport::{ConnectOptions, LinkId, Transport, TransportError};

impl<T: Transport> Session<T> {
    /// Start acquiring an address for this process.
    ///
    /// Does nothing if acquisition is already under way or complete. A code
    /// that collides with another peer's is discarded and a fresh one tried,
    /// up to `identity_retry_limit` attempts (forever when unset).
    pub fn initialize(&mut self) {
        if !matches!(self.identity, Identity::Unset) {
            return;
        }
        self.attempt_identity(1);
    }

    fn attempt_identity(&mut self, attempt: u32) {
        let code = generate_code(self.config.code_scheme, &mut self.rng);
        let candidate = PeerAddress::new(&self.config.address_prefix, &code);

        self.log.push(format!("Init ID: {}", candidate));
        self.transport.register(candidate.full());
        self.identity = Identity::Acquiring {
            candidate,
            attempts: attempt,
            retry_at: None,
        };
    }

    /// Become the host and wait for an opponent.
    ///
    /// `on_connected` runs once, when the opponent's channel opens. Returns
    /// the code to display, or `None` while the address is still being
    /// acquired; poll [`Session::code`] until it appears.
    pub fn host_game<C>(&mut self, on_connected: C) -> Result<Option<String>, SessionError>
    where
        C: FnMut() + 'static,
    {
        if self.role == Some(Role::Client) {
            return Err(SessionError::RoleLocked(Role::Client));
        }

        self.role = Some(Role::Host);
        self.on_connected = Some(Box::new(on_connected));
        self.initialize();

        Ok(self.code().map(str::to_string))
    }

    /// Become the client and connect to the host that displays `code`.
    ///
    /// The code is trimmed and uppercased. If the local address is not ready
    /// yet the connect attempt waits for it. Exactly one of the callbacks
    /// eventually runs, and each at most once: `on_connected` when the channel
    /// opens, or `on_error` when the host is not found, the network fails or
    /// the join timeout expires first. A timed-out attempt is abandoned, not
    /// retried.
    ///
    /// Calling this again replaces the previous join, closing its link even
    /// if it already connected.
    pub fn join_game<C, E>(
        &mut self,
        code: &str,
        on_connected: C,
        on_error: E,
    ) -> Result<(), SessionError>
    where
        C: FnMut() + 'static,
        E: FnMut(SessionError) + 'static,
    {
        if self.role == Some(Role::Host) {
            return Err(SessionError::RoleLocked(Role::Host));
        }

        self.role = Some(Role::Client);
        self.on_connected = Some(Box::new(on_connected));
        self.on_error = Some(Box::new(on_error));

        // One channel per session: whatever we were dialing or connected to goes.
        self.join = None;
        if let Some(previous) = self.channel.take() {
            self.transport.close(previous.link);
        }

        let Some(code) = normalize_code(code) else {
            self.report(SessionError::InvalidCode(code.to_string()));
            return Ok(());
        };

        let target = PeerAddress::new(&self.config.address_prefix, &code);
        self.log.push(format!("Joining: {}", target));
        self.join = Some(PendingJoin {
            target,
            link: None,
            deadline: None,
            reported: false,
        });

        self.initialize();
        self.dial_pending_join();
        Ok(())
    }

    /// Open the outbound link of a pending join once our address is ready.
    fn dial_pending_join(&mut self) {
        if !matches!(self.identity, Identity::Ready(_)) {
            return;
        }
        let Some(join) = self.join.as_mut() else {
            return;
        };
        if join.link.is_some() || join.reported {
            return;
        }

        let link = self.transport.connect(
            join.target.full(),
            ConnectOptions {
                reliable: self.config.reliable,
            },
        );
        join.link = Some(link);
        self.channel = Some(Channel::pending(link, Some(join.target.clone())));
    }

    // ========================================================================
    // TRANSPORT NOTIFICATIONS
    // ========================================================================

    pub(super) fn on_registered(&mut self, name: &str) {
        let candidate = match &self.identity {
            Identity::Acquiring { candidate, .. } if candidate.full() == name => candidate.clone(),
            _ => {
                debug!("Ignoring stale registration of {}", name);
                return;
            }
        };

        self.log.push(format!("My ID: {}", candidate));
        self.identity = Identity::Ready(candidate);
        self.dial_pending_join();
    }

    pub(super) fn on_register_failed(&mut self, name: &str, error: TransportError, now: Instant) {
        let attempts = match &self.identity {
            Identity::Acquiring {
                candidate,
                attempts,
                retry_at: None,
            } if candidate.full() == name => *attempts,
            _ => {
                debug!("Ignoring stale registration failure of {}", name);
                return;
            }
        };

        match error {
            TransportError::UnavailableId => {
                self.log.push("ID Taken, retry...");
                self.transport.destroy();

                if self
                    .config
                    .identity_retry_limit
                    .is_some_and(|limit| attempts >= limit)
                {
                    warn!("⚠️  Giving up on address acquisition after {} attempts", attempts);
                    self.identity = Identity::Unset;
                    self.report(SessionError::AddressExhausted { attempts });
                    return;
                }

                let backoff = self.config.retry_backoff();
                if backoff.is_zero() {
                    self.attempt_identity(attempts + 1);
                } else if let Identity::Acquiring { retry_at, .. } = &mut self.identity {
                    *retry_at = Some(now + backoff);
                }
            }
            TransportError::Network(detail) => {
                self.identity = Identity::Unset;
                self.report(SessionError::Network { detail });
            }
            other => {
                self.identity = Identity::Unset;
                self.report(SessionError::Transport(other.to_string()));
            }
        }
    }

    pub(super) fn on_connect_failed(&mut self, link: LinkId, error: TransportError) {
        let Some(join) = self.join.as_ref() else {
            return;
        };
        if join.link != Some(link) {
            return;
        }
        let code = join.target.code().to_string();

        self.channel = None;
        self.report(match error {
            TransportError::PeerUnavailable(_) => SessionError::HostNotFound { code },
            TransportError::Network(detail) => SessionError::Network { detail },
            other => SessionError::Transport(other.to_string()),
        });
    }

    pub(super) fn on_transport_error(&mut self, error: TransportError) {
        if let TransportError::Network(detail) = error {
            // The transport no longer holds our name.
            self.identity = Identity::Unset;
            self.report(SessionError::Network { detail });
        } else {
            self.report(SessionError::Transport(error.to_string()));
        }
    }

    // ========================================================================
    // TIMERS
    // ========================================================================

    pub(super) fn fire_timers(&mut self, now: Instant) {
        if let Identity::Acquiring {
            attempts,
            retry_at: Some(at),
            ..
        } = self.identity
        {
            if now >= at {
                self.attempt_identity(attempts + 1);
            }
        }

        let timeout = self.config.join_timeout();
        let expired = match self.join.as_mut() {
            Some(join) if !join.reported => match join.deadline {
                None => {
                    join.deadline = Some(now + timeout);
                    false
                }
                Some(deadline) => now >= deadline,
            },
            _ => false,
        };

        if expired {
            if let Some(link) = self.join.as_ref().and_then(|join| join.link) {
                self.transport.close(link);
            }
            self.channel = None;
            self.report(SessionError::Timeout);
        }
    }
}
