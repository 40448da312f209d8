//! # Match Protocol
//!
//! What the two peers say to each other once the channel is open, and the
//! per-role state machine that decides when they say it.
//!
//! ## Phases
//!
//! ```text
//! Idle -> AwaitingConnection (host) / Connecting (client)
//!      -> Selecting -> Playing -> Ended -> Selecting (switch characters)
//!                                       -> Playing   (play again)
//! ```
//!
//! The host is authoritative for the game start and for item spawns. Both
//! peers stream their input every frame while playing, and either may report
//! an item collection.

pub mod coordinator;
pub mod input;
pub mod items;
pub mod selection;

use std::fmt;
use thiserror::Error;

use crate::session::Role;

pub use coordinator::{MatchCoordinator, MatchEnd, MatchEvent};
pub use input::{Attack, EdgeDetector, HeldInput, RemotePuppet};
pub use items::{HealItem, ItemBoard, Spawner};
pub use selection::{FighterChoice, Selection};

/// Where one peer is in the match lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Idle,
    /// Host waiting for an opponent to join its code
    AwaitingConnection,
    /// Client waiting for its channel to the host to open
    Connecting,
    Selecting,
    Playing,
    Ended,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchPhase::Idle => "IDLE",
            MatchPhase::AwaitingConnection => "AWAITING_CONNECTION",
            MatchPhase::Connecting => "CONNECTING",
            MatchPhase::Selecting => "SELECTING",
            MatchPhase::Playing => "PLAYING",
            MatchPhase::Ended => "ENDED",
        };
        f.write_str(name)
    }
}

/// Arena slot; the host is always Player 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSlot {
    One,
    Two,
}

impl PlayerSlot {
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Host => PlayerSlot::One,
            Role::Client => PlayerSlot::Two,
        }
    }

    pub fn other(self) -> Self {
        match self {
            PlayerSlot::One => PlayerSlot::Two,
            PlayerSlot::Two => PlayerSlot::One,
        }
    }
}

/// Misuse of the match state machine by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("cannot {action} while {phase}")]
    WrongPhase {
        action: &'static str,
        phase: MatchPhase,
    },
    #[error("the opponent is no longer connected")]
    NotConnected,
    #[error("only the host can {0}")]
    HostOnly(&'static str),
}
