//! Character-selection handshake.
//!
//! The host decides when the game starts: it needs its own confirmed fighter
//! and the client's CHARACTER_SELECTED, in whichever order they happen. The
//! client's pick simply waits in `opponent` until the host confirms too.

use rand::Rng;

use crate::common::messages::FighterId;

/// What the player clicked in the selection grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FighterChoice {
    Fighter(u8),
    /// The grid slot after the last fighter; resolved at confirm time
    Random,
}

impl FighterChoice {
    /// Map a grid slot to a choice. Slot `roster_size` is the random slot.
    pub fn from_grid_slot(slot: u8, roster_size: u8) -> Option<Self> {
        match slot {
            s if s < roster_size => Some(FighterChoice::Fighter(s)),
            s if s == roster_size => Some(FighterChoice::Random),
            _ => None,
        }
    }

    pub fn resolve<R: Rng + ?Sized>(self, roster_size: u8, rng: &mut R) -> FighterId {
        match self {
            FighterChoice::Fighter(index) => FighterId::from_index(index),
            FighterChoice::Random => FighterId::from_index(rng.gen_range(0..roster_size.max(1))),
        }
    }
}

/// Both players' picks as seen by one peer.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    local: Option<FighterId>,
    opponent: Option<FighterId>,
    started: bool,
}

impl Selection {
    pub fn local(&self) -> Option<&FighterId> {
        self.local.as_ref()
    }

    pub fn opponent(&self) -> Option<&FighterId> {
        self.opponent.as_ref()
    }

    pub fn confirm_local(&mut self, fighter: FighterId) {
        if !self.started {
            self.local = Some(fighter);
        }
    }

    /// Record the opponent's pick; the latest one wins until the game starts.
    pub fn record_opponent(&mut self, fighter: FighterId) -> bool {
        if self.started {
            return false;
        }
        self.opponent = Some(fighter);
        true
    }

    /// Host side: the `(p1, p2)` pair to announce, exactly once, as soon as
    /// both picks are known.
    pub fn take_start(&mut self) -> Option<(FighterId, FighterId)> {
        if self.started {
            return None;
        }
        let p1 = self.local.clone()?;
        let p2 = self.opponent.clone()?;
        self.started = true;
        Some((p1, p2))
    }

    /// Client side: adopt the host's announcement. Returns `false` for a
    /// repeated announcement.
    pub fn adopt_start(&mut self, p1: FighterId, p2: FighterId) -> bool {
        if self.started {
            return false;
        }
        self.opponent = Some(p1);
        self.local = Some(p2);
        self.started = true;
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
