//! Per-peer match state machine.
//!
//! The coordinator sits between the game loop and the [`Session`]. Messages
//! from the opponent are queued by the session's data handler and processed
//! in [`MatchCoordinator::update`], once per frame, alongside the local input
//! for that frame.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Instant;

use super::input::{EdgeDetector, HeldInput, RemotePuppet};
use super::items::{HealItem, ItemBoard, Spawner};
use super::selection::{FighterChoice, Selection};
use super::{MatchError, MatchPhase, PlayerSlot};
use crate::common::config::MatchRules;
use crate::common::messages::{FighterId, ItemId, Message};
use crate::session::{Role, Session};
use crate::transport::Transport;

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEnd {
    /// Decided by the simulation; `None` for a draw
    Finished { winner: Option<PlayerSlot> },
    /// The channel to the opponent closed mid-match
    PeerLeft,
}

/// Something the game loop should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    Connected,
    OpponentSelected(FighterId),
    GameStarted { p1: FighterId, p2: FighterId },
    ItemSpawned(HealItem),
    ItemCollected {
        id: ItemId,
        by: PlayerSlot,
        heal: u32,
    },
    ItemExpired(ItemId),
    MatchEnded(MatchEnd),
}

pub struct MatchCoordinator {
    role: Role,
    phase: MatchPhase,
    rules: MatchRules,
    rng: StdRng,
    selection: Selection,
    /// Opponent pick that arrived before we returned to selection
    early_pick: Option<FighterId>,
    items: ItemBoard,
    spawner: Spawner,
    edges: EdgeDetector,
    puppet: RemotePuppet,
    outcome: Option<MatchEnd>,
    pending: Vec<MatchEvent>,
    inbox: Receiver<Message>,
    inbox_tx: Sender<Message>,
}

impl MatchCoordinator {
    pub fn new(role: Role, rules: MatchRules) -> Self {
        Self::with_rng(role, rules, StdRng::from_entropy())
    }

    /// Create a coordinator whose random picks and item spots come from `rng`.
    pub fn with_rng(role: Role, rules: MatchRules, rng: StdRng) -> Self {
        let (inbox_tx, inbox) = mpsc::channel();
        Self {
            role,
            phase: MatchPhase::Idle,
            items: ItemBoard::new(rules.item_lifetime()),
            spawner: Spawner::new(rules.item_spawn_interval()),
            rules,
            rng,
            selection: Selection::default(),
            early_pick: None,
            edges: EdgeDetector::default(),
            puppet: RemotePuppet::default(),
            outcome: None,
            pending: Vec::new(),
            inbox,
            inbox_tx,
        }
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn local_slot(&self) -> PlayerSlot {
        PlayerSlot::for_role(self.role)
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn items(&self) -> &ItemBoard {
        &self.items
    }

    /// The remote player's latest input, for the simulation to act on.
    pub fn puppet_mut(&mut self) -> &mut RemotePuppet {
        &mut self.puppet
    }

    pub fn outcome(&self) -> Option<MatchEnd> {
        self.outcome
    }

    // ========================================================================
    // WIRING
    // ========================================================================

    /// Route the session's incoming messages to this coordinator.
    ///
    /// Call after `host_game`/`join_game`. Replaces any data handler left on
    /// the session by a previous match.
    pub fn attach<T: Transport>(&mut self, session: &mut Session<T>) {
        let sender = self.inbox_tx.clone();
        session.on_data(Some(Box::new(move |message| {
            // The receiver lives as long as the coordinator; after that the
            // message has nowhere to go anyway.
            let _ = sender.send(message);
        })));
        while self.inbox.try_recv().is_ok() {}

        self.phase = if session.is_connected() {
            MatchPhase::Selecting
        } else {
            match self.role {
                Role::Host => MatchPhase::AwaitingConnection,
                Role::Client => MatchPhase::Connecting,
            }
        };
        debug!("Match attached as {} in {}", self.role, self.phase);
    }

    /// Stop listening to the session and go back to idle.
    pub fn detach<T: Transport>(&mut self, session: &mut Session<T>) {
        session.on_data(None);
        while self.inbox.try_recv().is_ok() {}
        self.reset_round();
        self.selection.reset();
        self.early_pick = None;
        self.outcome = None;
        self.pending.clear();
        self.phase = MatchPhase::Idle;
    }

    // ========================================================================
    // FRAME UPDATE
    // ========================================================================

    /// Advance one frame.
    ///
    /// Processes everything the opponent sent since the last frame, streams
    /// the local input while playing and, on the host, spawns heal items.
    pub fn update<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        now: Instant,
        local: HeldInput,
    ) -> Vec<MatchEvent> {
        let mut events = std::mem::take(&mut self.pending);

        if matches!(
            self.phase,
            MatchPhase::AwaitingConnection | MatchPhase::Connecting
        ) && session.is_connected()
        {
            info!("🔗 Opponent connected, selecting fighters");
            self.phase = MatchPhase::Selecting;
            events.push(MatchEvent::Connected);
        }

        while let Ok(message) = self.inbox.try_recv() {
            self.handle(session, message, now, &mut events);
        }

        if matches!(self.phase, MatchPhase::Selecting | MatchPhase::Playing)
            && !session.is_connected()
        {
            warn!("🔌 Opponent left during {}", self.phase);
            self.finish(MatchEnd::PeerLeft);
            events.push(MatchEvent::MatchEnded(MatchEnd::PeerLeft));
        }

        if self.phase == MatchPhase::Playing {
            let input = self.edges.frame(local);
            session.send(&Message::Input { input });

            if self.role == Role::Host && self.spawner.due(now) {
                let item = self.items.spawn(&self.rules, &mut self.rng, now);
                session.send(&Message::SpawnItem {
                    id: item.id,
                    x: item.x,
                    y: item.y,
                });
                events.push(MatchEvent::ItemSpawned(item));
            }

            events.extend(self.items.expire(now).into_iter().map(MatchEvent::ItemExpired));
        }

        events
    }

    fn handle<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        message: Message,
        now: Instant,
        events: &mut Vec<MatchEvent>,
    ) {
        match message {
            Message::Input { input } => {
                if self.phase == MatchPhase::Playing {
                    self.puppet.apply(input);
                }
            }
            Message::CharacterSelected { character } => {
                self.on_opponent_selected(session, character, events)
            }
            Message::GameStart { p1, p2 } => self.on_game_start(p1, p2, events),
            Message::SpawnItem { id, x, y } => {
                if self.role == Role::Host {
                    warn!("⚠️  Ignoring SPAWN_ITEM from client for {}", id);
                } else if self.phase == MatchPhase::Playing {
                    if let Some(item) = self.items.insert_remote(id, x, y, now) {
                        events.push(MatchEvent::ItemSpawned(item));
                    }
                }
            }
            Message::ItemCollected { id } => {
                if self.phase != MatchPhase::Playing {
                    return;
                }
                if self.items.remove(id).is_some() {
                    events.push(MatchEvent::ItemCollected {
                        id,
                        by: self.local_slot().other(),
                        heal: self.rules.heal_amount,
                    });
                }
            }
        }
    }

    fn on_opponent_selected<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        character: FighterId,
        events: &mut Vec<MatchEvent>,
    ) {
        if self.role != Role::Host {
            debug!("Ignoring CHARACTER_SELECTED on the client");
            return;
        }

        match self.phase {
            MatchPhase::Selecting => {
                if self.selection.record_opponent(character.clone()) {
                    info!("Opponent picked {}", character);
                    events.push(MatchEvent::OpponentSelected(character));
                    self.try_start(session, events);
                }
            }
            MatchPhase::Ended => self.early_pick = Some(character),
            _ => debug!("Ignoring CHARACTER_SELECTED while {}", self.phase),
        }
    }

    fn on_game_start(&mut self, p1: FighterId, p2: FighterId, events: &mut Vec<MatchEvent>) {
        if self.role != Role::Client {
            debug!("Ignoring GAME_START on the host");
            return;
        }
        match self.phase {
            MatchPhase::Selecting => {}
            // The host chose to play again with the same fighters.
            MatchPhase::Ended if self.outcome != Some(MatchEnd::PeerLeft) => {
                self.selection.reset()
            }
            _ => {
                debug!("Ignoring GAME_START while {}", self.phase);
                return;
            }
        }

        if self.selection.adopt_start(p1.clone(), p2.clone()) {
            self.begin_round(&p1, &p2);
            events.push(MatchEvent::GameStarted { p1, p2 });
        }
    }

    /// Host only: announce the start once both picks are in.
    fn try_start<T: Transport>(&mut self, session: &mut Session<T>, events: &mut Vec<MatchEvent>) {
        let Some((p1, p2)) = self.selection.take_start() else {
            return;
        };
        session.send(&Message::GameStart {
            p1: p1.clone(),
            p2: p2.clone(),
        });
        self.begin_round(&p1, &p2);
        events.push(MatchEvent::GameStarted { p1, p2 });
    }

    fn begin_round(&mut self, p1: &FighterId, p2: &FighterId) {
        info!("🎮 Match started: {} vs {}", p1, p2);
        self.reset_round();
        self.outcome = None;
        self.phase = MatchPhase::Playing;
    }

    fn reset_round(&mut self) {
        self.items.clear();
        self.spawner.reset();
        self.edges.reset();
        self.puppet.reset();
    }

    fn finish(&mut self, outcome: MatchEnd) {
        self.items.clear();
        self.outcome = Some(outcome);
        self.phase = MatchPhase::Ended;
    }

    // ========================================================================
    // PLAYER ACTIONS
    // ========================================================================

    /// Lock in the local fighter.
    ///
    /// The client tells the host; the host starts the game as soon as the
    /// client's pick is known too. The resulting `GameStarted` event is
    /// returned by the next [`MatchCoordinator::update`].
    pub fn confirm_selection<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        choice: FighterChoice,
    ) -> Result<FighterId, MatchError> {
        if self.phase != MatchPhase::Selecting {
            return Err(MatchError::WrongPhase {
                action: "confirm a fighter",
                phase: self.phase,
            });
        }
        if !session.is_connected() {
            return Err(MatchError::NotConnected);
        }

        let fighter = choice.resolve(self.rules.roster_size, &mut self.rng);
        self.selection.confirm_local(fighter.clone());

        match self.role {
            Role::Client => session.send(&Message::CharacterSelected {
                character: fighter.clone(),
            }),
            Role::Host => {
                let mut events = Vec::new();
                self.try_start(session, &mut events);
                self.pending.extend(events);
            }
        }
        Ok(fighter)
    }

    /// The local fighter touched `id`.
    ///
    /// Returns the item if it was still on the board, in which case the
    /// opponent is told and the caller applies the heal. `None` means the
    /// opponent got there first.
    pub fn collect_item<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        id: ItemId,
    ) -> Option<HealItem> {
        if self.phase != MatchPhase::Playing {
            return None;
        }
        let item = self.items.remove(id)?;
        session.send(&Message::ItemCollected { id });
        Some(item)
    }

    pub fn heal_amount(&self) -> u32 {
        self.rules.heal_amount
    }

    /// Record the simulation's verdict.
    pub fn end_match(&mut self, winner: Option<PlayerSlot>) -> Result<(), MatchError> {
        if self.phase != MatchPhase::Playing {
            return Err(MatchError::WrongPhase {
                action: "end the match",
                phase: self.phase,
            });
        }
        self.finish(MatchEnd::Finished { winner });
        Ok(())
    }

    /// Play again with the same fighters, on the host's say-so.
    ///
    /// Announces a fresh GAME_START; the client starts its round when that
    /// arrives, even if it is still looking at the result screen. The
    /// `GameStarted` event is returned by the next update.
    pub fn replay<T: Transport>(&mut self, session: &mut Session<T>) -> Result<(), MatchError> {
        if self.role != Role::Host {
            return Err(MatchError::HostOnly("restart the match"));
        }
        if self.phase != MatchPhase::Ended {
            return Err(MatchError::WrongPhase {
                action: "play again",
                phase: self.phase,
            });
        }
        if !session.is_connected() {
            return Err(MatchError::NotConnected);
        }
        let (Some(p1), Some(p2)) = (
            self.selection.local().cloned(),
            self.selection.opponent().cloned(),
        ) else {
            return Err(MatchError::WrongPhase {
                action: "play again without fighters",
                phase: self.phase,
            });
        };

        session.send(&Message::GameStart {
            p1: p1.clone(),
            p2: p2.clone(),
        });
        self.early_pick = None;
        self.begin_round(&p1, &p2);
        self.pending.push(MatchEvent::GameStarted { p1, p2 });
        Ok(())
    }

    /// Rematch: back to fighter selection on the same channel.
    pub fn return_to_selection<T: Transport>(
        &mut self,
        session: &Session<T>,
    ) -> Result<(), MatchError> {
        if self.phase != MatchPhase::Ended {
            return Err(MatchError::WrongPhase {
                action: "return to selection",
                phase: self.phase,
            });
        }
        if !session.is_connected() {
            return Err(MatchError::NotConnected);
        }

        self.selection.reset();
        self.reset_round();
        self.outcome = None;
        self.phase = MatchPhase::Selecting;

        if let Some(pick) = self.early_pick.take() {
            self.selection.record_opponent(pick.clone());
            self.pending.push(MatchEvent::OpponentSelected(pick));
        }
        Ok(())
    }
}
