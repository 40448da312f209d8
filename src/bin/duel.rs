//! # Duel Binary
//!
//! Headless peer that hosts or joins an online match over TCP and plays a
//! scripted fighter. Useful to check that two machines can find each other
//! through the signal server and keep a match in sync.
//!
//! ## Usage
//!
//! ```bash
//! # Terminal 1
//! cargo run --bin signal
//! # Terminal 2
//! cargo run --bin duel -- --host
//! # Terminal 3, with the code printed by the host
//! cargo run --bin duel -- --join K3Z9
//! ```

use anyhow::anyhow;
use clap::{ArgGroup, Parser};
use log::{debug, error, info};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

use peer_duel::common::config::{load_config, PeerConfig};
use peer_duel::protocol::{
    FighterChoice, HeldInput, MatchCoordinator, MatchEnd, MatchEvent, MatchPhase,
};
use peer_duel::transport::TcpTransport;
use peer_duel::utils::init_logger;
use peer_duel::{Role, Session, SessionError};

/// Frame period of the driving loop (~60 FPS)
const FRAME: Duration = Duration::from_millis(16);

/// How long an item sits on the board before the scripted fighter grabs it
const GRAB_DELAY: Duration = Duration::from_secs(2);

/// Time on the result screen before the host restarts; the client must have
/// finished its own round by then
const RESULT_SCREEN: Duration = Duration::from_secs(3);

/// Command-line arguments for a duel peer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["host", "join"])))]
struct Args {
    /// Path to the peer configuration file (TOML format)
    ///
    /// Example: config/peer.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Host a match and print the code to share
    #[arg(long)]
    host: bool,

    /// Join the match hosted under this code
    #[arg(long)]
    join: Option<String>,

    /// Grid slot of the fighter to pick; the slot after the last fighter is random
    #[arg(long)]
    fighter: Option<u8>,

    /// Frames to play before ending the match
    #[arg(long, default_value_t = 1200)]
    frames: u64,

    /// Rounds to play with the same fighters; the host restarts each one
    #[arg(long, default_value_t = 1)]
    rounds: u32,
}

/// Scripted fighter: pace back and forth on the "keyboard" and tap the
/// on-screen attack buttons every half second.
fn scripted_input(frame: u64) -> HeldInput {
    let keyboard = HeldInput {
        right: (frame / 90) % 2 == 0,
        left: (frame / 90) % 2 == 1,
        up: frame % 150 == 0,
        ..HeldInput::default()
    };
    let touch = HeldInput {
        attack1: frame % 30 < 4,
        attack2: frame % 240 < 2,
        ..HeldInput::default()
    };
    keyboard.merge(touch)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logger();

    let args = Args::parse();
    let config: PeerConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => PeerConfig::default(),
    };

    let choice = match args.fighter {
        Some(slot) => FighterChoice::from_grid_slot(slot, config.rules.roster_size)
            .ok_or_else(|| anyhow!("fighter slot {} is not on the grid", slot))?,
        None => FighterChoice::Random,
    };

    let transport = TcpTransport::new(&config.signal, Handle::current());
    let mut session = Session::new(transport, config.network.clone());

    let failure: Rc<RefCell<Option<SessionError>>> = Rc::new(RefCell::new(None));
    let report = {
        let failure = failure.clone();
        move |e: SessionError| *failure.borrow_mut() = Some(e)
    };

    let role = match &args.join {
        Some(code) => {
            session.join_game(code, || info!("✅ Connected to host"), report)?;
            Role::Client
        }
        None => {
            session.set_error_handler(report);
            session.host_game(|| info!("✅ Opponent joined"))?;
            Role::Host
        }
    };

    let mut coordinator = MatchCoordinator::new(role, config.rules.clone());
    coordinator.attach(&mut session);

    let mut ticker = tokio::time::interval(FRAME);
    let mut code_shown = false;
    let mut frame: u64 = 0;
    let mut health: u32 = 100;
    let mut rounds_played: u32 = 0;
    let mut replay_at: Option<Instant> = None;

    loop {
        ticker.tick().await;
        session.pump();

        if let Some(e) = failure.borrow_mut().take() {
            error!("❌ {}", e);
            println!("{}", session.logs());
            break;
        }

        if !code_shown {
            if let Some(code) = session.code().filter(|_| role == Role::Host) {
                info!("📡 Share this code: {}", code);
                code_shown = true;
            }
        }

        let now = Instant::now();
        let input = if coordinator.phase() == MatchPhase::Playing {
            scripted_input(frame)
        } else {
            HeldInput::default()
        };

        for event in coordinator.update(&mut session, now, input) {
            match event {
                MatchEvent::Connected => {
                    let fighter = coordinator.confirm_selection(&mut session, choice)?;
                    info!("Picked {}", fighter);
                }
                MatchEvent::OpponentSelected(fighter) => info!("Opponent picked {}", fighter),
                MatchEvent::GameStarted { p1, p2 } => {
                    frame = 0;
                    health = 100;
                    info!("🥊 Fight! {} vs {}", p1, p2)
                }
                MatchEvent::ItemSpawned(item) => {
                    debug!("Heal item {} at ({}, {})", item.id, item.x, item.y)
                }
                MatchEvent::ItemCollected { id, by, heal } => {
                    info!("{} collected by {:?} (+{})", id, by, heal)
                }
                MatchEvent::ItemExpired(id) => debug!("{} expired", id),
                MatchEvent::MatchEnded(end) => info!("Match ended: {:?}", end),
            }
        }

        if coordinator.phase() == MatchPhase::Ended {
            // The client waits on the result screen for the host's restart.
            let peer_left = coordinator.outcome() == Some(MatchEnd::PeerLeft);
            if peer_left || rounds_played >= args.rounds {
                break;
            }
            if replay_at.is_some_and(|at| now >= at) {
                replay_at = None;
                coordinator.replay(&mut session)?;
            }
            continue;
        }
        if coordinator.phase() != MatchPhase::Playing {
            continue;
        }

        while let Some(attack) = coordinator.puppet_mut().take_attack() {
            debug!("Opponent attack: {:?}", attack);
        }

        let ripe: Vec<_> = coordinator
            .items()
            .iter()
            .filter(|item| now.duration_since(item.spawned_at) >= GRAB_DELAY)
            .map(|item| item.id)
            .collect();
        for id in ripe {
            if coordinator.collect_item(&mut session, id).is_some() {
                health = (health + coordinator.heal_amount()).min(100);
                info!("Grabbed {}, health {}", id, health);
            }
        }

        frame += 1;
        if frame >= args.frames {
            coordinator.end_match(None)?;
            rounds_played += 1;
            info!("Played {} frames, calling round {} a draw", frame, rounds_played);
            if rounds_played >= args.rounds {
                break;
            }
            if role == Role::Host {
                replay_at = Some(now + RESULT_SCREEN);
            }
        }
    }

    coordinator.detach(&mut session);
    session.clean_up();
    Ok(())
}
