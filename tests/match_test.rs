#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::{Duration, Instant};

    use peer_duel::common::config::{MatchRules, NetworkConfig};
    use peer_duel::common::messages::{FighterId, ItemId};
    use peer_duel::protocol::{
        Attack, FighterChoice, HeldInput, MatchCoordinator, MatchEnd, MatchError, MatchEvent,
        MatchPhase, PlayerSlot,
    };
    use peer_duel::transport::{MemoryNetwork, MemoryTransport};
    use peer_duel::{Role, Session};

    struct Peer {
        session: Session<MemoryTransport>,
        coordinator: MatchCoordinator,
    }

    impl Peer {
        fn step(&mut self, now: Instant) -> Vec<MatchEvent> {
            self.step_with(now, HeldInput::default())
        }

        fn step_with(&mut self, now: Instant, input: HeldInput) -> Vec<MatchEvent> {
            self.session.pump_at(now);
            self.coordinator.update(&mut self.session, now, input)
        }

        fn confirm(&mut self, fighter: u8) -> FighterId {
            self.coordinator
                .confirm_selection(&mut self.session, FighterChoice::Fighter(fighter))
                .unwrap()
        }
    }

    fn f(i: u8) -> FighterId {
        FighterId::from_index(i)
    }

    fn started(events: &[MatchEvent]) -> Vec<(FighterId, FighterId)> {
        events
            .iter()
            .filter_map(|e| match e {
                MatchEvent::GameStarted { p1, p2 } => Some((p1.clone(), p2.clone())),
                _ => None,
            })
            .collect()
    }

    fn spawned(events: &[MatchEvent]) -> Vec<ItemId> {
        events
            .iter()
            .filter_map(|e| match e {
                MatchEvent::ItemSpawned(item) => Some(item.id),
                _ => None,
            })
            .collect()
    }

    /// Host and client with an open channel, both in fighter selection.
    fn connected_pair(net: &MemoryNetwork, now: Instant) -> (Peer, Peer) {
        let mut host_session =
            Session::with_rng(net.endpoint(), NetworkConfig::default(), StdRng::seed_from_u64(1));
        host_session.host_game(|| {}).unwrap();
        host_session.pump_at(now);
        let code = host_session.code().unwrap().to_string();

        let mut client_session =
            Session::with_rng(net.endpoint(), NetworkConfig::default(), StdRng::seed_from_u64(2));
        client_session.join_game(&code, || {}, |_| {}).unwrap();

        let mut host = Peer {
            session: host_session,
            coordinator: MatchCoordinator::with_rng(
                Role::Host,
                MatchRules::default(),
                StdRng::seed_from_u64(10),
            ),
        };
        let mut client = Peer {
            session: client_session,
            coordinator: MatchCoordinator::with_rng(
                Role::Client,
                MatchRules::default(),
                StdRng::seed_from_u64(11),
            ),
        };
        host.coordinator.attach(&mut host.session);
        client.coordinator.attach(&mut client.session);

        assert_eq!(client.step(now), vec![MatchEvent::Connected]);
        assert_eq!(host.step(now), vec![MatchEvent::Connected]);
        assert_eq!(host.coordinator.phase(), MatchPhase::Selecting);
        assert_eq!(client.coordinator.phase(), MatchPhase::Selecting);
        (host, client)
    }

    /// Both peers in PLAYING with fighters 2 (host) and 5 (client).
    fn playing_pair(net: &MemoryNetwork, now: Instant) -> (Peer, Peer) {
        let (mut host, mut client) = connected_pair(net, now);
        host.confirm(2);
        client.confirm(5);
        host.step(now);
        client.step(now);
        assert_eq!(host.coordinator.phase(), MatchPhase::Playing);
        assert_eq!(client.coordinator.phase(), MatchPhase::Playing);
        (host, client)
    }

    #[test]
    fn test_game_starts_when_host_confirms_first() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = connected_pair(&net, now);

        assert_eq!(host.confirm(2), f(2));
        assert!(started(&host.step(now)).is_empty());

        client.confirm(5);
        let events = host.step(now);
        assert!(events.contains(&MatchEvent::OpponentSelected(f(5))));
        assert_eq!(started(&events), vec![(f(2), f(5))]);

        assert_eq!(started(&client.step(now)), vec![(f(2), f(5))]);
        assert_eq!(client.coordinator.selection().local(), Some(&f(5)));

        // No second announcement, however long both keep running.
        for i in 1..20 {
            let later = now + Duration::from_millis(16 * i);
            assert!(started(&host.step(later)).is_empty());
            assert!(started(&client.step(later)).is_empty());
        }
    }

    #[test]
    fn test_game_starts_when_client_confirms_first() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = connected_pair(&net, now);

        client.confirm(4);
        let events = host.step(now);
        assert_eq!(events, vec![MatchEvent::OpponentSelected(f(4))]);
        assert_eq!(host.coordinator.phase(), MatchPhase::Selecting);

        host.confirm(0);
        assert_eq!(started(&host.step(now)), vec![(f(0), f(4))]);
        assert_eq!(started(&client.step(now)), vec![(f(0), f(4))]);
        assert_eq!(client.coordinator.phase(), MatchPhase::Playing);
    }

    #[test]
    fn test_random_pick_is_announced_as_concrete_fighter() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = connected_pair(&net, now);

        let picked = client
            .coordinator
            .confirm_selection(&mut client.session, FighterChoice::Random)
            .unwrap();
        host.confirm(1);
        let events = host.step(now);

        assert_eq!(started(&events), vec![(f(1), picked)]);
    }

    #[test]
    fn test_held_attack_reaches_opponent_once() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);

        let held = HeldInput {
            right: true,
            attack1: true,
            ..HeldInput::default()
        };
        let mut attacks = Vec::new();
        for i in 1..=5 {
            let t = now + Duration::from_millis(16 * i);
            host.step_with(t, held);
            client.step(t);
            assert!(client.coordinator.puppet_mut().held().right);
            while let Some(attack) = client.coordinator.puppet_mut().take_attack() {
                attacks.push(attack);
            }
        }

        assert_eq!(attacks, vec![Attack::Primary]);
        assert!(client.coordinator.puppet_mut().frames_received() >= 5);
    }

    #[test]
    fn test_host_spawns_items_and_client_mirrors_them() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);

        let first = host.step(now + Duration::from_secs(1));
        assert!(spawned(&first).is_empty());

        let at_spawn = now + Duration::from_secs(11);
        let host_items = spawned(&host.step(at_spawn));
        assert_eq!(host_items.len(), 1);
        let client_items = spawned(&client.step(at_spawn));
        assert_eq!(client_items, host_items);

        let id = host_items[0];
        let host_item = host.coordinator.items().get(id).unwrap().clone();
        let client_item = client.coordinator.items().get(id).unwrap();
        assert_eq!((host_item.x, host_item.y), (client_item.x, client_item.y));
        assert!((100..=1180).contains(&host_item.x));
        assert!((300..=600).contains(&host_item.y));
    }

    #[test]
    fn test_item_collected_by_one_peer_disappears_for_both() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);
        host.step(now + Duration::from_secs(1));
        let at_spawn = now + Duration::from_secs(11);
        let id = spawned(&host.step(at_spawn))[0];
        client.step(at_spawn);

        let item = client.coordinator.collect_item(&mut client.session, id);
        assert!(item.is_some());

        let events = host.step(at_spawn + Duration::from_millis(16));
        assert!(events.contains(&MatchEvent::ItemCollected {
            id,
            by: PlayerSlot::Two,
            heal: 20,
        }));
        assert!(host.coordinator.items().is_empty());
        assert!(host.coordinator.collect_item(&mut host.session, id).is_none());
    }

    #[test]
    fn test_simultaneous_collection_is_idempotent() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);
        host.step(now + Duration::from_secs(1));
        let at_spawn = now + Duration::from_secs(11);
        let id = spawned(&host.step(at_spawn))[0];
        client.step(at_spawn);

        assert!(host.coordinator.collect_item(&mut host.session, id).is_some());
        assert!(client.coordinator.collect_item(&mut client.session, id).is_some());

        let later = at_spawn + Duration::from_millis(16);
        let collected = |events: Vec<MatchEvent>| {
            events
                .into_iter()
                .filter(|e| matches!(e, MatchEvent::ItemCollected { .. }))
                .count()
        };
        assert_eq!(collected(host.step(later)), 0);
        assert_eq!(collected(client.step(later)), 0);
        assert!(host.coordinator.items().is_empty());
        assert!(client.coordinator.items().is_empty());
    }

    #[test]
    fn test_uncollected_items_expire() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);
        host.step(now + Duration::from_secs(1));
        let at_spawn = now + Duration::from_secs(11);
        let id = spawned(&host.step(at_spawn))[0];
        client.step(at_spawn);

        let gone = at_spawn + Duration::from_secs(5);
        assert!(host.step(gone).contains(&MatchEvent::ItemExpired(id)));
        assert!(client.step(gone).contains(&MatchEvent::ItemExpired(id)));
    }

    #[test]
    fn test_reordered_collect_beats_spawn() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);
        host.step(now + Duration::from_secs(1));

        net.set_reorder(true);
        let at_spawn = now + Duration::from_secs(11);
        let id = spawned(&host.step(at_spawn))[0];
        assert!(host.coordinator.collect_item(&mut host.session, id).is_some());
        net.flush_held();
        net.set_reorder(false);

        let events = client.step(at_spawn);
        assert!(spawned(&events).is_empty());
        assert!(client.coordinator.items().get(id).is_none());
        assert_eq!(client.coordinator.phase(), MatchPhase::Playing);
    }

    #[test]
    fn test_collect_of_item_never_seen_is_ignored() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);
        host.step(now + Duration::from_secs(1));

        // The frame's INPUT and its SPAWN_ITEM are both lost.
        net.drop_next(2);
        let at_spawn = now + Duration::from_secs(11);
        let id = spawned(&host.step(at_spawn))[0];
        assert!(host.coordinator.collect_item(&mut host.session, id).is_some());

        let events = client.step(at_spawn);
        assert!(spawned(&events).is_empty());
        assert!(!events
            .iter()
            .any(|e| matches!(e, MatchEvent::ItemCollected { .. })));
        assert!(client.coordinator.items().is_empty());
        assert_eq!(client.coordinator.phase(), MatchPhase::Playing);
    }

    #[test]
    fn test_lost_input_frame_is_covered_by_the_next() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);
        let right = HeldInput {
            right: true,
            ..HeldInput::default()
        };
        let before = client.coordinator.puppet_mut().frames_received();

        net.drop_next(1);
        let t1 = now + Duration::from_millis(16);
        host.step_with(t1, right);
        client.step(t1);
        assert_eq!(client.coordinator.puppet_mut().frames_received(), before);
        assert!(!client.coordinator.puppet_mut().held().right);

        let t2 = now + Duration::from_millis(32);
        host.step_with(t2, right);
        client.step(t2);
        assert_eq!(client.coordinator.puppet_mut().frames_received(), before + 1);
        assert!(client.coordinator.puppet_mut().held().right);
    }

    #[test]
    fn test_client_never_spawns_items() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (_host, mut client) = playing_pair(&net, now);

        for secs in [1, 11, 21, 31] {
            assert!(spawned(&client.step(now + Duration::from_secs(secs))).is_empty());
        }
    }

    #[test]
    fn test_peer_leaving_ends_the_match() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);

        client.coordinator.detach(&mut client.session);
        client.session.clean_up();

        let events = host.step(now + Duration::from_millis(16));
        assert!(events.contains(&MatchEvent::MatchEnded(MatchEnd::PeerLeft)));
        assert_eq!(host.coordinator.phase(), MatchPhase::Ended);
        assert_eq!(host.coordinator.outcome(), Some(MatchEnd::PeerLeft));
        assert_eq!(
            host.coordinator.return_to_selection(&host.session),
            Err(MatchError::NotConnected)
        );
    }

    #[test]
    fn test_rematch_returns_to_selection() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);

        host.coordinator.end_match(Some(PlayerSlot::One)).unwrap();
        client.coordinator.end_match(Some(PlayerSlot::One)).unwrap();

        // The client is back first and already picked.
        client.coordinator.return_to_selection(&client.session).unwrap();
        client.confirm(6);
        let t = now + Duration::from_secs(1);
        assert!(started(&host.step(t)).is_empty());

        host.coordinator.return_to_selection(&host.session).unwrap();
        assert_eq!(host.coordinator.phase(), MatchPhase::Selecting);
        host.confirm(3);

        let events = host.step(t);
        assert!(events.contains(&MatchEvent::OpponentSelected(f(6))));
        assert_eq!(started(&events), vec![(f(3), f(6))]);
        assert_eq!(started(&client.step(t)), vec![(f(3), f(6))]);
    }

    #[test]
    fn test_replay_keeps_the_same_fighters() {
        let net = MemoryNetwork::new();
        let now = Instant::now();
        let (mut host, mut client) = playing_pair(&net, now);
        let t = now + Duration::from_secs(1);
        host.step(t);
        let at_spawn = now + Duration::from_secs(11);
        let first_round = spawned(&host.step(at_spawn));
        client.step(at_spawn);

        assert!(matches!(
            host.coordinator.replay(&mut host.session),
            Err(MatchError::WrongPhase { .. })
        ));
        host.coordinator.end_match(Some(PlayerSlot::Two)).unwrap();
        client.coordinator.end_match(Some(PlayerSlot::Two)).unwrap();

        assert_eq!(
            client.coordinator.replay(&mut client.session),
            Err(MatchError::HostOnly("restart the match"))
        );
        host.coordinator.replay(&mut host.session).unwrap();

        let later = at_spawn + Duration::from_secs(1);
        assert_eq!(started(&host.step(later)), vec![(f(2), f(5))]);
        assert_eq!(started(&client.step(later)), vec![(f(2), f(5))]);
        assert_eq!(host.coordinator.phase(), MatchPhase::Playing);
        assert_eq!(client.coordinator.phase(), MatchPhase::Playing);
        assert_eq!(client.coordinator.selection().local(), Some(&f(5)));
        assert_eq!(client.coordinator.outcome(), None);

        // The new round's items never reuse an id from the last one.
        let second_round = spawned(&host.step(later + Duration::from_secs(10)));
        assert_eq!(second_round.len(), 1);
        assert!(!first_round.contains(&second_round[0]));
    }
}
