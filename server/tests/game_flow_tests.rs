//! End-to-end simulation runs validating the event log's invariants.

use std::collections::HashSet;
use std::net::SocketAddr;

use server::client_manager::{ClientManager, WormId};
use server::game::{Game, GameConstants};
use server::rng::RandomGenerator;
use shared::{Event, Heartbeat, TurnDirection};

fn constants() -> GameConstants {
    GameConstants {
        turning_speed: 6,
        rounds_per_sec: 50,
        width: 800,
        height: 600,
    }
}

fn join(manager: &mut ClientManager, port: u16, name: &str) -> WormId {
    let addr: SocketAddr = format!("[2001:db8::9]:{}", port).parse().unwrap();
    let heartbeat = Heartbeat {
        session_id: 1,
        turn_direction: TurnDirection::Straight,
        next_expected_event_no: 0,
        player_name: name.to_string(),
    };
    manager.connect(addr, &heartbeat, 0).unwrap()
}

/// Runs a full game to completion and returns its event log.
fn run_game(seed: u32, names: &[&str]) -> Vec<Event> {
    let mut manager = ClientManager::new();
    let players: Vec<WormId> = names
        .iter()
        .enumerate()
        .map(|(i, name)| join(&mut manager, 1000 + i as u16, name))
        .collect();
    let mut rng = RandomGenerator::new(seed);
    let constants = constants();

    let mut game = Game::new(
        &constants,
        &mut rng,
        players,
        Vec::new(),
        &mut manager.worms,
    );
    for _ in 0..100_000 {
        if game.finished() {
            break;
        }
        game.play_round(&constants, &mut manager.worms);
    }
    assert!(game.finished(), "game did not finish");

    // Read the log back off the wire, checking the numbering on the way.
    let mut events = Vec::new();
    for datagram in game.datagrams_from(0) {
        let mut r = shared::Reader::new(&datagram);
        r.u32().unwrap();
        while !r.is_exhausted() {
            let decoded = shared::decode_event(&mut r).unwrap();
            assert_eq!(decoded.event_no as usize, events.len(), "log numbering");
            events.push(decoded.event.unwrap());
        }
    }
    events
}

#[test]
fn log_opens_with_new_game_and_closes_with_game_over() {
    for seed in [1, 3, 777, 123456789] {
        let events = run_game(seed, &["a", "b"]);
        assert!(matches!(events[0], Event::NewGame { .. }));
        assert_eq!(events.last(), Some(&Event::GameOver));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, Event::GameOver))
                .count(),
            1
        );
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, Event::NewGame { .. }))
                .count(),
            1
        );
    }
}

#[test]
fn no_pixel_is_ever_eaten_twice() {
    for seed in [1, 777, 424242] {
        let events = run_game(seed, &["a", "b", "c"]);
        let mut eaten = HashSet::new();
        for event in &events {
            if let Event::Pixel { x, y, .. } = event {
                assert!(eaten.insert((*x, *y)), "pixel ({}, {}) eaten twice", x, y);
            }
        }
    }
}

#[test]
fn eliminated_players_stay_silent() {
    for seed in [1, 777, 424242] {
        let events = run_game(seed, &["a", "b", "c"]);
        let mut dead: HashSet<u8> = HashSet::new();
        for event in &events {
            match event {
                Event::Pixel { player, .. } => {
                    assert!(!dead.contains(player), "pixel after elimination");
                }
                Event::PlayerEliminated { player } => {
                    assert!(dead.insert(*player), "player eliminated twice");
                }
                _ => {}
            }
        }
    }
}

#[test]
fn game_over_follows_the_second_to_last_elimination() {
    let events = run_game(777, &["a", "b"]);
    // With two players one elimination ends the game.
    let eliminations = events
        .iter()
        .filter(|e| matches!(e, Event::PlayerEliminated { .. }))
        .count();
    assert_eq!(eliminations, 1);
    assert!(matches!(
        events[events.len() - 2],
        Event::PlayerEliminated { .. }
    ));
}

#[test]
fn pixels_stay_inside_the_board() {
    let events = run_game(777, &["a", "b", "c", "d"]);
    let (maxx, maxy) = match &events[0] {
        Event::NewGame { maxx, maxy, .. } => (*maxx, *maxy),
        other => panic!("unexpected first event {:?}", other),
    };
    for event in &events {
        if let Event::Pixel { x, y, .. } = event {
            assert!(*x < maxx && *y < maxy);
        }
    }
}

#[test]
fn player_names_are_sorted_in_new_game() {
    let events = run_game(777, &["zoe", "amy", "mid"]);
    match &events[0] {
        Event::NewGame { players, .. } => {
            assert_eq!(players, &["amy", "mid", "zoe"]);
        }
        other => panic!("unexpected first event {:?}", other),
    }
}
