//! Server event loop: UDP socket, round timer, outbound queue.
//!
//! Everything runs in one task on a current-thread runtime. `select!` is
//! the only suspension point; each wakeup handler runs to completion, so
//! there is no locking anywhere in the server. Missed round-timer ticks
//! are replayed one round each, keeping the simulation clock independent
//! of scheduling hiccups.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;

use shared::{Heartbeat, MAX_DATAGRAM_SIZE};

use crate::client_manager::{ClientManager, SessionId};
use crate::game::{Game, GameConstants};
use crate::rng::RandomGenerator;

const NS_IN_SEC: u64 = 1_000_000_000;

enum Wake {
    Round,
    Datagram(io::Result<(usize, SocketAddr)>),
    Writable(io::Result<()>),
}

/// The authoritative game server.
pub struct Server {
    socket: UdpSocket,
    constants: GameConstants,
    round_duration_ns: u64,
    rng: RandomGenerator,
    round_no: u64,
    clients: ClientManager,
    current_game: Option<Game>,
    previous_game: Option<Game>,
    send_queue: VecDeque<(Vec<u8>, SocketAddr)>,
}

impl Server {
    /// Binds the dual-stack UDP socket on `[::]:port`.
    pub async fn bind(port: u16, seed: u32, constants: GameConstants) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv6Addr::UNSPECIFIED, port)).await?;
        info!("server listening on {}", socket.local_addr()?);

        Ok(Server {
            socket,
            constants,
            round_duration_ns: NS_IN_SEC / u64::from(constants.rounds_per_sec),
            rng: RandomGenerator::new(seed),
            round_no: 0,
            clients: ClientManager::new(),
            current_game: None,
            previous_game: None,
            send_queue: VecDeque::new(),
        })
    }

    /// Runs forever; only an unexpected socket error returns.
    pub async fn run(&mut self) -> io::Result<()> {
        let mut rounds = tokio::time::interval(Duration::from_nanos(self.round_duration_ns));
        rounds.set_missed_tick_behavior(MissedTickBehavior::Burst);
        // One byte of slack so an oversized datagram is seen as oversized
        // rather than silently truncated to the limit.
        let mut buf = [0u8; MAX_DATAGRAM_SIZE + 1];

        loop {
            let wake = tokio::select! {
                _ = rounds.tick() => Wake::Round,
                received = self.socket.recv_from(&mut buf) => Wake::Datagram(received),
                writable = self.socket.writable(), if !self.send_queue.is_empty() => {
                    Wake::Writable(writable)
                }
            };

            match wake {
                Wake::Round => {
                    self.disconnect_idles();
                    self.round();
                }
                Wake::Datagram(received) => {
                    let (len, addr) = received?;
                    if len <= MAX_DATAGRAM_SIZE {
                        self.handle_heartbeat(&buf[..len], addr);
                    } else {
                        debug!("dropping oversized datagram from {}", addr);
                    }
                }
                Wake::Writable(writable) => writable?,
            }
            self.flush_send_queue()?;
        }
    }

    /// Sends queued datagrams until the queue empties or the socket would
    /// block; in the latter case the select loop re-arms on writability.
    fn flush_send_queue(&mut self) -> io::Result<()> {
        while let Some((payload, addr)) = self.send_queue.front() {
            match self.socket.try_send_to(payload, *addr) {
                Ok(_) => {
                    self.send_queue.pop_front();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn disconnect_idles(&mut self) {
        for session in self
            .clients
            .idle_sessions(self.round_no, self.round_duration_ns)
        {
            self.remove_session(session);
        }
    }

    /// One simulation round: step the game, broadcast whatever the step
    /// appended, and archive the game once it is over.
    fn round(&mut self) {
        let mut finished = false;
        if let Some(game) = self.current_game.as_mut() {
            game.play_round(&self.constants, &mut self.clients.worms);

            let payloads = game.take_new_event_datagrams();
            if !payloads.is_empty() {
                for addr in game.recipients(&self.clients) {
                    for payload in &payloads {
                        self.send_queue.push_back((payload.clone(), addr));
                    }
                }
            }
            finished = game.finished();
        }

        if finished {
            if let Some(game) = self.current_game.take() {
                info!(
                    "game {} finished after {} events",
                    game.game_id(),
                    game.event_count()
                );
                // Worms that lost their session mid-game were only kept
                // alive for this game; let go of them now.
                for id in game.players().to_vec() {
                    self.clients.release_if_disconnected(id);
                }
                self.previous_game = Some(game);
            }
        }

        self.round_no += 1;
    }

    fn handle_heartbeat(&mut self, datagram: &[u8], addr: SocketAddr) {
        let heartbeat = match Heartbeat::decode(datagram) {
            Ok(heartbeat) => heartbeat,
            Err(e) => {
                warn!("dropping invalid datagram from {}: {}", addr, e);
                return;
            }
        };

        let existing = self
            .clients
            .session_at(addr)
            .map(|(id, session)| (id, session.session_id, session.worm));

        match existing {
            None => self.admit(addr, heartbeat),
            Some((session, stored_id, worm_id)) if stored_id == heartbeat.session_id => {
                self.clients.heartbeat_received(session, self.round_no);
                if let Some(worm) = self.clients.worms.get_mut(worm_id) {
                    worm.turn_direction = heartbeat.turn_direction;
                }

                // Unicast catch-up from the cursor the client sent us. A
                // just-finished game keeps answering until the next starts.
                let payloads = if let Some(game) = &self.current_game {
                    game.datagrams_from(heartbeat.next_expected_event_no)
                } else if let Some(game) = &self.previous_game {
                    game.datagrams_from(heartbeat.next_expected_event_no)
                } else {
                    Vec::new()
                };
                for payload in payloads {
                    self.send_queue.push_back((payload, addr));
                }

                if self.current_game.is_none() && heartbeat.turn_direction.is_turning() {
                    if let Some(worm) = self.clients.worms.get_mut(worm_id) {
                        worm.ready = true;
                    }
                    self.try_start_game();
                }
            }
            Some((session, stored_id, _)) if stored_id < heartbeat.session_id => {
                // The client restarted: tear the old session down and admit
                // the heartbeat as a brand-new client.
                self.remove_session(session);
                self.admit(addr, heartbeat);
            }
            Some(_) => debug!("dropping heartbeat with stale session id from {}", addr),
        }
    }

    fn admit(&mut self, addr: SocketAddr, heartbeat: Heartbeat) {
        let name = heartbeat.player_name.clone();
        match self.clients.connect(addr, &heartbeat, self.round_no) {
            Some(worm_id) => {
                info!(
                    "client connected from {} as {}",
                    addr,
                    if name.is_empty() { "(observer)" } else { &name }
                );
                if let Some(game) = self.current_game.as_mut() {
                    game.add_observer(worm_id);
                }
            }
            None => debug!("name {:?} already in use, ignoring {}", name, addr),
        }
    }

    fn remove_session(&mut self, session: SessionId) {
        let keep_worm = self
            .clients
            .worm_of(session)
            .zip(self.current_game.as_ref())
            .map_or(false, |(worm, game)| game.has_player(worm));

        let name = self
            .clients
            .worm_of(session)
            .and_then(|worm| self.clients.worms.get(worm))
            .map(|w| w.name.clone())
            .unwrap_or_default();
        if self.clients.disconnect(session, keep_worm).is_some() {
            info!(
                "client disconnected: {}",
                if name.is_empty() { "(observer)" } else { &name }
            );
        }
    }

    fn try_start_game(&mut self) {
        if self.current_game.is_some() || !self.clients.can_start_game() {
            return;
        }

        let players = self.clients.players_sorted_by_name();
        let observers = self.clients.observer_ids();
        let game = Game::new(
            &self.constants,
            &mut self.rng,
            players,
            observers,
            &mut self.clients.worms,
        );
        info!(
            "starting game {} with {} players",
            game.game_id(),
            game.players().len()
        );
        // The opening events reach everyone with the next round's
        // broadcast; the cursor still sits at zero.
        self.current_game = Some(game);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants() -> GameConstants {
        GameConstants {
            turning_speed: 6,
            rounds_per_sec: 50,
            width: 800,
            height: 600,
        }
    }

    async fn test_server(seed: u32) -> Server {
        Server::bind(0, seed, constants()).await.unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        format!("[2001:db8::3]:{}", port).parse().unwrap()
    }

    fn heartbeat_bytes(session_id: u64, direction: u8, next_expected: u32, name: &str) -> Vec<u8> {
        let mut wire = Vec::new();
        wire.extend_from_slice(&session_id.to_be_bytes());
        wire.push(direction);
        wire.extend_from_slice(&next_expected.to_be_bytes());
        wire.extend_from_slice(name.as_bytes());
        wire
    }

    #[tokio::test]
    async fn invalid_heartbeats_change_nothing() {
        let mut server = test_server(777).await;

        // Truncated, bad direction, bad name byte, name too long.
        server.handle_heartbeat(&[0; 5], addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 3, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 0, 0, "a b"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 0, 0, &"x".repeat(21)), addr(1));

        assert_eq!(server.clients.session_count(), 0);
        assert!(server.send_queue.is_empty());
    }

    #[tokio::test]
    async fn duplicate_name_from_another_address_is_ignored() {
        let mut server = test_server(777).await;

        server.handle_heartbeat(&heartbeat_bytes(1, 0, 0, "a"), addr(1));
        assert_eq!(server.clients.session_count(), 1);

        server.handle_heartbeat(&heartbeat_bytes(1, 0, 0, "a"), addr(2));
        assert_eq!(server.clients.session_count(), 1);
        assert!(server.clients.session_at(addr(2)).is_none());
    }

    #[tokio::test]
    async fn larger_session_id_takes_over_smaller_is_dropped() {
        let mut server = test_server(777).await;

        server.handle_heartbeat(&heartbeat_bytes(5, 0, 0, "a"), addr(1));
        let (_, first) = server.clients.session_at(addr(1)).unwrap();
        assert_eq!(first.session_id, 5);

        // A strictly larger id replaces the session (name re-registered).
        server.handle_heartbeat(&heartbeat_bytes(7, 0, 0, "a"), addr(1));
        let (_, second) = server.clients.session_at(addr(1)).unwrap();
        assert_eq!(second.session_id, 7);
        assert_eq!(server.clients.session_count(), 1);

        // A smaller id is stale and must not roll the session back.
        server.handle_heartbeat(&heartbeat_bytes(5, 0, 0, "a"), addr(1));
        let (_, third) = server.clients.session_at(addr(1)).unwrap();
        assert_eq!(third.session_id, 7);
    }

    #[tokio::test]
    async fn game_starts_when_two_named_players_are_ready() {
        let mut server = test_server(777).await;

        // First heartbeat admits; readiness needs a turn on a live session.
        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));
        assert!(server.current_game.is_none());

        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        assert!(server.current_game.is_none());
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));

        let game = server.current_game.as_ref().unwrap();
        assert_eq!(game.game_id(), 777);
        assert_eq!(game.players().len(), 2);
    }

    #[tokio::test]
    async fn observer_joining_mid_game_gets_the_full_log() {
        let mut server = test_server(777).await;
        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));
        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));
        assert!(server.current_game.is_some());

        // The observer's first heartbeat only admits it...
        server.handle_heartbeat(&heartbeat_bytes(1, 0, 0, ""), addr(3));
        server.send_queue.clear();
        // ...the second one is answered with events from number 0 on.
        server.handle_heartbeat(&heartbeat_bytes(1, 0, 0, ""), addr(3));

        assert!(!server.send_queue.is_empty());
        let (payload, dest) = server.send_queue.front().unwrap();
        assert_eq!(*dest, addr(3));
        assert_eq!(&payload[..4], &777u32.to_be_bytes());

        // And it is on the broadcast list of the running game.
        let game = server.current_game.as_mut().unwrap();
        let recipients = game.recipients(&server.clients);
        assert!(recipients.contains(&addr(3)));
    }

    #[tokio::test]
    async fn broadcast_reaches_players_each_round() {
        let mut server = test_server(777).await;
        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));
        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));
        server.send_queue.clear();

        server.round();

        // Both players got the same opening datagram.
        let destinations: Vec<SocketAddr> =
            server.send_queue.iter().map(|(_, addr)| *addr).collect();
        assert!(destinations.contains(&addr(1)));
        assert!(destinations.contains(&addr(2)));
        let payloads: Vec<&Vec<u8>> = server.send_queue.iter().map(|(p, _)| p).collect();
        assert_eq!(payloads[0], payloads[1]);
    }

    #[tokio::test]
    async fn idle_clients_are_evicted_after_two_seconds() {
        let mut server = test_server(777).await;
        server.handle_heartbeat(&heartbeat_bytes(1, 0, 0, "a"), addr(1));

        // 50 rounds/sec: the threshold sits exactly at 100 silent rounds.
        server.round_no = 99;
        server.disconnect_idles();
        assert_eq!(server.clients.session_count(), 1);

        server.round_no = 100;
        server.disconnect_idles();
        assert_eq!(server.clients.session_count(), 0);
    }

    #[tokio::test]
    async fn finished_game_keeps_answering_heartbeats() {
        let mut server = test_server(3).await;
        // A 1x1 board ends the game on the first played round.
        server.constants = GameConstants {
            turning_speed: 6,
            rounds_per_sec: 50,
            width: 1,
            height: 1,
        };
        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));
        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));
        assert!(server.current_game.is_some());

        server.round();
        assert!(server.current_game.is_none());
        assert!(server.previous_game.is_some());

        // Late heartbeats are served from the archived log.
        server.send_queue.clear();
        server.handle_heartbeat(&heartbeat_bytes(1, 0, 0, "a"), addr(1));
        assert!(!server.send_queue.is_empty());
    }

    #[tokio::test]
    async fn takeover_mid_game_turns_the_player_into_an_observer() {
        let mut server = test_server(777).await;
        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));
        server.handle_heartbeat(&heartbeat_bytes(1, 1, 0, "a"), addr(1));
        server.handle_heartbeat(&heartbeat_bytes(1, 2, 0, "b"), addr(2));
        let old_worms = server.current_game.as_ref().unwrap().players().to_vec();

        // Same address, larger session id: the old session dies, but its
        // worm stays in the game; the new worm only observes.
        server.handle_heartbeat(&heartbeat_bytes(2, 0, 0, "a"), addr(1));

        let game = server.current_game.as_ref().unwrap();
        assert_eq!(game.players(), &old_worms[..]);
        let (_, session) = server.clients.session_at(addr(1)).unwrap();
        assert_eq!(session.session_id, 2);
        assert!(!game.has_player(session.worm));
        // The old participant worm survives without a session.
        assert!(server.clients.worms.get(old_worms[0]).is_some());
        assert_eq!(server.clients.address_of(old_worms[0]), None);
    }
}
