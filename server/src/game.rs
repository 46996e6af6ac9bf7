//! One round-based match: board state, event log, dissemination cursor.

use std::net::SocketAddr;

use shared::{pack_events, Event, TurnDirection};

use crate::board::{Angle, Board, Position};
use crate::client_manager::{ClientManager, WormArena, WormId};
use crate::rng::RandomGenerator;

/// Immutable per-run parameters, fixed on the command line.
#[derive(Debug, Clone, Copy)]
pub struct GameConstants {
    /// Degrees of heading change per round while a turn key is held.
    pub turning_speed: u32,
    pub rounds_per_sec: u32,
    pub width: u32,
    pub height: u32,
}

/// A single match. Owns the board and the append-only event log; refers to
/// its participants and observers by worm id only.
pub struct Game {
    game_id: u32,
    board: Board,
    events: Vec<Event>,
    next_disseminated_event_no: usize,
    players: Vec<WormId>,
    observers: Vec<WormId>,
    alive_players: usize,
    finished: bool,
}

impl Game {
    /// Builds a new game from the ready players (any order; they are
    /// sorted by name here) and seeds the event log with `NEW_GAME` and the
    /// initial placements.
    ///
    /// The draw order is fixed by the protocol: game id first, then x, y,
    /// angle per worm in player-index order. A worm spawning on an already
    /// eaten pixel is eliminated on the spot and does not count as alive.
    pub fn new(
        constants: &GameConstants,
        rng: &mut RandomGenerator,
        mut players: Vec<WormId>,
        observers: Vec<WormId>,
        worms: &mut WormArena,
    ) -> Self {
        let game_id = rng.next();

        players.sort_by(|a, b| {
            let name_a = worms.get(*a).map(|w| w.name.as_str()).unwrap_or("");
            let name_b = worms.get(*b).map(|w| w.name.as_str()).unwrap_or("");
            name_a.cmp(name_b)
        });
        let names: Vec<String> = players
            .iter()
            .filter_map(|id| worms.get(*id).map(|w| w.name.clone()))
            .collect();

        let mut game = Game {
            game_id,
            board: Board::new(constants.width, constants.height),
            events: Vec::new(),
            next_disseminated_event_no: 0,
            alive_players: players.len(),
            players,
            observers,
            finished: false,
        };
        game.push_event(Event::NewGame {
            maxx: constants.width,
            maxy: constants.height,
            players: names,
        });

        for i in 0..game.players.len() {
            let x = f64::from(rng.next() % constants.width) + 0.5;
            let y = f64::from(rng.next() % constants.height) + 0.5;
            let angle = Angle::new((rng.next() % 360) as u16);

            let Some(worm) = worms.get_mut(game.players[i]) else {
                continue;
            };
            worm.enter_game();
            let position = Position::new(x, y);
            let pixel = position.pixel();
            worm.position = Some(position);
            worm.angle = angle;

            match pixel {
                Some(p) if game.board.is_free(p) => {
                    game.board.eat(p);
                    game.push_event(Event::Pixel {
                        player: i as u8,
                        x: p.x,
                        y: p.y,
                    });
                }
                _ => {
                    worm.lose();
                    game.alive_players -= 1;
                    game.push_event(Event::PlayerEliminated { player: i as u8 });
                }
            }
        }
        game
    }

    pub fn game_id(&self) -> u32 {
        self.game_id
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn players(&self) -> &[WormId] {
        &self.players
    }

    pub fn has_player(&self, id: WormId) -> bool {
        self.players.contains(&id)
    }

    /// Registers a client that joined mid-game; it receives the broadcast
    /// stream until the game ends or the reference expires.
    pub fn add_observer(&mut self, id: WormId) {
        self.observers.push(id);
    }

    /// Advances the simulation by one round, appending events for every
    /// pixel eaten or worm eliminated. The game finishes once at most one
    /// worm is left alive; `GAME_OVER` is then the final log entry.
    pub fn play_round(&mut self, constants: &GameConstants, worms: &mut WormArena) {
        for i in 0..self.players.len() {
            let Some(worm) = worms.get_mut(self.players[i]) else {
                continue;
            };
            if !worm.alive {
                continue;
            }

            match worm.turn_direction {
                TurnDirection::Right => worm.angle = worm.angle.wrapping_add(constants.turning_speed),
                TurnDirection::Left => worm.angle = worm.angle.wrapping_sub(constants.turning_speed),
                TurnDirection::Straight => {}
            }

            let angle = worm.angle;
            let Some(position) = worm.position.as_mut() else {
                continue;
            };
            let before = position.pixel();
            position.advance(angle);
            let after = position.pixel();
            if after == before {
                continue;
            }

            match after {
                Some(p) if self.board.is_free(p) => {
                    self.board.eat(p);
                    self.push_event(Event::Pixel {
                        player: i as u8,
                        x: p.x,
                        y: p.y,
                    });
                }
                _ => {
                    worm.lose();
                    self.alive_players -= 1;
                    self.push_event(Event::PlayerEliminated { player: i as u8 });
                    if self.alive_players <= 1 {
                        self.finished = true;
                        break;
                    }
                }
            }
        }

        // A game starved down to one worm at placement ends on its first
        // round even without a fresh elimination.
        if self.alive_players <= 1 {
            self.finished = true;
        }
        if self.finished {
            self.push_event(Event::GameOver);
        }
    }

    fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Packs every event past the broadcast cursor and advances it.
    pub fn take_new_event_datagrams(&mut self) -> Vec<Vec<u8>> {
        let from = self.next_disseminated_event_no;
        self.next_disseminated_event_no = self.events.len();
        pack_events(self.game_id, &self.events[from..], from as u32)
    }

    /// Packs the log suffix a single client asked for in its heartbeat.
    pub fn datagrams_from(&self, next_expected_event_no: u32) -> Vec<Vec<u8>> {
        let from = (next_expected_event_no as usize).min(self.events.len());
        pack_events(self.game_id, &self.events[from..], from as u32)
    }

    /// Addresses of everyone who should receive the broadcast stream:
    /// connected participants plus live observers. Observer references
    /// whose worm is gone are dropped here.
    pub fn recipients(&mut self, clients: &ClientManager) -> Vec<SocketAddr> {
        let mut addrs = Vec::new();
        for id in &self.players {
            if let Some(addr) = clients.address_of(*id) {
                addrs.push(addr);
            }
        }
        self.observers.retain(|id| match clients.address_of(*id) {
            Some(addr) => {
                addrs.push(addr);
                true
            }
            None => false,
        });
        addrs
    }

    #[cfg(test)]
    pub fn events(&self) -> &[Event] {
        &self.events
    }
}
