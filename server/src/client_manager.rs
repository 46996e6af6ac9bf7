//! Client session and worm membership management.
//!
//! The manager owns every `Worm` and every `ClientSession` in two slot
//! arenas addressed by generational ids. Cross-references are ids, never
//! pointers: a session points at its worm, a worm optionally points back at
//! its session, and games hold worm ids for participants and observers. A
//! stale id (slot freed or reused) simply resolves to `None`, which is how
//! a game discovers that an observer has gone away.
//!
//! Sessions are keyed by source address. A worm exists as long as either a
//! session or the running game references it; a disconnected participant's
//! worm keeps gliding until its game is over.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;

use shared::{Heartbeat, TurnDirection};

use crate::board::{Angle, Position};

/// A client goes idle after 2 seconds without a heartbeat.
pub const DISCONNECT_THRESHOLD_NS: u64 = 2_000_000_000;

/// Ordering key for client addresses: byte-lexicographic over an explicit
/// field order, so lookups do not depend on how the OS lays out sockaddr
/// structures. IPv4 peers on the dual-stack socket are keyed through their
/// IPv6-mapped form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AddrKey {
    ip: [u8; 16],
    port: u16,
    flowinfo: u32,
    scope_id: u32,
}

impl From<SocketAddr> for AddrKey {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => AddrKey {
                ip: v4.ip().to_ipv6_mapped().octets(),
                port: v4.port(),
                flowinfo: 0,
                scope_id: 0,
            },
            SocketAddr::V6(v6) => AddrKey {
                ip: v6.ip().octets(),
                port: v6.port(),
                flowinfo: v6.flowinfo(),
                scope_id: v6.scope_id(),
            },
        }
    }
}

/// Generational handle into the worm arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WormId {
    index: u32,
    generation: u32,
}

/// Generational handle into the session arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId {
    index: u32,
    generation: u32,
}

/// A controllable entity. Observers are worms with an empty name; they
/// never enter a game.
#[derive(Debug)]
pub struct Worm {
    pub name: String,
    pub turn_direction: TurnDirection,
    pub ready: bool,
    pub connected: bool,
    pub alive: bool,
    pub angle: Angle,
    pub position: Option<Position>,
    pub session: Option<SessionId>,
}

impl Worm {
    fn new(name: String, turn_direction: TurnDirection) -> Self {
        Worm {
            name,
            turn_direction,
            ready: false,
            connected: true,
            alive: false,
            angle: Angle::new(0),
            position: None,
            session: None,
        }
    }

    pub fn is_observer(&self) -> bool {
        self.name.is_empty()
    }

    /// Resets per-game state when the worm enters a new game. Readiness is
    /// consumed: the player must press a key again for the next game.
    pub fn enter_game(&mut self) {
        self.alive = true;
        self.ready = false;
        self.position = None;
    }

    pub fn lose(&mut self) {
        self.alive = false;
    }
}

/// One client endpoint, identified by (address, session_id).
#[derive(Debug)]
pub struct ClientSession {
    pub addr: SocketAddr,
    pub session_id: u64,
    pub last_heartbeat_round_no: u64,
    pub worm: WormId,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot arena with generation counters; see the module docs.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    fn insert(&mut self, value: T) -> (u32, u32) {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.value = Some(value);
                (index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: Some(value),
                });
                ((self.slots.len() - 1) as u32, 0)
            }
        }
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        let slot = self.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_ref()
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.value.as_mut()
    }

    fn remove(&mut self, index: u32, generation: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        Some(value)
    }
}

/// The worm arena, exposed to the game simulation.
pub struct WormArena {
    arena: Arena<Worm>,
}

impl WormArena {
    fn new() -> Self {
        WormArena {
            arena: Arena::new(),
        }
    }

    fn insert(&mut self, worm: Worm) -> WormId {
        let (index, generation) = self.arena.insert(worm);
        WormId { index, generation }
    }

    pub fn get(&self, id: WormId) -> Option<&Worm> {
        self.arena.get(id.index, id.generation)
    }

    pub fn get_mut(&mut self, id: WormId) -> Option<&mut Worm> {
        self.arena.get_mut(id.index, id.generation)
    }

    fn remove(&mut self, id: WormId) -> Option<Worm> {
        self.arena.remove(id.index, id.generation)
    }
}

/// Membership state: who is connected, under which name, and with which
/// worm. See the heartbeat handling in [`crate::network`] for the protocol
/// driving these transitions.
pub struct ClientManager {
    pub worms: WormArena,
    sessions: Arena<ClientSession>,
    by_addr: BTreeMap<AddrKey, SessionId>,
    named_worms: BTreeSet<WormId>,
    observer_worms: BTreeSet<WormId>,
    names_in_use: BTreeSet<String>,
}

impl ClientManager {
    pub fn new() -> Self {
        ClientManager {
            worms: WormArena::new(),
            sessions: Arena::new(),
            by_addr: BTreeMap::new(),
            named_worms: BTreeSet::new(),
            observer_worms: BTreeSet::new(),
            names_in_use: BTreeSet::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.by_addr.len()
    }

    pub fn session_at(&self, addr: SocketAddr) -> Option<(SessionId, &ClientSession)> {
        let id = *self.by_addr.get(&AddrKey::from(addr))?;
        let session = self.sessions.get(id.index, id.generation)?;
        Some((id, session))
    }

    /// Admits a new client. Fails (returns `None`) when the requested name
    /// is already taken by a connected client.
    pub fn connect(
        &mut self,
        addr: SocketAddr,
        heartbeat: &Heartbeat,
        round_no: u64,
    ) -> Option<WormId> {
        if !heartbeat.is_observer() && self.names_in_use.contains(&heartbeat.player_name) {
            return None;
        }

        let worm_id = self.worms.insert(Worm::new(
            heartbeat.player_name.clone(),
            heartbeat.turn_direction,
        ));
        let (index, generation) = self.sessions.insert(ClientSession {
            addr,
            session_id: heartbeat.session_id,
            last_heartbeat_round_no: round_no,
            worm: worm_id,
        });
        let session_id = SessionId { index, generation };

        if let Some(worm) = self.worms.get_mut(worm_id) {
            worm.session = Some(session_id);
        }
        self.by_addr.insert(AddrKey::from(addr), session_id);
        if heartbeat.is_observer() {
            self.observer_worms.insert(worm_id);
        } else {
            self.named_worms.insert(worm_id);
            self.names_in_use.insert(heartbeat.player_name.clone());
        }
        Some(worm_id)
    }

    /// Removes a session, freeing its name and marking the worm
    /// disconnected. The worm slot itself is kept when `keep_worm` is true
    /// (it is a participant of the running game) and freed otherwise.
    /// Returns the affected worm id.
    pub fn disconnect(&mut self, id: SessionId, keep_worm: bool) -> Option<WormId> {
        let session = self.sessions.remove(id.index, id.generation)?;
        self.by_addr.remove(&AddrKey::from(session.addr));

        let worm_id = session.worm;
        if let Some(worm) = self.worms.get_mut(worm_id) {
            worm.connected = false;
            worm.session = None;
            if worm.is_observer() {
                self.observer_worms.remove(&worm_id);
            } else {
                self.names_in_use.remove(&worm.name);
                self.named_worms.remove(&worm_id);
            }
        }
        if !keep_worm {
            self.worms.remove(worm_id);
        }
        Some(worm_id)
    }

    pub fn worm_of(&self, id: SessionId) -> Option<WormId> {
        self.sessions.get(id.index, id.generation).map(|s| s.worm)
    }

    pub fn heartbeat_received(&mut self, id: SessionId, round_no: u64) {
        if let Some(session) = self.sessions.get_mut(id.index, id.generation) {
            session.last_heartbeat_round_no = round_no;
        }
    }

    /// Resolves a worm to the address of its live session, if any.
    pub fn address_of(&self, id: WormId) -> Option<SocketAddr> {
        let session_id = self.worms.get(id)?.session?;
        self.sessions
            .get(session_id.index, session_id.generation)
            .map(|s| s.addr)
    }

    /// Sessions that have been silent long enough to be evicted.
    pub fn idle_sessions(&self, round_no: u64, round_duration_ns: u64) -> Vec<SessionId> {
        self.by_addr
            .values()
            .copied()
            .filter(|id| {
                self.sessions
                    .get(id.index, id.generation)
                    .map_or(false, |session| {
                        (round_no - session.last_heartbeat_round_no) * round_duration_ns
                            >= DISCONNECT_THRESHOLD_NS
                    })
            })
            .collect()
    }

    /// True when a new game may begin: at least two named worms, all ready.
    pub fn can_start_game(&self) -> bool {
        self.named_worms.len() >= 2
            && self
                .named_worms
                .iter()
                .all(|id| self.worms.get(*id).map_or(false, |w| w.ready))
    }

    /// The named worms in lexicographic name order, ready to become the
    /// player list of a new game.
    pub fn players_sorted_by_name(&self) -> Vec<WormId> {
        let mut players: Vec<WormId> = self.named_worms.iter().copied().collect();
        players.sort_by(|a, b| {
            let name_a = self.worms.get(*a).map(|w| w.name.as_str()).unwrap_or("");
            let name_b = self.worms.get(*b).map(|w| w.name.as_str()).unwrap_or("");
            name_a.cmp(name_b)
        });
        players
    }

    pub fn observer_ids(&self) -> Vec<WormId> {
        self.observer_worms.iter().copied().collect()
    }

    /// Frees the slot of a worm whose session is already gone. Called when
    /// a game that kept the worm alive is archived.
    pub fn release_if_disconnected(&mut self, id: WormId) {
        if self.worms.get(id).map_or(false, |w| !w.connected) {
            self.worms.remove(id);
        }
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
