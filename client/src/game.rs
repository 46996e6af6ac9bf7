//! Reassembling the server's event stream for the GUI.
//!
//! Datagrams arrive duplicated, reordered, or not at all. The stream state
//! turns that into an exactly-once, in-order line sequence: events at the
//! expected number are delivered immediately, later ones wait in a buffer
//! keyed by event number, earlier ones are duplicates and vanish. The
//! heartbeat's `next_expected_event_no` (read off this state) makes the
//! server retransmit whatever is still missing.

use std::collections::{BTreeMap, HashSet};

use shared::{decode_event, CodecError, Event, Reader, MAX_DATAGRAM_SIZE};

use crate::ClientError;

/// Client-side view of the event stream across games.
pub struct GameStream {
    current_game_id: Option<u32>,
    previous_game_ids: HashSet<u32>,
    next_expected_event_no: u32,
    future_events: BTreeMap<u32, Event>,
    /// Player list from the current game's NEW_GAME, in index order.
    players: Vec<String>,
    maxx: u32,
    maxy: u32,
}

impl GameStream {
    pub fn new() -> Self {
        GameStream {
            current_game_id: None,
            previous_game_ids: HashSet::new(),
            next_expected_event_no: 0,
            future_events: BTreeMap::new(),
            players: Vec::new(),
            maxx: 0,
            maxy: 0,
        }
    }

    /// The cumulative acknowledgment to put in the next heartbeat.
    pub fn next_expected_event_no(&self) -> u32 {
        self.next_expected_event_no
    }

    /// Processes one datagram from the server, appending every GUI line it
    /// unlocks to `lines`.
    ///
    /// A corrupted event discards the remainder of the datagram; unknown
    /// event types are skipped individually; an event that is malformed
    /// despite a valid checksum is fatal.
    pub fn handle_datagram(
        &mut self,
        datagram: &[u8],
        lines: &mut Vec<String>,
    ) -> Result<(), ClientError> {
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Ok(());
        }

        let mut r = Reader::new(datagram);
        let game_id = r.u32().map_err(|_| ClientError::MalformedEvent)?;

        if Some(game_id) != self.current_game_id {
            if self.previous_game_ids.contains(&game_id) {
                // A straggler from a game we already moved past.
                return Ok(());
            }
            if let Some(old) = self.current_game_id {
                // Only remember games we actually received something from.
                if self.next_expected_event_no > 0 {
                    self.previous_game_ids.insert(old);
                }
            }
            self.current_game_id = Some(game_id);
            self.future_events.clear();
            self.next_expected_event_no = 0;
        }

        while !r.is_exhausted() {
            let decoded = match decode_event(&mut r) {
                Ok(decoded) => decoded,
                Err(CodecError::CrcMismatch) => return Ok(()),
                Err(_) => return Err(ClientError::MalformedEvent),
            };
            let Some(event) = decoded.event else {
                continue;
            };
            self.accept(decoded.event_no, event, lines)?;
        }
        Ok(())
    }

    fn accept(
        &mut self,
        event_no: u32,
        event: Event,
        lines: &mut Vec<String>,
    ) -> Result<(), ClientError> {
        use std::cmp::Ordering;

        match event_no.cmp(&self.next_expected_event_no) {
            Ordering::Equal => {
                self.next_expected_event_no += 1;
                self.deliver(event, lines)?;
                // Drain everything this event unlocked.
                while let Some(entry) = self.future_events.first_entry() {
                    if *entry.key() != self.next_expected_event_no {
                        break;
                    }
                    let unlocked = entry.remove();
                    self.next_expected_event_no += 1;
                    self.deliver(unlocked, lines)?;
                }
            }
            Ordering::Greater => {
                self.future_events.entry(event_no).or_insert(event);
            }
            Ordering::Less => {} // duplicate of something already delivered
        }
        Ok(())
    }

    fn deliver(&mut self, event: Event, lines: &mut Vec<String>) -> Result<(), ClientError> {
        if let Event::NewGame {
            maxx,
            maxy,
            players,
        } = &event
        {
            self.maxx = *maxx;
            self.maxy = *maxy;
            self.players = players.clone();
        }
        event
            .validate(&self.players, self.maxx, self.maxy)
            .map_err(|_| ClientError::MalformedEvent)?;
        if let Some(line) = event.gui_line(&self.players) {
            lines.push(line);
        }
        Ok(())
    }
}

impl Default for GameStream {
    fn default() -> Self {
        Self::new()
    }
}
