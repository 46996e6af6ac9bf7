//! Event taxonomy and its wire framing.
//!
//! A game is an append-only log of events; `event_no` equals the event's
//! index in that log. On the wire every event carries its own length prefix
//! and CRC32 trailer:
//!
//! ```text
//! len: u32 | event_no: u32 | event_type: u8 | data | crc32: u32
//! ```
//!
//! `len` covers `event_no + event_type + data` only. The checksum is
//! computed over the big-endian bytes of `len + event_no + event_type +
//! data`, so a receiver first validates the frame and only then interprets
//! it. Unknown event types are well-formed frames too: `len` lets the
//! receiver step over them without understanding the payload.

use crate::codec::{crc32, CodecError, Reader};
use crate::MAX_DATAGRAM_SIZE;

const NEW_GAME: u8 = 0;
const PIXEL: u8 = 1;
const PLAYER_ELIMINATED: u8 = 2;
const GAME_OVER: u8 = 3;

/// Bytes of framing around the event data: len, event_no, event_type, crc32.
const FRAME_OVERHEAD: usize = 4 + 4 + 1 + 4;

/// One entry of a game's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Opens a game: board bounds (exclusive) and the participants in
    /// index order. Always event 0.
    NewGame {
        maxx: u32,
        maxy: u32,
        players: Vec<String>,
    },
    /// Player `player` ate the pixel at `(x, y)`.
    Pixel { player: u8, x: u32, y: u32 },
    /// Player `player` ran into a wall or an eaten pixel.
    PlayerEliminated { player: u8 },
    /// Closes a game. Always the last event when present.
    GameOver,
}

impl Event {
    pub fn event_type(&self) -> u8 {
        match self {
            Event::NewGame { .. } => NEW_GAME,
            Event::Pixel { .. } => PIXEL,
            Event::PlayerEliminated { .. } => PLAYER_ELIMINATED,
            Event::GameOver => GAME_OVER,
        }
    }

    fn data_len(&self) -> usize {
        match self {
            Event::NewGame { players, .. } => {
                8 + players.iter().map(|p| p.len() + 1).sum::<usize>()
            }
            Event::Pixel { .. } => 9,
            Event::PlayerEliminated { .. } => 1,
            Event::GameOver => 0,
        }
    }

    /// Total on-wire size of this event including framing.
    pub fn wire_size(&self) -> usize {
        FRAME_OVERHEAD + self.data_len()
    }

    /// Appends the framed event to `out`.
    pub fn encode(&self, event_no: u32, out: &mut Vec<u8>) {
        let start = out.len();
        let len = (4 + 1 + self.data_len()) as u32;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&event_no.to_be_bytes());
        out.push(self.event_type());
        match self {
            Event::NewGame {
                maxx,
                maxy,
                players,
            } => {
                out.extend_from_slice(&maxx.to_be_bytes());
                out.extend_from_slice(&maxy.to_be_bytes());
                for player in players {
                    out.extend_from_slice(player.as_bytes());
                    out.push(0);
                }
            }
            Event::Pixel { player, x, y } => {
                out.push(*player);
                out.extend_from_slice(&x.to_be_bytes());
                out.extend_from_slice(&y.to_be_bytes());
            }
            Event::PlayerEliminated { player } => out.push(*player),
            Event::GameOver => {}
        }
        let checksum = crc32(&out[start..]);
        out.extend_from_slice(&checksum.to_be_bytes());
    }

    /// Checks the event against the current game's player list and board
    /// bounds. A violation means the sender is broken, not the network:
    /// the frame already passed its checksum.
    pub fn validate(&self, players: &[String], maxx: u32, maxy: u32) -> Result<(), CodecError> {
        match self {
            Event::Pixel { player, x, y } => {
                if usize::from(*player) >= players.len() || *x >= maxx || *y >= maxy {
                    Err(CodecError::BadData)
                } else {
                    Ok(())
                }
            }
            Event::PlayerEliminated { player } => {
                if usize::from(*player) >= players.len() {
                    Err(CodecError::BadData)
                } else {
                    Ok(())
                }
            }
            Event::NewGame { .. } | Event::GameOver => Ok(()),
        }
    }

    /// The GUI line for this event, without the trailing newline.
    ///
    /// `GameOver` has no GUI representation. Player indices must have been
    /// validated beforehand; out-of-range indices yield `None`.
    pub fn gui_line(&self, players: &[String]) -> Option<String> {
        match self {
            Event::NewGame {
                maxx,
                maxy,
                players,
            } => {
                let mut line = format!("NEW_GAME {} {}", maxx, maxy);
                for player in players {
                    line.push(' ');
                    line.push_str(player);
                }
                Some(line)
            }
            Event::Pixel { player, x, y } => players
                .get(usize::from(*player))
                .map(|name| format!("PIXEL {} {} {}", x, y, name)),
            Event::PlayerEliminated { player } => players
                .get(usize::from(*player))
                .map(|name| format!("PLAYER_ELIMINATED {}", name)),
            Event::GameOver => None,
        }
    }
}

/// One event lifted off the wire.
///
/// `event` is `None` for an unrecognized `event_type`: the frame was intact
/// (length and checksum agreed) but its payload has no meaning to us, so
/// the receiver records the gap and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedEvent {
    pub event_no: u32,
    pub event: Option<Event>,
}

/// Decodes the next event frame from `r`.
///
/// Framing errors come back as [`CodecError::Truncated`] or
/// [`CodecError::CrcMismatch`]; a frame whose checksum holds but whose
/// payload contradicts its own length is [`CodecError::BadData`].
pub fn decode_event(r: &mut Reader) -> Result<DecodedEvent, CodecError> {
    let start = r.position();
    let len = r.u32()? as usize;
    if r.remaining() < len + 4 {
        return Err(CodecError::Truncated);
    }

    // The checksum spans the len field plus the next `len` bytes.
    let bytes = r.bytes();
    let framed = &bytes[start..start + 4 + len];
    let mut trailer = [0u8; 4];
    trailer.copy_from_slice(&bytes[start + 4 + len..start + 8 + len]);
    if crc32(framed) != u32::from_be_bytes(trailer) {
        return Err(CodecError::CrcMismatch);
    }

    if len < 5 {
        return Err(CodecError::BadData);
    }
    let event_no = r.u32()?;
    let event_type = r.u8()?;
    let data = r.take(len - 5)?;
    r.take(4)?; // trailer, already verified

    let event = match event_type {
        NEW_GAME => Some(decode_new_game(data)?),
        PIXEL => {
            let mut d = Reader::new(data);
            let event = Event::Pixel {
                player: d.u8().map_err(|_| CodecError::BadData)?,
                x: d.u32().map_err(|_| CodecError::BadData)?,
                y: d.u32().map_err(|_| CodecError::BadData)?,
            };
            exhausted(&d)?;
            Some(event)
        }
        PLAYER_ELIMINATED => {
            let mut d = Reader::new(data);
            let event = Event::PlayerEliminated {
                player: d.u8().map_err(|_| CodecError::BadData)?,
            };
            exhausted(&d)?;
            Some(event)
        }
        GAME_OVER => {
            if !data.is_empty() {
                return Err(CodecError::BadData);
            }
            Some(Event::GameOver)
        }
        _ => None,
    };

    Ok(DecodedEvent { event_no, event })
}

fn decode_new_game(data: &[u8]) -> Result<Event, CodecError> {
    let mut d = Reader::new(data);
    let maxx = d.u32().map_err(|_| CodecError::BadData)?;
    let maxy = d.u32().map_err(|_| CodecError::BadData)?;
    let mut players = Vec::new();
    while !d.is_exhausted() {
        players.push(d.name().map_err(|_| CodecError::BadData)?);
    }
    Ok(Event::NewGame {
        maxx,
        maxy,
        players,
    })
}

fn exhausted(d: &Reader) -> Result<(), CodecError> {
    if d.is_exhausted() {
        Ok(())
    } else {
        Err(CodecError::BadData)
    }
}

/// Packs `events` (numbered from `first_event_no`) into datagrams.
///
/// Every datagram opens with `game_id`; an event that would overflow the
/// 550-byte budget starts the next datagram. Returns no datagrams for an
/// empty slice.
pub fn pack_events(game_id: u32, events: &[Event], first_event_no: u32) -> Vec<Vec<u8>> {
    let mut datagrams = Vec::new();
    if events.is_empty() {
        return datagrams;
    }

    let mut current = datagram_head(game_id);
    for (i, event) in events.iter().enumerate() {
        if current.len() > 4 && current.len() + event.wire_size() > MAX_DATAGRAM_SIZE {
            datagrams.push(current);
            current = datagram_head(game_id);
        }
        event.encode(first_event_no + i as u32, &mut current);
    }
    datagrams.push(current);
    datagrams
}

fn datagram_head(game_id: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_DATAGRAM_SIZE);
    buf.extend_from_slice(&game_id.to_be_bytes());
    buf
}
