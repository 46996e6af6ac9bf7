//! # Shared Protocol Library
//!
//! This crate contains the wire protocol spoken between the game server and
//! its clients, along with the line protocol bridging a client to its GUI
//! process. It is the single source of truth for framing, so both binaries
//! depend on it and cannot drift apart.
//!
//! ## Protocol overview
//!
//! The game runs over UDP with a fixed 550-byte datagram budget in both
//! directions:
//!
//! - **Client → server**: a periodic *heartbeat* carrying the client's
//!   session id, current turn direction, the next event number it expects,
//!   and its player name (empty name = observer). See [`Heartbeat`].
//! - **Server → client**: a `game_id` followed by as many consecutive
//!   *events* as fit in the datagram. Each event is independently framed
//!   with a length prefix and a CRC32 trailer so a client can skip event
//!   types it does not understand and detect corruption. See [`Event`].
//!
//! All multi-byte integers are big-endian. The CRC32 is the IEEE 802.3
//! checksum computed over the on-wire bytes of the event excluding the
//! trailer itself.
//!
//! ## GUI line protocol
//!
//! The client relays delivered events to a GUI over TCP as
//! whitespace-separated text lines (`NEW_GAME`, `PIXEL`,
//! `PLAYER_ELIMINATED`) and receives key transitions back
//! (`LEFT_KEY_DOWN`, `RIGHT_KEY_UP`, ...). See [`gui`].

pub mod codec;
pub mod event;
pub mod gui;
pub mod heartbeat;

pub use codec::{CodecError, Reader};
pub use event::{decode_event, pack_events, DecodedEvent, Event};
pub use heartbeat::Heartbeat;

/// Hard cap on a single UDP datagram, send and receive.
///
/// A received datagram longer than this is discarded whole; outgoing events
/// that do not fit are carried over into a fresh datagram.
pub const MAX_DATAGRAM_SIZE: usize = 550;

/// Longest permitted player name, in bytes.
pub const MAX_PLAYER_NAME_LEN: usize = 20;

/// A worm's turning intent, as carried in every heartbeat.
///
/// The wire encoding is a single byte: 0 = straight, 1 = right, 2 = left.
/// Any other value renders the whole heartbeat invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    Straight,
    Right,
    Left,
}

impl TurnDirection {
    pub fn as_u8(self) -> u8 {
        match self {
            TurnDirection::Straight => 0,
            TurnDirection::Right => 1,
            TurnDirection::Left => 2,
        }
    }

    /// True for the directions that mark a waiting player as ready.
    pub fn is_turning(self) -> bool {
        matches!(self, TurnDirection::Right | TurnDirection::Left)
    }
}

impl TryFrom<u8> for TurnDirection {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        match value {
            0 => Ok(TurnDirection::Straight),
            1 => Ok(TurnDirection::Right),
            2 => Ok(TurnDirection::Left),
            _ => Err(CodecError::BadData),
        }
    }
}
