//! The client → server heartbeat datagram.
//!
//! Sent every 30 ms whether or not anything changed; it doubles as the
//! liveness signal, the input channel, and the cumulative acknowledgment
//! (`next_expected_event_no`) that drives event retransmission.

use crate::codec::{CodecError, Reader};
use crate::{TurnDirection, MAX_PLAYER_NAME_LEN};

/// Everything a client tells the server, every 30 ms.
///
/// Wire layout (big-endian, no terminator after the name):
///
/// ```text
/// session_id: u64 | turn_direction: u8 | next_expected_event_no: u32 | player_name: bytes
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    /// Client-chosen token; a strictly larger value from the same address
    /// supersedes the current session.
    pub session_id: u64,
    pub turn_direction: TurnDirection,
    /// Cumulative acknowledgment: the lowest event number the client still
    /// needs.
    pub next_expected_event_no: u32,
    /// Empty for observers; otherwise 1..=20 printable ASCII bytes.
    pub player_name: String,
}

impl Heartbeat {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.session_id.to_be_bytes());
        out.push(self.turn_direction.as_u8());
        out.extend_from_slice(&self.next_expected_event_no.to_be_bytes());
        out.extend_from_slice(self.player_name.as_bytes());
    }

    /// Decodes and validates a heartbeat datagram.
    ///
    /// A name longer than 20 bytes, a name byte outside 33..=126, or a turn
    /// direction above 2 all make the datagram invalid; the server drops it
    /// without touching any session state.
    pub fn decode(datagram: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(datagram);
        let session_id = r.u64()?;
        let turn_direction = TurnDirection::try_from(r.u8()?)?;
        let next_expected_event_no = r.u32()?;

        let name_bytes = r.rest();
        if name_bytes.len() > MAX_PLAYER_NAME_LEN
            || !name_bytes.iter().all(|b| (33..=126).contains(b))
        {
            return Err(CodecError::BadData);
        }
        let player_name =
            String::from_utf8(name_bytes.to_vec()).map_err(|_| CodecError::BadData)?;

        Ok(Heartbeat {
            session_id,
            turn_direction,
            next_expected_event_no,
            player_name,
        })
    }

    /// True when the sender has not claimed a player name.
    pub fn is_observer(&self) -> bool {
        self.player_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Heartbeat {
        Heartbeat {
            session_id: 0x0102_0304_0506_0708,
            turn_direction: TurnDirection::Left,
            next_expected_event_no: 42,
            player_name: "worm".to_string(),
        }
    }

    #[test]
    fn roundtrip() {
        let hb = sample();
        let mut wire = Vec::new();
        hb.encode(&mut wire);
        assert_eq!(wire.len(), 8 + 1 + 4 + 4);
        assert_eq!(Heartbeat::decode(&wire).unwrap(), hb);
    }

    #[test]
    fn observer_heartbeat_has_no_name() {
        let hb = Heartbeat {
            player_name: String::new(),
            ..sample()
        };
        let mut wire = Vec::new();
        hb.encode(&mut wire);
        assert_eq!(wire.len(), 13);
        let decoded = Heartbeat::decode(&wire).unwrap();
        assert!(decoded.is_observer());
    }

    #[test]
    fn name_length_boundary() {
        let mut ok = sample();
        ok.player_name = "x".repeat(20);
        let mut wire = Vec::new();
        ok.encode(&mut wire);
        assert!(Heartbeat::decode(&wire).is_ok());

        // One byte more and the whole heartbeat is rejected.
        wire.push(b'x');
        assert_eq!(Heartbeat::decode(&wire), Err(CodecError::BadData));
    }

    #[test]
    fn name_charset_boundary() {
        for (byte, ok) in [(32u8, false), (33, true), (126, true), (127, false)] {
            let mut wire = Vec::new();
            sample().encode(&mut wire);
            wire.push(byte);
            assert_eq!(Heartbeat::decode(&wire).is_ok(), ok, "byte {}", byte);
        }
    }

    #[test]
    fn bad_turn_direction_is_rejected() {
        let mut wire = Vec::new();
        sample().encode(&mut wire);
        wire[8] = 3;
        assert_eq!(Heartbeat::decode(&wire), Err(CodecError::BadData));
    }

    #[test]
    fn short_datagram_is_truncated() {
        let mut wire = Vec::new();
        sample().encode(&mut wire);
        assert_eq!(Heartbeat::decode(&wire[..12]), Err(CodecError::Truncated));
    }
}
