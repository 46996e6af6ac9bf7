//! GUI → client key lines.
//!
//! The GUI reports key transitions as newline-terminated text. A key press
//! selects a turning direction, a release returns to straight. Anything
//! else on a line is ignored by the reader.

use crate::TurnDirection;

/// Length of the longest recognized line, `RIGHT_KEY_DOWN`, without the
/// newline. Lines growing past this without a newline cannot become valid.
pub const MAX_KEY_LINE_LEN: usize = 14;

/// Maps one complete line (newline stripped) to a turn direction.
pub fn parse_key_line(line: &[u8]) -> Option<TurnDirection> {
    match line {
        b"LEFT_KEY_DOWN" => Some(TurnDirection::Left),
        b"RIGHT_KEY_DOWN" => Some(TurnDirection::Right),
        b"LEFT_KEY_UP" | b"RIGHT_KEY_UP" => Some(TurnDirection::Straight),
        _ => None,
    }
}
