//! # Game Client Library
//!
//! The client bridges the UDP game server to a local GUI process speaking
//! a newline-delimited text protocol over TCP. It has no game logic of its
//! own: it reassembles the server's event stream into exactly-once,
//! in-order GUI lines, and funnels the GUI's key transitions back to the
//! server inside the periodic heartbeat.
//!
//! ## Module organization
//!
//! - [`game`]: per-game event reassembly: duplicate suppression, future
//!   buffering, game-id switching.
//! - [`input`]: parsing key lines arriving from the GUI.
//! - [`network`]: the single-task event loop: heartbeat timer, UDP
//!   receive, and both TCP directions with backpressure.

use thiserror::Error;

pub mod game;
pub mod input;
pub mod network;

/// Fatal client conditions. The protocol tolerates loss and corruption,
/// so anything surfacing here means a broken peer, not a flaky network.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An event passed its checksum but its contents are nonsense; the
    /// server (or an impostor) is broken and continuing would desync the GUI.
    #[error("server sent malformed data with a valid checksum")]
    MalformedEvent,
    /// The GUI closed its end of the TCP connection.
    #[error("interface closed the connection")]
    GuiClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
