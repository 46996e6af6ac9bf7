//! # Game Server Library
//!
//! Authoritative server for the worms-style multiplayer game. The server
//! owns the only copy of the truth: a fixed-tick simulation of worms eating
//! pixels on a bounded board, serialized into an append-only event log that
//! clients replay through a lossy UDP event stream.
//!
//! ## Module organization
//!
//! - [`rng`]: the deterministic generator every game draw comes from;
//!   a seed fully determines a server run.
//! - [`board`]: pixels, headings, and the eaten-pixel bitmap.
//! - [`game`]: one match: placement, per-round motion, event generation,
//!   and the dissemination cursor.
//! - [`client_manager`]: sessions, names, observers, and the arenas that
//!   own every worm and session.
//! - [`network`]: the single-task event loop tying the round timer, the
//!   UDP socket, and the outbound queue together.

pub mod board;
pub mod client_manager;
pub mod game;
pub mod network;
pub mod rng;
