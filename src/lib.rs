//! Tank Arena - authoritative multiplayer tank server and sync core
//!
//! Browser clients connect over WebSocket and exchange binary frames: a
//! 2-byte channel header followed by a BSON document. The server runs the
//! simulation on a fixed, drift-corrected tick and answers every client
//! with its own snapshot each tick; clients reply with their input.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
