//! Mock ISE provider
//!
//! A local WebSocket server speaking the provider's framing, with scripted
//! behaviors for the success path and the failure modes the client has to
//! survive:
//! - Scripted XML result, optionally split across several frames
//! - Provider error code right after the handshake
//! - Connection closed before any result
//! - Partial result followed by a close frame or an abrupt drop
//! - Silent server that never answers

// Allow dead code in test infrastructure - not every test binary uses every helper
#![allow(dead_code)]

pub mod websocket_mock;

pub use websocket_mock::{IseMockServer, MockBehavior, RecordedSession};
