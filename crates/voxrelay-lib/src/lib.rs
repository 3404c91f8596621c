//! voxrelay-lib: TTS relay engine.
//!
//! Provider client, chunk orchestrator, speech-to-file pipeline, voice catalog, password gate, chat
//! client, client state, and the HTTP relay. Depends on voxrelay-core for
//! pure types and text processing.

pub mod catalog;
pub mod chat;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod provider;
pub mod server;
pub mod speech;
pub mod state;

pub use error::{Error, Result};

// Re-export voxrelay-core for convenience
pub use voxrelay_core;
