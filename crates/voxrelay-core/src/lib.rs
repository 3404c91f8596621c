//! voxrelay-core: Pure types and text processing.
//!
//! No async runtime, no I/O, no platform dependencies.

pub mod error;
pub mod history;
pub mod retry;
pub mod segment;
pub mod text_prep;
pub mod types;
pub mod voices;
