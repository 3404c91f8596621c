//! Errors raised by pure text helpers.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TextError {
    #[error("pause must be between 0.01 and 100 seconds, got {0}")]
    PauseOutOfRange(f64),
}
