//! Configuration errors raised before any device work starts.

use thiserror::Error;

/// Rejected startup configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The initial drawable would have no area.
    #[error("Window size {width}x{height} has no drawable area")]
    EmptyWindow { width: u32, height: u32 },

    /// A pool or ring was configured to hold nothing.
    #[error("{what} must be at least 1")]
    ZeroCapacity { what: &'static str },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
