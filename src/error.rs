// src/error.rs
//
// Errors raised at the library boundary: invalid caller input,
// configuration problems and I/O. Bit-level protocol problems are not
// errors; they are reported as violations inside a decode outcome.

use std::io;
use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Error, Debug)]
pub enum CodecError {
    /// Identifier does not fit in 29 bits
    #[error("Invalid identifier 0x{0:x}: must be at most 0x1fffffff")]
    InvalidIdentifier(u32),

    /// Identifier needs extended framing but the message is marked standard
    #[error("Identifier 0x{0:x} does not fit in a standard (11 bit) frame")]
    StandardIdentifierTooLarge(u32),

    /// More than 8 data bytes
    #[error("Too much data: {0} bytes (maximum is 8)")]
    TooMuchData(usize),

    /// Remote requests carry no payload
    #[error("Remote request cannot carry data ({0} bytes given)")]
    RemoteRequestWithData(usize),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// True when the error was caused by the message the caller supplied.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CodecError::InvalidIdentifier(_)
                | CodecError::StandardIdentifierTooLarge(_)
                | CodecError::TooMuchData(_)
                | CodecError::RemoteRequestWithData(_)
        )
    }
}
