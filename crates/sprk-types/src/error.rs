use thiserror::Error;

/// Errors produced while decoding fixed-layout format structures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid magic: expected {expected:?}, got {actual:?}")]
    InvalidMagic { expected: [u8; 4], actual: [u8; 4] },

    #[error("unsupported format version: expected {expected}, got {actual}")]
    UnsupportedVersion { expected: u16, actual: u16 },

    #[error("invalid reference mode byte: {0}")]
    InvalidReferenceMode(u8),

    #[error("invalid {field} flag byte: {value}")]
    InvalidFlag { field: &'static str, value: u8 },

    #[error("inconsistent header: {0}")]
    Inconsistent(String),
}
