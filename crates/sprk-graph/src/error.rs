use sprk_types::{FormatError, TypeKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    #[error("truncated stream while reading {field}")]
    Truncated { field: &'static str },

    #[error("malformed {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("invalid presence marker {marker} at offset {offset}")]
    InvalidMarker { marker: i8, offset: u64 },

    #[error("corrupt graph data at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("shared index {index} out of bounds ({count} shared objects)")]
    SharedIndexOutOfBounds { index: i64, count: usize },

    #[error("direct reference cycle at {type_name} (path: {path})")]
    Cycle { type_name: &'static str, path: String },

    #[error("no type registered for key {0}")]
    UnknownType(TypeKey),

    #[error("type key collision: {existing} and {incoming} both hash to {key}")]
    TypeCollision {
        key: TypeKey,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("no external resolver configured for {path}")]
    MissingResolver { path: String },

    #[error("external reference failed: {0}")]
    External(String),

    #[error("object is already mutably borrowed")]
    Borrowed,

    #[error("a root object was already written to this graph")]
    RootAlreadyWritten,

    #[error("graph contains no root object")]
    MissingRoot,

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;
