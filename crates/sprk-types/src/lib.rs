//! Foundation types for the SPRK object-graph format.
//!
//! This crate holds the pieces of the on-disk format that do not depend on
//! any savable type: the fixed-size file header, the reference mode byte,
//! the 32-bit type keys written in front of every encoded object, and the
//! external reference value handed to resolvers. Every other SPRK crate
//! depends on `sprk-types`.
//!
//! # Key Types
//!
//! - [`Header`]: 32-byte header describing the blocks that follow it
//! - [`ReferenceMode`]: how shared and external edges were routed when writing
//! - [`TypeKey`]: hashed, fully-qualified type name; `0` means "no object"
//! - [`ExternalReference`]: declared type plus resource path of a redirected object

pub mod error;
pub mod header;
pub mod key;
pub mod reference;

pub use error::FormatError;
pub use header::{Header, ReferenceMode, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use key::TypeKey;
pub use reference::ExternalReference;
