//! Binary persistence for graphs of polymorphic objects.
//!
//! A graph is encoded from one root [`Savable`] into a single SPRK blob:
//! a 32-byte header, a shared block holding every object reached through a
//! shared edge exactly once, and a primary block holding the root and
//! everything it owns directly. The payload may be zstd-compressed as a whole.
//!
//! # Architecture
//!
//! - **[`GraphWriter`]**: stages primary and shared regions in memory, then
//!   writes header and payload in one pass
//! - **[`GraphReader`]**: parses the shared table on open and decodes shared
//!   objects lazily, memoizing them by index
//! - **[`TypeRegistry`]**: maps wire type keys back to constructors
//! - **[`ExternalHandler`] / [`ExternalResolver`]**: redirect objects to
//!   storage outside the graph and load them back
//! - **[`inspect`](inspect::inspect) / [`transcode`](inspect::transcode)**:
//!   structural views and re-encoding that need no registry
//!
//! Edges come in three kinds. Direct edges are written inline and must not
//! form cycles. Shared edges are written as indices, deduplicated by object
//! identity, and may form cycles. External edges go through a handler when
//! one is configured and fall back to shared edges otherwise.

pub mod codec;
pub mod config;
mod cycle;
pub mod error;
pub mod external;
pub mod inspect;
pub mod memory;
pub mod reader;
pub mod registry;
pub mod savable;
mod shared;
mod stream;
pub mod writer;

#[cfg(test)]
mod fixtures;

pub use codec::Primitive;
pub use config::{EngineConfig, ReaderConfig, WriterConfig};
pub use error::{GraphError, GraphResult};
pub use external::{ExternalHandler, ExternalResolver, MissingResolverPolicy};
pub use inspect::{inspect, transcode, verify, GraphInspection, SharedEntryInfo};
pub use memory::MemoryResourceStore;
pub use reader::GraphReader;
pub use registry::TypeRegistry;
pub use savable::{AsAny, Savable, SavableRef};
pub use writer::{GraphSummary, GraphWriter};

pub use sprk_types::{ExternalReference, FormatError, Header, ReferenceMode, TypeKey};
