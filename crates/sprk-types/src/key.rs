use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable 32-bit key identifying a savable type on the wire.
///
/// A `TypeKey` is derived from a type's fully-qualified name: the first four
/// bytes (little-endian) of its BLAKE3 hash. The same name always produces the
/// same key. The value `0` is reserved for "no object"; a name whose hash
/// lands on zero is mapped to `1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeKey(u32);

impl TypeKey {
    /// The reserved "no type" key, written in place of a null object.
    pub const NONE: TypeKey = TypeKey(0);

    /// Derive the key for a fully-qualified type name.
    pub fn of(name: &str) -> Self {
        let hash = blake3::hash(name.as_bytes());
        let bytes = hash.as_bytes();
        let raw = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        Self(raw.max(1))
    }

    /// Wrap a raw key read from the wire.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw 32-bit value.
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Returns `true` if this is the reserved "no type" key.
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({:08x})", self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl From<TypeKey> for u32 {
    fn from(key: TypeKey) -> Self {
        key.0
    }
}
