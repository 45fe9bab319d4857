use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::TypeKey;

/// A redirected object: what it is and where it lives.
///
/// Produced by an external handler while writing and handed to an external
/// resolver while reading. The path is opaque to the engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalReference {
    /// Type key of the object as it was declared when written.
    pub declared: TypeKey,
    /// Resource path understood by the handler/resolver pair.
    pub path: String,
}

impl ExternalReference {
    pub fn new(declared: TypeKey, path: impl Into<String>) -> Self {
        Self {
            declared,
            path: path.into(),
        }
    }
}

impl fmt::Display for ExternalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.declared, self.path)
    }
}
