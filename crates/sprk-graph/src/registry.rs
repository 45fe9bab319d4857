use std::collections::HashMap;

use sprk_types::TypeKey;

use crate::error::{GraphError, GraphResult};
use crate::savable::{Savable, SavableRef};

/// How to build a fresh instance of one registered type.
#[derive(Clone, Copy)]
struct Registration {
    name: &'static str,
    boxed: fn() -> Box<dyn Savable>,
    shared: fn() -> SavableRef,
}

fn make_boxed<T: Savable + Default>() -> Box<dyn Savable> {
    Box::new(T::default())
}

fn make_shared<T: Savable + Default>() -> SavableRef {
    SavableRef::new(T::default())
}

/// Maps type keys to constructors for decoding.
///
/// Every type that may appear in a graph is registered once before reading.
/// The registry is an explicit collaborator handed to each reader; there is
/// no process-wide table.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    entries: HashMap<TypeKey, Registration>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under the key derived from its type name.
    ///
    /// Registering the same type twice is a no-op. A different type whose
    /// name hashes to an already-registered key is rejected.
    pub fn register<T: Savable + Default>(&mut self) -> GraphResult<TypeKey> {
        let name = T::default().type_name();
        let key = TypeKey::of(name);
        if let Some(existing) = self.entries.get(&key) {
            if existing.name == name {
                return Ok(key);
            }
            return Err(GraphError::TypeCollision {
                key,
                existing: existing.name,
                incoming: name,
            });
        }
        self.entries.insert(
            key,
            Registration {
                name,
                boxed: make_boxed::<T>,
                shared: make_shared::<T>,
            },
        );
        Ok(key)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<T: Savable + Default>(mut self) -> GraphResult<Self> {
        self.register::<T>()?;
        Ok(self)
    }

    /// Default-construct an owned instance of the type behind `key`.
    pub fn create(&self, key: TypeKey) -> GraphResult<Box<dyn Savable>> {
        self.lookup(key).map(|entry| (entry.boxed)())
    }

    /// Default-construct a shared handle to the type behind `key`.
    pub fn create_shared(&self, key: TypeKey) -> GraphResult<SavableRef> {
        self.lookup(key).map(|entry| (entry.shared)())
    }

    /// Registered name for `key`.
    pub fn name_of(&self, key: TypeKey) -> Option<&'static str> {
        self.entries.get(&key).map(|entry| entry.name)
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: TypeKey) -> GraphResult<&Registration> {
        self.entries.get(&key).ok_or(GraphError::UnknownType(key))
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.entries.values().map(|entry| entry.name).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}
