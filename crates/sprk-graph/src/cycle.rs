use std::collections::HashSet;

use crate::error::{GraphError, GraphResult};
use crate::savable::Identity;

/// Objects currently being written through direct (non-shared) edges.
///
/// The path is kept in insertion order so a cycle error can show how the
/// writer got back to the offending object.
#[derive(Debug, Default)]
pub(crate) struct CycleGuard {
    path: Vec<(Identity, &'static str)>,
    active: HashSet<Identity>,
}

impl CycleGuard {
    /// Push an object onto the active path, failing if it is already on it.
    pub fn enter(&mut self, identity: Identity, type_name: &'static str) -> GraphResult<()> {
        if !self.active.insert(identity) {
            let mut names: Vec<&str> = self.path.iter().map(|(_, name)| *name).collect();
            names.push(type_name);
            return Err(GraphError::Cycle {
                type_name,
                path: names.join(" -> "),
            });
        }
        self.path.push((identity, type_name));
        Ok(())
    }

    /// Pop an object off the active path.
    pub fn leave(&mut self, identity: Identity) {
        self.active.remove(&identity);
        if let Some(pos) = self.path.iter().rposition(|(id, _)| *id == identity) {
            self.path.remove(pos);
        }
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn clear(&mut self) {
        self.path.clear();
        self.active.clear();
    }
}
