use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::rc::Rc;

use sprk_types::ExternalReference;
use tracing::debug;

use crate::config::{ReaderConfig, WriterConfig};
use crate::error::{GraphError, GraphResult};
use crate::external::{ExternalHandler, ExternalResolver};
use crate::reader::GraphReader;
use crate::registry::TypeRegistry;
use crate::savable::SavableRef;
use crate::writer::GraphWriter;

/// In-memory external storage.
///
/// Objects marked with [`redirect`](Self::redirect) are stored as their own
/// SPRK graphs under a path; everything else is declined and written as
/// absent. Encoded resources stay pending until the owning writer flushes,
/// so a graph that fails to finalize leaves no resources behind.
///
/// Clones share state: hand one clone to a writer as its handler and another
/// to a reader as its resolver.
#[derive(Clone)]
pub struct MemoryResourceStore {
    registry: Rc<TypeRegistry>,
    writer_config: WriterConfig,
    inner: Rc<RefCell<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    redirects: HashMap<usize, (String, SavableRef)>,
    pending: BTreeMap<String, Vec<u8>>,
    resources: BTreeMap<String, Vec<u8>>,
    loaded: HashMap<String, SavableRef>,
}

impl MemoryResourceStore {
    /// Store whose resources are decoded with `registry`.
    pub fn new(registry: TypeRegistry) -> Self {
        Self::with_config(registry, WriterConfig::default())
    }

    /// Store that encodes resources with `config`.
    pub fn with_config(registry: TypeRegistry, writer_config: WriterConfig) -> Self {
        Self {
            registry: Rc::new(registry),
            writer_config,
            inner: Rc::new(RefCell::new(StoreState::default())),
        }
    }

    /// Store `object` under `path` whenever a writer offers it.
    pub fn redirect(&self, object: &SavableRef, path: impl Into<String>) {
        self.inner
            .borrow_mut()
            .redirects
            .insert(object.identity(), (path.into(), object.clone()));
    }

    /// Insert an already-encoded resource.
    pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
        let path = path.into();
        let mut state = self.inner.borrow_mut();
        state.loaded.remove(&path);
        state.resources.insert(path, bytes);
    }

    /// Committed bytes stored under `path`.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.borrow().resources.get(path).cloned()
    }

    /// Committed paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.inner.borrow().resources.keys().cloned().collect()
    }

    /// Resources encoded but not yet committed by a flush.
    pub fn pending_len(&self) -> usize {
        self.inner.borrow().pending.len()
    }

    fn encode(&self, object: &SavableRef) -> GraphResult<Vec<u8>> {
        let mut bytes = Vec::new();
        let mut writer = GraphWriter::with_config(&mut bytes, self.writer_config.clone());
        writer.write_root_ref(object)?;
        writer.finish()?;
        Ok(bytes)
    }
}

impl ExternalHandler for MemoryResourceStore {
    fn process(&mut self, object: &SavableRef) -> GraphResult<Option<ExternalReference>> {
        let path = match self.inner.borrow().redirects.get(&object.identity()) {
            Some((path, _)) => path.clone(),
            None => return Ok(None),
        };

        let encoded = self.inner.borrow().pending.contains_key(&path);
        if !encoded {
            let bytes = self.encode(object)?;
            debug!(path = %path, bytes = bytes.len(), "encoded external resource");
            self.inner.borrow_mut().pending.insert(path.clone(), bytes);
        }

        let declared = object.try_borrow()?.type_key();
        Ok(Some(ExternalReference::new(declared, path)))
    }

    fn flush(&mut self) -> GraphResult<()> {
        let mut state = self.inner.borrow_mut();
        let pending = std::mem::take(&mut state.pending);
        for path in pending.keys() {
            state.loaded.remove(path);
        }
        debug!(committed = pending.len(), "flushed external resources");
        state.resources.extend(pending);
        Ok(())
    }
}

impl ExternalResolver for MemoryResourceStore {
    fn load(&mut self, reference: &ExternalReference) -> GraphResult<Option<SavableRef>> {
        if let Some(object) = self.inner.borrow().loaded.get(&reference.path) {
            return Ok(Some(object.clone()));
        }

        let bytes = self
            .get(&reference.path)
            .ok_or_else(|| GraphError::External(format!("no resource at {}", reference.path)))?;
        let mut reader =
            GraphReader::with_config(Cursor::new(bytes), &self.registry, ReaderConfig::strict())?;
        let object = reader.read_root_ref()?;

        self.inner
            .borrow_mut()
            .loaded
            .insert(reference.path.clone(), object.clone());
        Ok(Some(object))
    }
}

impl std::fmt::Debug for MemoryResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("MemoryResourceStore")
            .field("redirects", &state.redirects.len())
            .field("pending", &state.pending.len())
            .field("resources", &state.resources.len())
            .finish()
    }
}
