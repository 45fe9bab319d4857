use std::io::{Read, Seek, SeekFrom};

use sprk_types::{ExternalReference, Header, ReferenceMode, TypeKey};
use tracing::{debug, trace, warn};

use crate::codec::{self, prealloc, Primitive, MARKER_ABSENT, MARKER_PRESENT, NULL_INDEX};
use crate::config::ReaderConfig;
use crate::error::{GraphError, GraphResult};
use crate::external::{
    external_edge_form, shared_edge_form, EdgeForm, ExternalResolver, MissingResolverPolicy,
    ReadRouting,
};
use crate::registry::TypeRegistry;
use crate::savable::{downcast_box, Savable, SavableRef};
use crate::shared::{SharedReadTable, SlotState};
use crate::stream::{Layout, ReadSeek, Source};

/// Decodes one SPRK graph.
///
/// Opening a reader parses the header and the shared table's size prefixes;
/// no object is decoded until [`read_root`](Self::read_root). Shared objects
/// are decoded the first time their index is dereferenced and memoized, so
/// every edge to the same index yields the same handle.
///
/// The input must be positioned at the start of a graph. Several graphs may
/// follow one another in a stream; call [`finish`](Self::finish) to move the
/// input past this one.
pub struct GraphReader<'a> {
    source: Source<'a>,
    layout: Layout,
    registry: &'a TypeRegistry,
    shared: SharedReadTable,
    routing: ReadRouting<'a>,
}

impl<'a> GraphReader<'a> {
    /// Reader with the default configuration and no external resolver.
    pub fn new(input: impl Read + Seek + 'a, registry: &'a TypeRegistry) -> GraphResult<Self> {
        Self::open(Box::new(input), registry, ReaderConfig::default(), None)
    }

    pub fn with_config(
        input: impl Read + Seek + 'a,
        registry: &'a TypeRegistry,
        config: ReaderConfig,
    ) -> GraphResult<Self> {
        Self::open(Box::new(input), registry, config, None)
    }

    /// Reader that loads external edges through `resolver`.
    pub fn with_resolver(
        input: impl Read + Seek + 'a,
        registry: &'a TypeRegistry,
        config: ReaderConfig,
        resolver: impl ExternalResolver + 'a,
    ) -> GraphResult<Self> {
        Self::open(Box::new(input), registry, config, Some(Box::new(resolver)))
    }

    fn open(
        input: Box<dyn ReadSeek + 'a>,
        registry: &'a TypeRegistry,
        config: ReaderConfig,
        resolver: Option<Box<dyn ExternalResolver + 'a>>,
    ) -> GraphResult<Self> {
        let (mut source, layout) = Source::open(input)?;
        let shared = SharedReadTable::parse(
            &mut source,
            layout.shared_start,
            layout.header.shared_size,
            config.max_shared_objects,
        )?;
        debug!(
            mode = %layout.header.mode,
            compressed = layout.header.compressed,
            shared_objects = shared.len(),
            primary_bytes = layout.header.primary_size,
            "opened graph"
        );
        Ok(Self {
            source,
            layout,
            registry,
            shared,
            routing: ReadRouting::new(resolver, config.missing_resolver),
        })
    }

    pub fn header(&self) -> &Header {
        &self.layout.header
    }

    /// Reference mode the graph was written with.
    pub fn reference_mode(&self) -> ReferenceMode {
        self.layout.header.mode
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    /// Number of entries in the shared table.
    pub fn shared_count(&self) -> usize {
        self.shared.len()
    }

    /// Number of shared entries decoded so far.
    pub fn resolved_count(&self) -> usize {
        self.shared.resolved_count()
    }

    // ---- Roots ----

    /// Decode the root object.
    ///
    /// Each call decodes a fresh root; shared objects stay memoized across
    /// calls.
    pub fn read_root(&mut self) -> GraphResult<Box<dyn Savable>> {
        self.source.seek(SeekFrom::Start(self.layout.primary_start))?;
        let root = self.read_savable()?.ok_or(GraphError::MissingRoot)?;
        self.check_primary_consumed()?;
        Ok(root)
    }

    /// Decode the root object as a concrete type.
    pub fn read_root_as<T: Savable>(&mut self) -> GraphResult<T> {
        downcast_box(self.read_root()?)
    }

    /// Decode the root object into a shared handle.
    pub fn read_root_ref(&mut self) -> GraphResult<SavableRef> {
        self.source.seek(SeekFrom::Start(self.layout.primary_start))?;
        let root = self.read_object()?.ok_or(GraphError::MissingRoot)?;
        self.check_primary_consumed()?;
        Ok(root)
    }

    /// Move the caller's stream to the first byte after this graph.
    pub fn finish(mut self) -> GraphResult<()> {
        let end = self.layout.graph_end();
        self.source.raw.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    // ---- Primitives ----

    pub fn read<T: Primitive>(&mut self) -> GraphResult<T> {
        T::decode(&mut self.source)
    }

    pub fn read_string(&mut self) -> GraphResult<String> {
        codec::decode_string(&mut self.source)
    }

    pub fn read_bytes(&mut self) -> GraphResult<Vec<u8>> {
        codec::decode_bytes(&mut self.source, "bytes")
    }

    pub fn read_array<T: Primitive>(&mut self) -> GraphResult<Option<Vec<T>>> {
        self.read_elements(Self::read::<T>)
    }

    pub fn read_string_array(&mut self) -> GraphResult<Option<Vec<String>>> {
        self.read_elements(Self::read_string)
    }

    // ---- Direct edges ----

    /// Nested savable decoded into an owned box.
    pub fn read_savable(&mut self) -> GraphResult<Option<Box<dyn Savable>>> {
        let Some(key) = self.read_type_key()? else {
            return Ok(None);
        };
        let mut instance = self.registry.create(key)?;
        instance.read(self)?;
        Ok(Some(instance))
    }

    /// Nested savable of a known concrete type.
    pub fn read_savable_as<T: Savable>(&mut self) -> GraphResult<Option<T>> {
        self.read_savable()?.map(downcast_box::<T>).transpose()
    }

    /// Nested savable decoded into a fresh handle.
    pub fn read_object(&mut self) -> GraphResult<Option<SavableRef>> {
        let Some(key) = self.read_type_key()? else {
            return Ok(None);
        };
        let instance = self.registry.create_shared(key)?;
        instance.try_borrow_mut()?.read(self)?;
        Ok(Some(instance))
    }

    pub fn read_savable_array<T: Savable>(&mut self) -> GraphResult<Option<Vec<T>>> {
        self.read_elements(|reader| {
            reader.read_savable_as::<T>()?.ok_or_else(|| GraphError::Malformed {
                field: "savable array",
                reason: "null element".into(),
            })
        })
    }

    pub fn read_object_array(&mut self) -> GraphResult<Option<Vec<SavableRef>>> {
        self.read_elements(|reader| {
            reader.read_object()?.ok_or_else(|| GraphError::Malformed {
                field: "object array",
                reason: "null element".into(),
            })
        })
    }

    // ---- Shared and external edges ----

    /// Shared edge: the same index always yields the same handle.
    pub fn read_shared(&mut self) -> GraphResult<Option<SavableRef>> {
        match shared_edge_form(self.layout.header.mode) {
            EdgeForm::Shared => self.read_shared_index(),
            EdgeForm::External => self.read_external_form(),
        }
    }

    /// Elements may be `None` when the graph was written all-external and
    /// the handler declined some of them.
    pub fn read_shared_array(&mut self) -> GraphResult<Option<Vec<Option<SavableRef>>>> {
        self.read_elements(Self::read_shared)
    }

    /// External edge: loaded through the resolver, or read as shared when the
    /// graph was written without a handler.
    pub fn read_external(&mut self) -> GraphResult<Option<SavableRef>> {
        match external_edge_form(self.layout.header.mode) {
            EdgeForm::Shared => self.read_shared_index(),
            EdgeForm::External => self.read_external_form(),
        }
    }

    pub fn read_external_array(&mut self) -> GraphResult<Option<Vec<Option<SavableRef>>>> {
        self.read_elements(Self::read_external)
    }

    // ---- Internals ----

    fn read_type_key(&mut self) -> GraphResult<Option<TypeKey>> {
        let key = TypeKey::from_raw(self.read::<u32>()?);
        Ok((!key.is_none()).then_some(key))
    }

    fn read_elements<T>(
        &mut self,
        mut element: impl FnMut(&mut Self) -> GraphResult<T>,
    ) -> GraphResult<Option<Vec<T>>> {
        let marker = self.read::<i8>()?;
        match marker {
            MARKER_ABSENT => return Ok(None),
            MARKER_PRESENT => {}
            other => return Err(self.invalid_marker(other)),
        }
        let count = self.read::<u32>()?;
        let mut values = Vec::with_capacity(prealloc(u64::from(count)));
        for _ in 0..count {
            values.push(element(self)?);
        }
        Ok(Some(values))
    }

    fn read_shared_index(&mut self) -> GraphResult<Option<SavableRef>> {
        let index = self.read::<i32>()?;
        if index == NULL_INDEX {
            return Ok(None);
        }
        self.resolve_shared(i64::from(index)).map(Some)
    }

    /// Memoized decode of one shared entry.
    fn resolve_shared(&mut self, index: i64) -> GraphResult<SavableRef> {
        let entry = self.shared.entry(index)?;
        let (offset, size) = match &entry.state {
            SlotState::Resolved(instance) => return Ok(instance.clone()),
            SlotState::Unresolved => (entry.offset, entry.size),
        };
        // entry() accepted the index, so it is a valid usize.
        let slot = index as usize;
        let result = self.at_position(offset, |reader| reader.decode_shared(slot, offset, size));
        if result.is_err() {
            self.shared.unresolve(slot);
        }
        result
    }

    fn decode_shared(&mut self, slot: usize, offset: u64, size: u64) -> GraphResult<SavableRef> {
        let key = self.read_type_key()?.ok_or_else(|| GraphError::CorruptEntry {
            offset,
            reason: format!("shared entry {slot} holds a null object"),
        })?;
        let instance = self.registry.create_shared(key)?;
        // Memoize before decoding the body so edges back to this entry
        // resolve to the instance being built.
        self.shared.resolve(slot, instance.clone());
        instance.try_borrow_mut()?.read(self)?;

        let consumed = self.source.stream_position()?.saturating_sub(offset);
        if consumed != size {
            return Err(GraphError::CorruptEntry {
                offset,
                reason: format!("shared entry {slot} declares {size} bytes, decoded {consumed}"),
            });
        }
        trace!(index = slot, key = %key, size, "resolved shared object");
        Ok(instance)
    }

    fn read_external_form(&mut self) -> GraphResult<Option<SavableRef>> {
        let marker = self.read::<i8>()?;
        match marker {
            MARKER_ABSENT => return Ok(None),
            MARKER_PRESENT => {}
            other => return Err(self.invalid_marker(other)),
        }
        let declared = TypeKey::from_raw(self.read::<u32>()?);
        let path = self.read_string()?;
        let reference = ExternalReference::new(declared, path);

        match &mut self.routing {
            ReadRouting::Resolver(resolver) => {
                let loaded = resolver.load(&reference)?;
                if let Some(object) = &loaded {
                    let borrowed = object.try_borrow()?;
                    if borrowed.type_key() != declared {
                        return Err(GraphError::TypeMismatch {
                            expected: declared.to_string(),
                            actual: borrowed.type_name().into(),
                        });
                    }
                }
                Ok(loaded)
            }
            ReadRouting::Missing(MissingResolverPolicy::Lenient) => {
                warn!(reference = %reference, "no external resolver; reading external edge as absent");
                Ok(None)
            }
            ReadRouting::Missing(MissingResolverPolicy::Strict) => Err(GraphError::MissingResolver {
                path: reference.path,
            }),
        }
    }

    /// Run `f` with the working stream at `position`, then restore it.
    fn at_position<T>(
        &mut self,
        position: u64,
        f: impl FnOnce(&mut Self) -> GraphResult<T>,
    ) -> GraphResult<T> {
        let saved = self.source.stream_position()?;
        self.source.seek(SeekFrom::Start(position))?;
        let result = f(self);
        let restored = self.source.seek(SeekFrom::Start(saved));
        let value = result?;
        restored?;
        Ok(value)
    }

    fn check_primary_consumed(&mut self) -> GraphResult<()> {
        let position = self.source.stream_position()?;
        let end = self.layout.primary_end();
        if position != end {
            return Err(GraphError::CorruptEntry {
                offset: position,
                reason: format!("root ends at {position}, primary block ends at {end}"),
            });
        }
        Ok(())
    }

    fn invalid_marker(&mut self, marker: i8) -> GraphError {
        match self.source.stream_position() {
            Ok(position) => GraphError::InvalidMarker {
                marker,
                offset: position.saturating_sub(1),
            },
            Err(e) => e.into(),
        }
    }
}

impl std::fmt::Debug for GraphReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphReader")
            .field("header", &self.layout.header)
            .field("shared_objects", &self.shared.len())
            .field("resolved", &self.shared.resolved_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::config::WriterConfig;
    use crate::fixtures::{self, Bag, Leaf, Link, Parent};

    #[test]
    fn reads_a_single_leaf() {
        let (bytes, _) = fixtures::encode(&Leaf::new(42), WriterConfig::default());
        let registry = fixtures::registry();
        let mut reader = GraphReader::new(Cursor::new(bytes), &registry).unwrap();
        assert_eq!(reader.shared_count(), 0);
        assert_eq!(reader.read_root_as::<Leaf>().unwrap(), Leaf::new(42));
    }

    #[test]
    fn opening_does_not_decode_shared_objects() {
        let leaf = SavableRef::new(Leaf::new(1));
        let (bytes, _) = fixtures::encode(&Parent::new("p", Some(leaf)), WriterConfig::default());
        let registry = fixtures::registry();
        let mut reader = GraphReader::new(Cursor::new(bytes), &registry).unwrap();
        assert_eq!(reader.shared_count(), 1);
        assert_eq!(reader.resolved_count(), 0);
        reader.read_root().unwrap();
        assert_eq!(reader.resolved_count(), 1);
    }

    #[test]
    fn repeated_indices_yield_one_handle() {
        let leaf = SavableRef::new(Leaf::new(9));
        let bag = Bag::shared(vec![leaf.clone(), leaf.clone(), leaf]);
        let (bytes, summary) = fixtures::encode(&bag, WriterConfig::default());
        assert_eq!(summary.shared_objects, 1);

        let registry = fixtures::registry();
        let mut reader = GraphReader::new(Cursor::new(bytes), &registry).unwrap();
        let bag = reader.read_root_as::<Bag>().unwrap();
        assert_eq!(bag.items.len(), 3);
        assert!(bag.items[0].ptr_eq(&bag.items[1]));
        assert!(bag.items[1].ptr_eq(&bag.items[2]));
    }

    #[test]
    fn unknown_type_is_reported() {
        let (bytes, _) = fixtures::encode(&Leaf::new(1), WriterConfig::default());
        let registry = TypeRegistry::new();
        let mut reader = GraphReader::new(Cursor::new(bytes), &registry).unwrap();
        let err = reader.read_root().err().unwrap();
        assert!(matches!(err, GraphError::UnknownType(key) if key == TypeKey::of("sprk.test.Leaf")));
    }

    #[test]
    fn null_root_is_missing() {
        let header = Header::plain(ReferenceMode::AllShared, 4, 4);
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&[0; 8]);
        let registry = fixtures::registry();
        let mut reader = GraphReader::new(Cursor::new(bytes), &registry).unwrap();
        assert!(matches!(reader.read_root(), Err(GraphError::MissingRoot)));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let leaf = SavableRef::new(Leaf::new(1));
        let (mut bytes, summary) = fixtures::encode(&Link::shared("l", Some(leaf)), WriterConfig::default());
        // The root's last field is the shared index.
        let at = bytes.len() - 4;
        bytes[at..].copy_from_slice(&5i32.to_le_bytes());
        assert_eq!(summary.shared_objects, 1);

        let registry = fixtures::registry();
        let mut reader = GraphReader::new(Cursor::new(bytes), &registry).unwrap();
        assert!(matches!(
            reader.read_root(),
            Err(GraphError::SharedIndexOutOfBounds { index: 5, count: 1 })
        ));
    }

    #[test]
    fn corrupt_array_marker_is_reported_with_offset() {
        let bag = Bag::shared(Vec::new());
        let (mut bytes, summary) = fixtures::encode(&bag, WriterConfig::default());
        let primary = 32 + summary.header.shared_size as usize;
        // Key, then the shared-array marker.
        bytes[primary + 4] = 7;

        let registry = fixtures::registry();
        let mut reader = GraphReader::new(Cursor::new(bytes), &registry).unwrap();
        match reader.read_root().err() {
            Some(GraphError::InvalidMarker { marker: 7, offset }) => {
                assert_eq!(offset, primary as u64 + 4)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truncated_primary_block_is_reported() {
        let (mut bytes, _) = fixtures::encode(&Leaf::new(1), WriterConfig::default());
        bytes.truncate(bytes.len() - 2);
        let registry = fixtures::registry();
        let mut reader = GraphReader::new(Cursor::new(bytes), &registry).unwrap();
        assert!(matches!(reader.read_root(), Err(GraphError::Truncated { .. })));
    }

    #[test]
    fn shared_size_mismatch_is_corrupt() {
        let leaf = SavableRef::new(Leaf::new(1));
        let (mut bytes, _) = fixtures::encode(&Link::shared("l", Some(leaf)), WriterConfig::default());
        // Shared block: count(4) then the first entry's size(8). Shrink the
        // declared size and pad the body so the table still parses.
        let size_at = 32 + 4;
        bytes[size_at..size_at + 8].copy_from_slice(&4u64.to_le_bytes());
        let body_end = size_at + 8 + 8;
        bytes.drain(body_end - 4..body_end);
        let shared_size = 4 + 8 + 4u64;
        bytes[8..16].copy_from_slice(&shared_size.to_le_bytes());

        let registry = fixtures::registry();
        let mut reader = GraphReader::new(Cursor::new(bytes), &registry).unwrap();
        assert!(reader.read_root().is_err());
        assert_eq!(reader.resolved_count(), 0);
    }

    #[test]
    fn finish_skips_past_the_graph() {
        let (mut bytes, _) = fixtures::encode(&Leaf::new(1), WriterConfig::compressed());
        let len = bytes.len() as u64;
        bytes.extend_from_slice(b"tail");

        let registry = fixtures::registry();
        let mut cursor = Cursor::new(bytes);
        let reader = GraphReader::new(&mut cursor, &registry).unwrap();
        reader.finish().unwrap();
        assert_eq!(cursor.position(), len);
    }
}
