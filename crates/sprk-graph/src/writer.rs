use std::collections::HashMap;
use std::io::Write;

use sprk_types::{Header, ReferenceMode, TypeKey, HEADER_LEN};
use tracing::{debug, warn};

use crate::codec::{self, Primitive, MARKER_ABSENT, MARKER_PRESENT, NULL_INDEX};
use crate::config::WriterConfig;
use crate::cycle::CycleGuard;
use crate::error::{GraphError, GraphResult};
use crate::external::{shared_edge_form, external_edge_form, EdgeForm, ExternalHandler, WriteRouting};
use crate::savable::{identity_of, Savable, SavableRef};
use crate::shared::{SharedWriteTable, COUNT_LEN, SIZE_LEN};

/// Staging region that primitive writes currently append to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Region {
    Primary,
    Shared,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriterState {
    /// Nothing staged; `flush` is a no-op.
    Idle,
    /// A root has been written and awaits finalization.
    Accumulating,
}

/// Result of finalizing one graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphSummary {
    pub header: Header,
    pub shared_objects: u32,
}

impl GraphSummary {
    /// Bytes written to the output for this graph, header included.
    pub fn total_len(&self) -> u64 {
        HEADER_LEN as u64 + self.header.payload_len()
    }
}

/// Encodes a graph of savables into one SPRK blob.
///
/// Writes are staged in memory: direct fields go to the primary region,
/// shared bodies are queued and drained into the shared region at finalize.
/// Only then is the header written, followed by the payload, so the output
/// never needs to seek.
///
/// ```ignore
/// let mut out = Vec::new();
/// let mut writer = GraphWriter::new(&mut out);
/// writer.write_root(&scene)?;
/// let summary = writer.finish()?;
/// ```
///
/// Dropping a writer with a pending graph finalizes it; errors are then only
/// logged, so prefer [`finish`](Self::finish).
pub struct GraphWriter<'a> {
    output: Box<dyn Write + 'a>,
    config: WriterConfig,
    routing: WriteRouting<'a>,
    state: WriterState,
    region: Region,
    primary: Vec<u8>,
    shared: Vec<u8>,
    table: SharedWriteTable,
    guard: CycleGuard,
    keys: HashMap<&'static str, TypeKey>,
}

impl<'a> GraphWriter<'a> {
    /// Writer with the default configuration and no external handler.
    pub fn new(output: impl Write + 'a) -> Self {
        Self::build(Box::new(output), WriterConfig::default(), None)
    }

    pub fn with_config(output: impl Write + 'a, config: WriterConfig) -> Self {
        Self::build(Box::new(output), config, None)
    }

    /// Writer that redirects external edges through `handler`.
    pub fn with_handler(
        output: impl Write + 'a,
        config: WriterConfig,
        handler: impl ExternalHandler + 'a,
    ) -> Self {
        Self::build(Box::new(output), config, Some(Box::new(handler)))
    }

    fn build(
        output: Box<dyn Write + 'a>,
        config: WriterConfig,
        handler: Option<Box<dyn ExternalHandler + 'a>>,
    ) -> Self {
        let routing = WriteRouting::new(config.reference_mode, handler);
        if routing.mode() != config.reference_mode {
            debug!(
                requested = %config.reference_mode,
                effective = %routing.mode(),
                "no external handler; external references degrade to shared"
            );
        }
        Self {
            output,
            config,
            routing,
            state: WriterState::Idle,
            region: Region::Primary,
            primary: Vec::new(),
            shared: Vec::new(),
            table: SharedWriteTable::default(),
            guard: CycleGuard::default(),
            keys: HashMap::new(),
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Effective reference mode recorded in the header.
    pub fn reference_mode(&self) -> ReferenceMode {
        self.routing.mode()
    }

    /// Returns `true` if a root has been written but not yet flushed.
    pub fn is_pending(&self) -> bool {
        self.state == WriterState::Accumulating
    }

    // ---- Roots ----

    /// Encode `root` and everything reachable from it.
    ///
    /// On failure the staged graph is discarded and nothing reaches the
    /// output; the writer is ready for another root.
    pub fn write_root(&mut self, root: &dyn Savable) -> GraphResult<()> {
        if self.state != WriterState::Idle {
            return Err(GraphError::RootAlreadyWritten);
        }
        self.config.validate()?;
        self.reset();
        self.state = WriterState::Accumulating;

        if let Err(e) = self.write_savable(Some(root)) {
            debug!(error = %e, root = root.type_name(), "abandoning graph");
            self.reset();
            return Err(e);
        }
        Ok(())
    }

    /// [`write_root`](Self::write_root) for a root held behind a handle.
    pub fn write_root_ref(&mut self, root: &SavableRef) -> GraphResult<()> {
        let borrowed = root.try_borrow()?;
        self.write_root(&*borrowed)
    }

    // ---- Primitives ----

    pub fn write<T: Primitive>(&mut self, value: T) -> GraphResult<()> {
        value.encode(self.region_mut());
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> GraphResult<()> {
        codec::encode_str(self.region_mut(), value);
        Ok(())
    }

    /// Raw, length-prefixed byte block.
    pub fn write_bytes(&mut self, value: &[u8]) -> GraphResult<()> {
        codec::encode_bytes(self.region_mut(), value);
        Ok(())
    }

    pub fn write_array<T: Primitive>(&mut self, values: Option<&[T]>) -> GraphResult<()> {
        self.write_presence(values.map(<[T]>::len))?;
        for &value in values.unwrap_or_default() {
            self.write(value)?;
        }
        Ok(())
    }

    pub fn write_str_array(&mut self, values: Option<&[String]>) -> GraphResult<()> {
        self.write_presence(values.map(<[String]>::len))?;
        for value in values.unwrap_or_default() {
            self.write_str(value)?;
        }
        Ok(())
    }

    // ---- Direct edges ----

    /// Nested savable written inline: type key, then its fields.
    ///
    /// Direct edges are checked for cycles; a direct edge back to an object
    /// that is still being written fails with [`GraphError::Cycle`].
    pub fn write_savable(&mut self, value: Option<&dyn Savable>) -> GraphResult<()> {
        let Some(value) = value else {
            return self.write(TypeKey::NONE.raw());
        };
        let identity = identity_of(value);
        self.guard.enter(identity, value.type_name())?;
        let result = self.write_body(value);
        self.guard.leave(identity);
        result
    }

    /// Direct edge to an object held behind a handle.
    pub fn write_object(&mut self, value: Option<&SavableRef>) -> GraphResult<()> {
        match value {
            None => self.write_savable(None),
            Some(object) => {
                let borrowed = object.try_borrow()?;
                self.write_savable(Some(&*borrowed))
            }
        }
    }

    pub fn write_savable_array<T: Savable>(&mut self, values: Option<&[T]>) -> GraphResult<()> {
        self.write_presence(values.map(<[T]>::len))?;
        for value in values.unwrap_or_default() {
            self.write_savable(Some(value))?;
        }
        Ok(())
    }

    pub fn write_object_array(&mut self, values: Option<&[SavableRef]>) -> GraphResult<()> {
        self.write_presence(values.map(<[SavableRef]>::len))?;
        for value in values.unwrap_or_default() {
            self.write_object(Some(value))?;
        }
        Ok(())
    }

    // ---- Shared and external edges ----

    /// Shared edge: writes an index; the body is written once at finalize.
    pub fn write_shared(&mut self, value: Option<&SavableRef>) -> GraphResult<()> {
        match shared_edge_form(self.routing.mode()) {
            EdgeForm::Shared => self.write_shared_index(value),
            EdgeForm::External => self.write_external_form(value),
        }
    }

    pub fn write_shared_array(&mut self, values: Option<&[SavableRef]>) -> GraphResult<()> {
        self.write_presence(values.map(<[SavableRef]>::len))?;
        for value in values.unwrap_or_default() {
            self.write_shared(Some(value))?;
        }
        Ok(())
    }

    /// External edge: offered to the handler, or written as shared without one.
    pub fn write_external(&mut self, value: Option<&SavableRef>) -> GraphResult<()> {
        match external_edge_form(self.routing.mode()) {
            EdgeForm::Shared => self.write_shared_index(value),
            EdgeForm::External => self.write_external_form(value),
        }
    }

    pub fn write_external_array(&mut self, values: Option<&[SavableRef]>) -> GraphResult<()> {
        self.write_presence(values.map(<[SavableRef]>::len))?;
        for value in values.unwrap_or_default() {
            self.write_external(Some(value))?;
        }
        Ok(())
    }

    // ---- Finalize ----

    /// Finalize the pending graph and write it to the output.
    ///
    /// Returns `None` when nothing is pending, so repeated calls are safe.
    /// The writer is reset afterwards, on success or failure.
    pub fn flush(&mut self) -> GraphResult<Option<GraphSummary>> {
        if self.state == WriterState::Idle {
            return Ok(None);
        }
        let result = self.finalize();
        self.reset();
        result.map(Some)
    }

    /// Flush any pending graph and release the writer.
    pub fn finish(mut self) -> GraphResult<Option<GraphSummary>> {
        self.flush()
    }

    fn finalize(&mut self) -> GraphResult<GraphSummary> {
        self.drain()?;
        self.routing.flush()?;

        let shared_objects = u32::try_from(self.table.len()).map_err(|_| GraphError::CorruptEntry {
            offset: 0,
            reason: "shared object count exceeds u32".into(),
        })?;
        let header = emit(
            &mut self.output,
            self.routing.mode(),
            &self.shared,
            &self.primary,
            &self.config,
        )?;

        debug!(
            mode = %header.mode,
            shared_objects,
            shared_bytes = header.shared_size,
            primary_bytes = header.primary_size,
            compressed_bytes = header.compressed_size,
            "graph finalized"
        );
        Ok(GraphSummary {
            header,
            shared_objects,
        })
    }

    /// Empty the shared queue into the shared region.
    ///
    /// Bodies may enqueue further shared objects; draining continues until
    /// the queue is empty. Each body's size and the final count are
    /// backpatched into their placeholders.
    fn drain(&mut self) -> GraphResult<()> {
        self.region = Region::Shared;
        self.shared.clear();
        0u32.encode(&mut self.shared);

        while let Some(object) = self.table.next_pending() {
            let size_at = self.shared.len();
            0u64.encode(&mut self.shared);
            let start = self.shared.len();
            {
                let borrowed = object.try_borrow()?;
                self.write_savable(Some(&*borrowed))?;
            }
            let size = (self.shared.len() - start) as u64;
            self.shared[size_at..size_at + SIZE_LEN as usize].copy_from_slice(&size.to_le_bytes());
        }

        let count = self.table.len() as u32;
        self.shared[..COUNT_LEN as usize].copy_from_slice(&count.to_le_bytes());
        self.region = Region::Primary;
        debug!(count, bytes = self.shared.len(), "drained shared objects");
        Ok(())
    }

    // ---- Internals ----

    fn write_body(&mut self, value: &dyn Savable) -> GraphResult<()> {
        let key = self.key_for(value.type_name());
        self.write(key.raw())?;
        value.write(self)
    }

    fn write_shared_index(&mut self, value: Option<&SavableRef>) -> GraphResult<()> {
        let index = match value {
            None => NULL_INDEX,
            Some(object) => {
                let index = self.table.get_or_assign(object);
                i32::try_from(index).map_err(|_| GraphError::CorruptEntry {
                    offset: 0,
                    reason: format!("shared index {index} exceeds i32"),
                })?
            }
        };
        self.write(index)
    }

    fn write_external_form(&mut self, value: Option<&SavableRef>) -> GraphResult<()> {
        let Some(object) = value else {
            return self.write(MARKER_ABSENT);
        };
        let reference = match &mut self.routing {
            WriteRouting::Handler { handler, .. } => handler.process(object)?,
            WriteRouting::Shared => return self.write_shared_index(value),
        };
        match reference {
            None => self.write(MARKER_ABSENT),
            Some(reference) => {
                self.write(MARKER_PRESENT)?;
                self.write(reference.declared.raw())?;
                self.write_str(&reference.path)
            }
        }
    }

    fn write_presence(&mut self, len: Option<usize>) -> GraphResult<()> {
        match len {
            None => self.write(MARKER_ABSENT),
            Some(len) => {
                let count = u32::try_from(len).map_err(|_| GraphError::Malformed {
                    field: "array",
                    reason: format!("{len} elements exceed u32"),
                })?;
                self.write(MARKER_PRESENT)?;
                self.write(count)
            }
        }
    }

    fn key_for(&mut self, name: &'static str) -> TypeKey {
        *self.keys.entry(name).or_insert_with(|| TypeKey::of(name))
    }

    fn region_mut(&mut self) -> &mut Vec<u8> {
        match self.region {
            Region::Primary => &mut self.primary,
            Region::Shared => &mut self.shared,
        }
    }

    fn reset(&mut self) {
        self.primary.clear();
        self.shared.clear();
        self.table.reset();
        self.guard.clear();
        self.region = Region::Primary;
        self.state = WriterState::Idle;
    }
}

impl Drop for GraphWriter<'_> {
    fn drop(&mut self) {
        if self.state == WriterState::Accumulating {
            if let Err(e) = self.flush() {
                warn!(error = %e, "failed to finalize graph while dropping writer");
            }
        }
    }
}

impl std::fmt::Debug for GraphWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphWriter")
            .field("mode", &self.routing.mode())
            .field("state", &self.state)
            .field("primary_bytes", &self.primary.len())
            .field("shared_objects", &self.table.len())
            .finish()
    }
}

/// Write header and payload for already-staged blocks.
///
/// Shared by the writer and the transcoder. Compression runs one zstd stream
/// over the shared block followed by the primary block.
pub(crate) fn emit(
    output: &mut dyn Write,
    mode: ReferenceMode,
    shared: &[u8],
    primary: &[u8],
    config: &WriterConfig,
) -> GraphResult<Header> {
    let shared_size = shared.len() as u64;
    let primary_size = primary.len() as u64;

    if config.compression {
        let compressed = compress(shared, primary, config.compression_level)?;
        let header = Header::compressed(mode, shared_size, primary_size, compressed.len() as u64);
        output.write_all(&header.to_bytes())?;
        output.write_all(&compressed)?;
        output.flush()?;
        Ok(header)
    } else {
        let header = Header::plain(mode, shared_size, primary_size);
        output.write_all(&header.to_bytes())?;
        output.write_all(shared)?;
        output.write_all(primary)?;
        output.flush()?;
        Ok(header)
    }
}

fn compress(shared: &[u8], primary: &[u8], level: i32) -> GraphResult<Vec<u8>> {
    let failed = |e: std::io::Error| GraphError::CompressionFailed(e.to_string());
    let mut encoder = zstd::stream::Encoder::new(Vec::new(), level).map_err(failed)?;
    encoder.write_all(shared).map_err(failed)?;
    encoder.write_all(primary).map_err(failed)?;
    encoder.finish().map_err(failed)
}
