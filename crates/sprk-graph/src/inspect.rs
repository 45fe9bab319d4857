//! Structural views of encoded graphs that need no type registry.

use std::io::{Read, Seek, SeekFrom, Write};

use serde::Serialize;
use sprk_types::{Header, TypeKey, HEADER_LEN};
use tracing::debug;

use crate::codec::{self, Primitive};
use crate::config::{ReaderConfig, WriterConfig};
use crate::error::{GraphError, GraphResult};
use crate::shared::SharedReadTable;
use crate::stream::Source;
use crate::writer::{self, GraphSummary};

/// One entry of the shared table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SharedEntryInfo {
    pub index: u32,
    /// Offset of the body in the uncompressed payload.
    pub offset: u64,
    pub size: u64,
    pub type_key: TypeKey,
}

/// Header, shared table, and root type of one graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphInspection {
    pub header: Header,
    /// Offset of the header in the inspected stream.
    pub graph_start: u64,
    /// Header plus payload.
    pub total_len: u64,
    pub root_type: TypeKey,
    pub shared: Vec<SharedEntryInfo>,
    /// Bytes after this graph in the inspected stream.
    pub trailing_bytes: u64,
}

/// Describe the graph at the current position of `input`.
///
/// Decodes the header, the shared table's size prefixes, and the type keys
/// in front of each body. No object is constructed. On return `input` is
/// positioned after the graph.
pub fn inspect<R: Read + Seek>(input: R) -> GraphResult<GraphInspection> {
    let (mut source, layout) = Source::open(Box::new(input))?;
    let table = SharedReadTable::parse(
        &mut source,
        layout.shared_start,
        layout.header.shared_size,
        ReaderConfig::default().max_shared_objects,
    )?;

    let mut shared = Vec::with_capacity(table.len());
    for (index, entry) in table.entries().iter().enumerate() {
        source.seek(SeekFrom::Start(entry.offset))?;
        shared.push(SharedEntryInfo {
            index: index as u32,
            offset: entry.offset - layout.shared_start,
            size: entry.size,
            type_key: TypeKey::from_raw(u32::decode(&mut source)?),
        });
    }

    if layout.header.primary_size < 4 {
        return Err(GraphError::CorruptEntry {
            offset: layout.primary_start,
            reason: format!(
                "primary block of {} bytes cannot hold a root type key",
                layout.header.primary_size
            ),
        });
    }
    source.seek(SeekFrom::Start(layout.primary_start))?;
    let root_type = TypeKey::from_raw(u32::decode(&mut source)?);

    let end = layout.graph_end();
    let stream_len = source.raw.seek(SeekFrom::End(0))?;
    if stream_len < end {
        return Err(GraphError::Truncated { field: "payload" });
    }
    source.raw.seek(SeekFrom::Start(end))?;

    Ok(GraphInspection {
        header: layout.header,
        graph_start: layout.graph_start,
        total_len: end - layout.graph_start,
        root_type,
        shared,
        trailing_bytes: stream_len - end,
    })
}

/// [`inspect`] plus the structural checks for a stream holding exactly one
/// graph.
///
/// Fails if any byte of the payload is missing or follows it, if the root or
/// any shared body is null, or if the shared sizes do not tile the shared
/// block exactly.
pub fn verify<R: Read + Seek>(input: R) -> GraphResult<GraphInspection> {
    let inspection = inspect(input)?;
    let payload_start = inspection.graph_start + HEADER_LEN as u64;
    if inspection.trailing_bytes != 0 {
        return Err(GraphError::CorruptEntry {
            offset: inspection.graph_start + inspection.total_len,
            reason: format!("{} bytes follow the graph", inspection.trailing_bytes),
        });
    }
    if inspection.root_type.is_none() {
        return Err(GraphError::MissingRoot);
    }
    if let Some(entry) = inspection.shared.iter().find(|entry| entry.type_key.is_none()) {
        return Err(GraphError::CorruptEntry {
            offset: payload_start + entry.offset,
            reason: format!("shared entry {} holds a null object", entry.index),
        });
    }
    debug!(
        shared_objects = inspection.shared.len(),
        root = %inspection.root_type,
        "graph verified"
    );
    Ok(inspection)
}

/// Re-encode the graph at the current position of `input` under `config`.
///
/// The payload is copied block-for-block; only compression changes. The
/// recorded reference mode is kept, since external references cannot be
/// rewritten without their resolver.
pub fn transcode<R: Read + Seek, W: Write>(
    input: R,
    mut output: W,
    config: &WriterConfig,
) -> GraphResult<GraphSummary> {
    config.validate()?;
    let (mut source, layout) = Source::open(Box::new(input))?;
    let header = layout.header;

    source.seek(SeekFrom::Start(layout.shared_start))?;
    let shared = read_block(&mut source, header.shared_size, "shared block")?;
    let primary = read_block(&mut source, header.primary_size, "primary block")?;

    let shared_objects = match shared.get(..4) {
        Some(count) => u32::decode(&mut &count[..])?,
        None => {
            return Err(GraphError::CorruptEntry {
                offset: layout.shared_start,
                reason: "shared block cannot hold its count".into(),
            })
        }
    };

    let header = writer::emit(&mut output, header.mode, &shared, &primary, config)?;
    debug!(
        compressed = header.compressed,
        payload = header.payload_len(),
        "graph transcoded"
    );
    Ok(GraphSummary {
        header,
        shared_objects,
    })
}

fn read_block(source: &mut Source<'_>, len: u64, field: &'static str) -> GraphResult<Vec<u8>> {
    let mut block = Vec::with_capacity(codec::prealloc(len));
    let read = source.take(len).read_to_end(&mut block)?;
    if read as u64 != len {
        return Err(GraphError::Truncated { field });
    }
    Ok(block)
}
