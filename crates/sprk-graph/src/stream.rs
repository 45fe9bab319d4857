//! Header parsing and the working stream decoding runs against.
//!
//! Uncompressed graphs are decoded straight from the caller's stream.
//! Compressed graphs are inflated once into memory and decoded from there.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use sprk_types::{Header, HEADER_LEN};
use tracing::debug;

use crate::codec::{self, prealloc};
use crate::error::{GraphError, GraphResult};

/// Object-safe `Read + Seek`.
pub(crate) trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Positions of one graph's blocks.
///
/// `graph_start` is in the caller's stream; `shared_start` and
/// `primary_start` are in the working stream.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Layout {
    pub header: Header,
    pub graph_start: u64,
    pub shared_start: u64,
    pub primary_start: u64,
}

impl Layout {
    /// First byte after this graph in the caller's stream.
    pub fn graph_end(&self) -> u64 {
        self.graph_start + HEADER_LEN as u64 + self.header.payload_len()
    }

    pub fn primary_end(&self) -> u64 {
        self.primary_start + self.header.primary_size
    }
}

/// The caller's stream, or the inflated payload of a compressed graph.
pub(crate) struct Source<'a> {
    pub raw: Box<dyn ReadSeek + 'a>,
    inflated: Option<Cursor<Vec<u8>>>,
}

impl<'a> Source<'a> {
    /// Read the header at the current position and prepare the working stream.
    ///
    /// On return the working stream is positioned at the start of the shared
    /// block.
    pub fn open(mut raw: Box<dyn ReadSeek + 'a>) -> GraphResult<(Self, Layout)> {
        let graph_start = raw.stream_position()?;
        let mut buf = [0u8; HEADER_LEN];
        codec::read_exact(&mut raw, &mut buf, "header")?;
        let header = Header::from_bytes(&buf)?;

        if !header.compressed {
            let shared_start = graph_start + HEADER_LEN as u64;
            let layout = Layout {
                header,
                graph_start,
                shared_start,
                primary_start: shared_start + header.shared_size,
            };
            return Ok((Self { raw, inflated: None }, layout));
        }

        let payload = inflate(&mut *raw, &header, graph_start + HEADER_LEN as u64)?;
        debug!(
            compressed = header.compressed_size,
            inflated = payload.len(),
            "inflated graph payload"
        );
        let layout = Layout {
            header,
            graph_start,
            shared_start: 0,
            primary_start: header.shared_size,
        };
        Ok((
            Self {
                raw,
                inflated: Some(Cursor::new(payload)),
            },
            layout,
        ))
    }
}

/// Read exactly `compressed_size` bytes and decode them to exactly
/// `shared_size + primary_size` bytes.
fn inflate(raw: &mut dyn ReadSeek, header: &Header, payload_start: u64) -> GraphResult<Vec<u8>> {
    let mut compressed = Vec::with_capacity(prealloc(header.compressed_size));
    let read = (&mut *raw).take(header.compressed_size).read_to_end(&mut compressed)?;
    if read as u64 != header.compressed_size {
        return Err(GraphError::Truncated {
            field: "compressed payload",
        });
    }

    let expected = header.uncompressed_len();
    let mut decoder = zstd::stream::Decoder::new(compressed.as_slice())
        .map_err(|e| GraphError::DecompressionFailed(e.to_string()))?;
    let mut payload = Vec::with_capacity(prealloc(expected));
    (&mut decoder)
        .take(expected.saturating_add(1))
        .read_to_end(&mut payload)
        .map_err(|e| GraphError::DecompressionFailed(e.to_string()))?;

    if payload.len() as u64 != expected {
        return Err(GraphError::CorruptEntry {
            offset: payload_start,
            reason: format!(
                "payload inflated to {} bytes, header declares {expected}",
                payload.len()
            ),
        });
    }
    Ok(payload)
}

impl Read for Source<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inflated {
            Some(cursor) => cursor.read(buf),
            None => self.raw.read(buf),
        }
    }
}

impl Seek for Source<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.inflated {
            Some(cursor) => cursor.seek(pos),
            None => self.raw.seek(pos),
        }
    }
}
