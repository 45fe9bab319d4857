//! Primitive wire encodings shared by the writer and the reader.
//!
//! Numbers are little-endian and fixed-width. Text and raw byte blocks carry
//! a LEB128 varint length. Nothing is aligned or padded.

use std::io::{self, Read};

use crate::error::{GraphError, GraphResult};

/// Marker byte written in front of an absent array or external reference.
pub const MARKER_ABSENT: i8 = 0;
/// Marker byte written in front of a present array or external reference.
pub const MARKER_PRESENT: i8 = 1;
/// Shared index written for a null shared reference.
pub const NULL_INDEX: i32 = -1;

/// Upper bound on speculative allocation for declared element counts.
const PREALLOC_LIMIT: usize = 4096;

/// A fixed-width value with a direct wire encoding.
pub trait Primitive: Copy + Sized {
    /// Name used in error messages.
    const NAME: &'static str;

    fn encode(self, out: &mut Vec<u8>);

    fn decode<R: Read + ?Sized>(input: &mut R) -> GraphResult<Self>;
}

macro_rules! le_primitive {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const NAME: &'static str = $name;

                fn encode(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn decode<R: Read + ?Sized>(input: &mut R) -> GraphResult<Self> {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    read_exact(input, &mut buf, $name)?;
                    Ok(<$ty>::from_le_bytes(buf))
                }
            }
        )*
    };
}

le_primitive!(
    u8 => "u8",
    i8 => "i8",
    u16 => "u16",
    i16 => "i16",
    u32 => "u32",
    i32 => "i32",
    u64 => "u64",
    i64 => "i64",
    f32 => "f32",
    f64 => "f64",
);

impl Primitive for bool {
    const NAME: &'static str = "bool";

    fn encode(self, out: &mut Vec<u8>) {
        out.push(u8::from(self));
    }

    fn decode<R: Read + ?Sized>(input: &mut R) -> GraphResult<Self> {
        match u8::decode(input)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(GraphError::Malformed {
                field: "bool",
                reason: format!("byte {other} is neither 0 nor 1"),
            }),
        }
    }
}

/// `read_exact` that reports truncation as a format error naming the field.
pub(crate) fn read_exact<R: Read + ?Sized>(
    input: &mut R,
    buf: &mut [u8],
    field: &'static str,
) -> GraphResult<()> {
    input.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            GraphError::Truncated { field }
        } else {
            GraphError::Io(e)
        }
    })
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer from a stream.
pub(crate) fn decode_varint<R: Read + ?Sized>(input: &mut R) -> GraphResult<u64> {
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = u8::decode(input).map_err(|e| match e {
            GraphError::Truncated { .. } => GraphError::Truncated { field: "varint" },
            other => other,
        })?;
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(GraphError::Malformed {
                field: "varint",
                reason: "varint overflow".into(),
            });
        }
    }
}

pub(crate) fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    encode_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Read a length-prefixed byte block without trusting the declared length
/// for allocation.
pub(crate) fn decode_bytes<R: Read + ?Sized>(
    input: &mut R,
    field: &'static str,
) -> GraphResult<Vec<u8>> {
    let len = decode_varint(input)?;
    let mut data = Vec::with_capacity(prealloc(len));
    let read = (&mut *input).take(len).read_to_end(&mut data)?;
    if read as u64 != len {
        return Err(GraphError::Truncated { field });
    }
    Ok(data)
}

pub(crate) fn encode_str(out: &mut Vec<u8>, value: &str) {
    encode_bytes(out, value.as_bytes());
}

pub(crate) fn decode_string<R: Read + ?Sized>(input: &mut R) -> GraphResult<String> {
    let bytes = decode_bytes(input, "string")?;
    String::from_utf8(bytes).map_err(|e| GraphError::Malformed {
        field: "string",
        reason: e.to_string(),
    })
}

/// Capacity to reserve for a declared element count.
pub(crate) fn prealloc(declared: u64) -> usize {
    usize::try_from(declared)
        .unwrap_or(PREALLOC_LIMIT)
        .min(PREALLOC_LIMIT)
}
