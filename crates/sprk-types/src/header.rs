use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// Magic marker at the start of every graph.
pub const MAGIC: [u8; 4] = *b"SPRK";

/// The only format version this implementation reads or writes.
pub const FORMAT_VERSION: u16 = 1;

/// Encoded size of [`Header`] in bytes.
pub const HEADER_LEN: usize = 32;

/// How shared and external edges were routed when a graph was written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceMode {
    /// Every reference is stored in the shared block; external edges degraded.
    AllShared,
    /// Every reference, shared or external, was offered to the external handler.
    AllExternal,
    /// Each edge is stored the way it was declared.
    #[default]
    Mixed,
}

impl ReferenceMode {
    /// Wire byte for this mode.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::AllShared => 0,
            Self::AllExternal => 1,
            Self::Mixed => 2,
        }
    }

    /// Parse a wire byte.
    pub fn from_byte(byte: u8) -> Result<Self, FormatError> {
        match byte {
            0 => Ok(Self::AllShared),
            1 => Ok(Self::AllExternal),
            2 => Ok(Self::Mixed),
            other => Err(FormatError::InvalidReferenceMode(other)),
        }
    }
}

impl fmt::Display for ReferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AllShared => "all-shared",
            Self::AllExternal => "all-external",
            Self::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// Fixed-size header written in front of every graph.
///
/// Layout (little-endian):
/// ```text
/// [4 bytes: magic "SPRK"]
/// [2 bytes: format version]
/// [1 byte : reference mode]
/// [1 byte : compression flag]
/// [8 bytes: shared-block size]
/// [8 bytes: primary-block size]
/// [8 bytes: compressed-total size, 0 when uncompressed]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u16,
    pub mode: ReferenceMode,
    pub compressed: bool,
    pub shared_size: u64,
    pub primary_size: u64,
    pub compressed_size: u64,
}

impl Header {
    /// Header for an uncompressed payload.
    pub fn plain(mode: ReferenceMode, shared_size: u64, primary_size: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            mode,
            compressed: false,
            shared_size,
            primary_size,
            compressed_size: 0,
        }
    }

    /// Header for a payload compressed into `compressed_size` bytes.
    pub fn compressed(
        mode: ReferenceMode,
        shared_size: u64,
        primary_size: u64,
        compressed_size: u64,
    ) -> Self {
        Self {
            compressed: true,
            compressed_size,
            ..Self::plain(mode, shared_size, primary_size)
        }
    }

    /// Uncompressed size of shared + primary blocks.
    pub fn uncompressed_len(&self) -> u64 {
        self.shared_size.saturating_add(self.primary_size)
    }

    /// Number of bytes following the header on disk.
    pub fn payload_len(&self) -> u64 {
        if self.compressed {
            self.compressed_size
        } else {
            self.uncompressed_len()
        }
    }

    /// Serialize to the fixed wire layout.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6] = self.mode.to_byte();
        buf[7] = u8::from(self.compressed);
        buf[8..16].copy_from_slice(&self.shared_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.primary_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf
    }

    /// Parse and validate the fixed wire layout.
    ///
    /// Magic and version must match exactly; nothing is guessed.
    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> Result<Self, FormatError> {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if magic != MAGIC {
            return Err(FormatError::InvalidMagic {
                expected: MAGIC,
                actual: magic,
            });
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion {
                expected: FORMAT_VERSION,
                actual: version,
            });
        }

        let mode = ReferenceMode::from_byte(buf[6])?;
        let compressed = match buf[7] {
            0 => false,
            1 => true,
            value => {
                return Err(FormatError::InvalidFlag {
                    field: "compression",
                    value,
                })
            }
        };

        let shared_size = read_u64(buf, 8);
        let primary_size = read_u64(buf, 16);
        let compressed_size = read_u64(buf, 24);

        if !compressed && compressed_size != 0 {
            return Err(FormatError::Inconsistent(format!(
                "uncompressed graph declares compressed size {compressed_size}"
            )));
        }
        if shared_size.checked_add(primary_size).is_none() {
            return Err(FormatError::Inconsistent("block sizes overflow".into()));
        }

        Ok(Self {
            version,
            mode,
            compressed,
            shared_size,
            primary_size,
            compressed_size,
        })
    }
}

fn read_u64(buf: &[u8; HEADER_LEN], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}
