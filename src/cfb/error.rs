//! Error type shared by the storage engine and the property-set decoder.

use crate::common::binary::BinaryError;
use thiserror::Error;

/// Result type alias for compound file operations
pub type Result<T> = std::result::Result<T, CfbError>;

/// Everything that can go wrong while reading a compound file.
///
/// Failures during [`CfbFile::open`](crate::cfb::CfbFile::open) are always
/// surfaced; the reader never half-constructs itself over a corrupt file.
#[derive(Error, Debug)]
pub enum CfbError {
    /// Underlying read failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Header magic does not match either accepted signature
    #[error("not a compound file: bad signature")]
    BadSignature,

    /// Major version outside {3, 4}
    #[error("unsupported major version {0}")]
    UnsupportedVersion(u16),

    /// Byte-order marker is not little-endian (0xFFFE)
    #[error("bad byte-order marker {0:#06X}")]
    BadByteOrder(u16),

    /// Sector or mini-sector shift outside the legal set
    #[error("bad sector shift: sector {sector}, mini {mini}")]
    BadSectorShift { sector: u16, mini: u16 },

    /// FAT ended before the header's declared sector count
    #[error("FAT truncated: header declares {expected} sectors, found {found}")]
    TruncatedFat { expected: u32, found: u32 },

    /// Mini-FAT chain ended before the header's declared sector count
    #[error("mini-FAT truncated: header declares {expected} sectors, found {found}")]
    TruncatedMiniFat { expected: u32, found: u32 },

    /// DIFAT chain length disagrees with the header's declared sector count
    #[error("DIFAT chain ended after {found} of {expected} sectors")]
    TruncatedDifat { expected: u32, found: u32 },

    /// A sector number or byte offset fell outside its table or stream
    #[error("offset {offset:#X} out of range (limit {limit:#X})")]
    OutOfRange { offset: u64, limit: u64 },

    /// A reserved sector value other than ENDOFCHAIN appeared inside a chain
    #[error("reserved sector value {0:#010X} inside a stream chain")]
    UnexpectedTerminator(u32),

    /// A sector chain revisited a sector
    #[error("sector chain cycles back to sector {0:#010X}")]
    Cycle(u32),

    /// Directory entry fields are inconsistent
    #[error("malformed directory: {0}")]
    MalformedDirectory(String),

    /// Named entry absent
    #[error("entry not found")]
    NotFound,

    /// Path component resolved to something other than a storage
    #[error("entry is not a storage")]
    NotAStorage,

    /// Entry opened as a stream is not one
    #[error("entry is not a stream")]
    NotAStream,

    /// Property offset or length escaped its section
    #[error("malformed property set: {0}")]
    MalformedPropertySet(String),
}

impl From<BinaryError> for CfbError {
    fn from(err: BinaryError) -> Self {
        CfbError::MalformedPropertySet(err.to_string())
    }
}
