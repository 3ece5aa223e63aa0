//! Parsing and validation of the fixed 512-byte compound file header.

use super::consts::*;
use super::error::{CfbError, Result};
use crate::common::Guid;
use zerocopy::{FromBytes, LE, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// On-disk header layout (512 bytes at file offset 0).
#[derive(DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    /// Signature, one of two accepted magic values
    signature: [u8; 8],
    /// Class identifier, ignored by readers
    clsid: [u8; 16],
    /// Minor version
    minor_version: U16<LE>,
    /// Major version (3 or 4)
    major_version: U16<LE>,
    /// Byte-order marker, must be 0xFFFE
    byte_order: U16<LE>,
    /// Sector size as a power of two (9 or 12)
    sector_shift: U16<LE>,
    /// Mini-sector size as a power of two (always 6)
    mini_sector_shift: U16<LE>,
    _reserved: [u8; 6],
    /// Directory sector count (written as 0 by v3 writers)
    num_dir_sectors: U32<LE>,
    /// FAT sector count
    num_fat_sectors: U32<LE>,
    /// First sector of the directory stream
    first_dir_sector: U32<LE>,
    /// Transaction signature, reserved for writers and ignored here
    _transaction_signature: U32<LE>,
    /// Streams strictly smaller than this use the mini-FAT
    mini_stream_cutoff: U32<LE>,
    /// First sector of the mini-FAT chain
    first_minifat_sector: U32<LE>,
    /// Mini-FAT sector count
    num_minifat_sectors: U32<LE>,
    /// First DIFAT sector beyond the 109 embedded entries
    first_difat_sector: U32<LE>,
    /// DIFAT sector count
    num_difat_sectors: U32<LE>,
    /// First 109 FAT sector numbers
    difat: [U32<LE>; HEADER_DIFAT_ENTRIES],
}

/// Validated compound file header.
#[derive(Debug, Clone)]
pub struct Header {
    /// Class identifier of the whole file, surfaced but not interpreted
    pub clsid: Guid,
    /// Minor format version, recorded but not interpreted
    pub minor_version: u16,
    /// Major format version, 3 or 4
    pub major_version: u16,
    /// Sector size in bytes (512 for v3, 4096 for v4)
    pub sector_size: usize,
    /// Mini-sector size in bytes (64)
    pub mini_sector_size: usize,
    /// Directory sector count; version 3 writers leave it zero
    pub num_dir_sectors: u32,
    /// FAT sector count
    pub num_fat_sectors: u32,
    /// First sector of the directory stream
    pub first_dir_sector: u32,
    /// Streams strictly smaller than this use the mini-FAT
    pub mini_stream_cutoff: u32,
    /// First sector of the mini-FAT chain
    pub first_minifat_sector: u32,
    /// Mini-FAT sector count
    pub num_minifat_sectors: u32,
    /// First DIFAT sector beyond the embedded entries
    pub first_difat_sector: u32,
    /// DIFAT sector count
    pub num_difat_sectors: u32,
    /// The 109 FAT sector numbers embedded in the header
    pub(crate) difat_head: [u32; HEADER_DIFAT_ENTRIES],
}

impl Header {
    /// Parse and validate the fixed header.
    ///
    /// Rejects anything that is not a little-endian compound file with a
    /// legal sector geometry; nothing else in the file is touched yet.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let raw = RawHeader::read_from_bytes(bytes.as_slice())
            .map_err(|_| CfbError::BadSignature)?;

        if &raw.signature != MAGIC && &raw.signature != MAGIC_BETA {
            return Err(CfbError::BadSignature);
        }

        let byte_order = raw.byte_order.get();
        if byte_order != 0xFFFE {
            return Err(CfbError::BadByteOrder(byte_order));
        }

        let major_version = raw.major_version.get();
        if major_version != 3 && major_version != 4 {
            return Err(CfbError::UnsupportedVersion(major_version));
        }

        let sector_shift = raw.sector_shift.get();
        let mini_sector_shift = raw.mini_sector_shift.get();
        let shift_error = CfbError::BadSectorShift {
            sector: sector_shift,
            mini: mini_sector_shift,
        };
        if mini_sector_shift != MINI_SECTOR_SHIFT {
            return Err(shift_error);
        }
        // The shift is tied to the major version; a v3 file with 4096-byte
        // sectors is malformed even though both values are legal in isolation.
        match (major_version, sector_shift) {
            (3, SECTOR_SHIFT_V3) | (4, SECTOR_SHIFT_V4) => {},
            _ => return Err(shift_error),
        }

        let mut difat_head = [FREESECT; HEADER_DIFAT_ENTRIES];
        for (dst, src) in difat_head.iter_mut().zip(raw.difat.iter()) {
            *dst = src.get();
        }

        Ok(Header {
            clsid: Guid::from_bytes(raw.clsid),
            minor_version: raw.minor_version.get(),
            major_version,
            sector_size: 1usize << sector_shift,
            mini_sector_size: 1usize << mini_sector_shift,
            num_dir_sectors: raw.num_dir_sectors.get(),
            num_fat_sectors: raw.num_fat_sectors.get(),
            first_dir_sector: raw.first_dir_sector.get(),
            mini_stream_cutoff: raw.mini_stream_cutoff.get(),
            first_minifat_sector: raw.first_minifat_sector.get(),
            num_minifat_sectors: raw.num_minifat_sectors.get(),
            first_difat_sector: raw.first_difat_sector.get(),
            num_difat_sectors: raw.num_difat_sectors.get(),
            difat_head,
        })
    }

    /// Absolute file offset of a regular sector.
    ///
    /// Sector 0 begins immediately after the 512-byte header, so the mapping
    /// is `(sect + 1) * sector_size` for v3. For v4 the header still occupies
    /// one full 4096-byte sector slot, so the same formula holds.
    #[inline]
    pub(crate) fn sector_offset(&self, sect: u32) -> u64 {
        (u64::from(sect) + 1) * self.sector_size as u64
    }

    /// Number of SECT entries a single FAT or mini-FAT sector holds.
    #[inline]
    pub(crate) fn entries_per_sector(&self) -> usize {
        self.sector_size / 4
    }
}

/// Check whether a byte slice starts with a compound file signature.
///
/// Accepts both the release magic and the legacy beta magic. This only sniffs
/// the first 8 bytes; [`CfbFile::open`](super::CfbFile::open) performs full
/// validation.
pub fn is_cfb(data: &[u8]) -> bool {
    data.len() >= 8 && (&data[..8] == MAGIC || &data[..8] == MAGIC_BETA)
}
