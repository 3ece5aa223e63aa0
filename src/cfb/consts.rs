//! Constants for the compound file storage layout.

/// Magic bytes at the start of every compound file
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Legacy beta signature emitted by pre-release writers; still accepted
pub const MAGIC_BETA: &[u8; 8] = b"\x0E\x11\xFC\x0D\xD0\xCF\x11\xE0";

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 512;

/// Number of DIFAT entries embedded in the header
pub const HEADER_DIFAT_ENTRIES: usize = 109;

/// Size of a directory entry in bytes
pub const DIRENTRY_SIZE: usize = 128;

/// Maximum byte length of a directory entry name, terminator included
pub const MAX_NAME_BYTES: u16 = 64;

// Sector numbers (SECTs) at or above MAXREGSECT are reserved sentinels.
/// Maximum regular sector number
pub const MAXREGSECT: u32 = 0xFFFFFFFA;
/// Sector holds DIFAT entries
pub const DIFSECT: u32 = 0xFFFFFFFC;
/// Sector holds FAT entries
pub const FATSECT: u32 = 0xFFFFFFFD;
/// End of a sector chain
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE;
/// Unallocated sector
pub const FREESECT: u32 = 0xFFFFFFFF;

// Stream identifiers (SIDs) index the directory entry array.
/// Maximum regular stream identifier
pub const MAXREGSID: u32 = 0xFFFFFFFA;
/// Absent sibling or child pointer
pub const NOSTREAM: u32 = 0xFFFFFFFF;

// Directory entry object types.
/// Unallocated directory entry
pub const STGTY_INVALID: u8 = 0;
/// Storage object (holds children, no bytes)
pub const STGTY_STORAGE: u8 = 1;
/// Stream object (holds bytes, no children)
pub const STGTY_STREAM: u8 = 2;
/// Root storage, always at SID 0
pub const STGTY_ROOT: u8 = 5;

/// Sector shift accepted for major version 3 (512-byte sectors)
pub const SECTOR_SHIFT_V3: u16 = 9;
/// Sector shift accepted for major version 4 (4096-byte sectors)
pub const SECTOR_SHIFT_V4: u16 = 12;
/// The only mini-sector shift the format defines (64-byte mini sectors)
pub const MINI_SECTOR_SHIFT: u16 = 6;
