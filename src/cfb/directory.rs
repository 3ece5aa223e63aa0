//! The directory: a dense array of 128-byte entries linked into a tree.
//!
//! Entries are addressed by SID and stored exactly as the directory stream
//! orders them; parent/child/sibling relations are SIDs into that array, so
//! no pointer graph is ever built. Each storage's children form a binary
//! search tree threaded through the sibling pointers, keyed by the format's
//! name ordering. The red-black color bit is parsed but deliberately never
//! validated; real-world writers emit broken colors and only the BST shape
//! matters for reading.

use super::consts::*;
use super::error::{CfbError, Result};
use crate::common::Guid;
use fixedbitset::FixedBitSet;
use smallvec::SmallVec;
use std::cmp::Ordering;
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// On-disk directory entry layout (128 bytes).
#[derive(DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE, null-padded
    name: [u8; 64],
    /// Valid name length in bytes, terminator included
    name_len: U16<LE>,
    /// Object type
    entry_type: u8,
    /// Red-black color (0 = red, 1 = black), informational
    color: u8,
    /// Left sibling SID
    left: U32<LE>,
    /// Right sibling SID
    right: U32<LE>,
    /// Child SID
    child: U32<LE>,
    /// Class identifier
    clsid: [u8; 16],
    /// User state bits
    state_bits: U32<LE>,
    /// Creation FILETIME
    created: U64<LE>,
    /// Modification FILETIME
    modified: U64<LE>,
    /// First sector of the entry's stream
    start_sector: U32<LE>,
    /// Stream size; the high half is reserved under major version 3
    size: U64<LE>,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Unallocated slot
    Invalid,
    /// Storage object: holds children, no bytes
    Storage,
    /// Stream object: holds bytes, no children
    Stream,
    /// Root storage at SID 0; also locates the mini stream
    Root,
}

impl EntryKind {
    fn from_raw(value: u8) -> Option<EntryKind> {
        match value {
            STGTY_INVALID => Some(EntryKind::Invalid),
            STGTY_STORAGE => Some(EntryKind::Storage),
            STGTY_STREAM => Some(EntryKind::Stream),
            STGTY_ROOT => Some(EntryKind::Root),
            _ => None,
        }
    }
}

/// A parsed directory entry.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Index of this entry in the directory
    pub sid: u32,
    /// Decoded UTF-16LE name; control characters are preserved
    pub name: String,
    /// Object type
    pub kind: EntryKind,
    /// Red-black color bit as stored (0 = red, 1 = black)
    pub color: u8,
    /// Left sibling SID or NOSTREAM
    pub left: u32,
    /// Right sibling SID or NOSTREAM
    pub right: u32,
    /// Child SID or NOSTREAM
    pub child: u32,
    /// Class identifier
    pub clsid: Guid,
    /// User-defined state bits
    pub state_bits: u32,
    /// Creation time as a raw FILETIME
    pub created: u64,
    /// Modification time as a raw FILETIME
    pub modified: u64,
    /// First sector of the entry's stream
    pub start_sector: u32,
    /// Stream length in bytes; for the root, the mini stream length
    pub size: u64,
}

impl DirectoryEntry {
    /// Whether this entry can hold children.
    #[inline]
    pub fn is_storage(&self) -> bool {
        matches!(self.kind, EntryKind::Storage | EntryKind::Root)
    }

    /// Whether this entry holds bytes.
    #[inline]
    pub fn is_stream(&self) -> bool {
        self.kind == EntryKind::Stream
    }

    /// Whether this is the root storage.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.kind == EntryKind::Root
    }
}

/// The format's name ordering: shorter names sort first, equal lengths
/// compare UTF-16 code units pairwise with ASCII upper-case folding.
///
/// This is the key of the sibling BST and must be used verbatim for lookup;
/// it is not a locale collation.
pub(crate) fn cmp_names(a: &str, b: &str) -> Ordering {
    fn fold(unit: u16) -> u16 {
        if (u16::from(b'a')..=u16::from(b'z')).contains(&unit) {
            unit - 32
        } else {
            unit
        }
    }

    let a_units = a.encode_utf16().count();
    let b_units = b.encode_utf16().count();
    a_units
        .cmp(&b_units)
        .then_with(|| a.encode_utf16().map(fold).cmp(b.encode_utf16().map(fold)))
}

/// The directory as a dense SID-indexed array.
#[derive(Debug)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    /// Parse the directory stream into its entry array.
    ///
    /// Entry 0 must be the Root Entry. Under major version 3 the high half of
    /// every size field is reserved and masked off.
    pub(crate) fn parse(data: &[u8], major_version: u16) -> Result<Directory> {
        let count = data.len() / DIRENTRY_SIZE;
        if count == 0 {
            return Err(CfbError::MalformedDirectory(
                "directory stream holds no entries".to_string(),
            ));
        }

        let mut entries = Vec::with_capacity(count);
        for sid in 0..count {
            let at = sid * DIRENTRY_SIZE;
            let entry = parse_entry(&data[at..at + DIRENTRY_SIZE], sid as u32, major_version)?;
            entries.push(entry);
        }

        if entries[0].kind != EntryKind::Root {
            return Err(CfbError::MalformedDirectory(
                "entry 0 is not the Root Entry".to_string(),
            ));
        }

        Ok(Directory { entries })
    }

    /// The Root Entry (SID 0).
    #[inline]
    pub fn root(&self) -> &DirectoryEntry {
        &self.entries[0]
    }

    /// Entry by SID.
    #[inline]
    pub fn get(&self, sid: u32) -> Option<&DirectoryEntry> {
        self.entries.get(sid as usize)
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All entries in SID order, unallocated slots included.
    pub fn iter(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter()
    }

    /// In-order traversal of a storage's children.
    ///
    /// For a well-formed subtree this yields children sorted by the format's
    /// name ordering. Malformed sibling pointers are survived, not repaired:
    /// out-of-range SIDs end their branch and a visited bitset caps the walk
    /// at the directory length.
    pub fn children(&self, parent: &DirectoryEntry) -> Children<'_> {
        Children {
            dir: self,
            stack: SmallVec::new(),
            cursor: parent.child,
            visited: FixedBitSet::with_capacity(self.entries.len()),
        }
    }

    /// Find a child of `parent` by name using the format ordering.
    ///
    /// Descends the sibling BST, left on less and right on greater. Total
    /// descents are bounded by the directory length, so a malformed tree
    /// (including a sibling cycle) terminates with `NotFound` instead of
    /// looping or panicking.
    pub fn lookup_child(&self, parent: &DirectoryEntry, name: &str) -> Result<&DirectoryEntry> {
        let mut sid = parent.child;
        let mut descents = 0usize;
        while sid != NOSTREAM {
            descents += 1;
            if descents > self.entries.len() {
                return Err(CfbError::NotFound);
            }
            let entry = self.get(sid).ok_or(CfbError::NotFound)?;
            match cmp_names(name, &entry.name) {
                Ordering::Less => sid = entry.left,
                Ordering::Greater => sid = entry.right,
                Ordering::Equal => return Ok(entry),
            }
        }
        Err(CfbError::NotFound)
    }

    /// Resolve a path of names starting at the root.
    ///
    /// Intermediate components must be storages; the final component may be
    /// a storage or a stream. An empty path resolves to the root itself.
    pub(crate) fn resolve_path(&self, path: &[&str]) -> Result<&DirectoryEntry> {
        let mut current = self.root();
        for (depth, name) in path.iter().enumerate() {
            if !current.is_storage() {
                return Err(CfbError::NotAStorage);
            }
            current = self.lookup_child(current, name)?;
            let last = depth + 1 == path.len();
            if !last && !current.is_storage() {
                return Err(CfbError::NotAStorage);
            }
        }
        Ok(current)
    }
}

/// Iterator over a storage's children in format name order.
pub struct Children<'a> {
    dir: &'a Directory,
    stack: SmallVec<[u32; 16]>,
    cursor: u32,
    visited: FixedBitSet,
}

impl<'a> Iterator for Children<'a> {
    type Item = &'a DirectoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        // Push the left spine, then emit the top and move right. SIDs that
        // are invalid or already seen close their branch.
        loop {
            let sid = self.cursor;
            if sid == NOSTREAM {
                break;
            }
            let index = sid as usize;
            if index >= self.dir.entries.len() || self.visited.contains(index) {
                break;
            }
            self.visited.insert(index);
            self.stack.push(sid);
            self.cursor = self.dir.entries[index].left;
        }

        let sid = self.stack.pop()?;
        let entry = &self.dir.entries[sid as usize];
        self.cursor = entry.right;
        Some(entry)
    }
}

fn parse_entry(data: &[u8], sid: u32, major_version: u16) -> Result<DirectoryEntry> {
    let raw = RawDirectoryEntry::read_from_bytes(data).map_err(|_| {
        CfbError::MalformedDirectory(format!("entry {} is not 128 bytes", sid))
    })?;

    let kind = EntryKind::from_raw(raw.entry_type).ok_or_else(|| {
        CfbError::MalformedDirectory(format!(
            "entry {} has unknown type {}",
            sid, raw.entry_type
        ))
    })?;

    let name_len = raw.name_len.get();
    if name_len > MAX_NAME_BYTES || name_len % 2 != 0 {
        return Err(CfbError::MalformedDirectory(format!(
            "entry {} has name length {}",
            sid, name_len
        )));
    }
    let name = decode_name(&raw.name, name_len);

    // Major version 3 stores 32-bit sizes; the upper half of the field is
    // reserved and must be ignored, not trusted.
    let size = if major_version == 3 {
        raw.size.get() & 0xFFFF_FFFF
    } else {
        raw.size.get()
    };

    Ok(DirectoryEntry {
        sid,
        name,
        kind,
        color: raw.color,
        left: raw.left.get(),
        right: raw.right.get(),
        child: raw.child.get(),
        clsid: Guid::from_bytes(raw.clsid),
        state_bits: raw.state_bits.get(),
        created: raw.created.get(),
        modified: raw.modified.get(),
        start_sector: raw.start_sector.get(),
        size,
    })
}

/// Decode an entry name: `(name_len / 2) - 1` UTF-16LE code units, the last
/// unit being the terminator. Surrogate pairs decode to their
/// supplementary-plane character; control characters below U+0020 are kept
/// verbatim because the format uses them as semantic prefixes.
fn decode_name(name: &[u8; 64], name_len: u16) -> String {
    if name_len < 2 {
        return String::new();
    }
    let units: Vec<u16> = name[..usize::from(name_len) - 2]
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
