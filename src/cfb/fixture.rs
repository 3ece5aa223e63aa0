//! Test support: builds compound file images in memory.
//!
//! A deliberately small writer used only to exercise the reader. It emits
//! version 3 images with 512-byte sectors: FAT sectors first, then the
//! directory, mini-FAT, mini stream and stream data. `interleaved` scatters
//! data sectors so chains are non-contiguous, which is what real allocators
//! produce after churn.

use super::consts::*;
use super::directory::cmp_names;
use crate::common::Guid;

const SECTOR: usize = 512;
const MINI: usize = 64;
const WORDS: usize = SECTOR / 4;

#[derive(Clone)]
enum Node {
    Storage,
    Stream(Vec<u8>),
}

#[derive(Clone)]
struct Decl {
    path: Vec<String>,
    node: Node,
}

/// Builder for a synthetic compound file.
pub(crate) struct Fixture {
    cutoff: u32,
    interleave: bool,
    decls: Vec<Decl>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Fixture {
            cutoff: 4096,
            interleave: false,
            decls: Vec::new(),
        }
    }

    /// Scatter data sectors: even region slots are handed out before odd
    /// ones, so consecutive logical blocks are never adjacent on disk.
    pub(crate) fn interleaved(mut self) -> Self {
        self.interleave = true;
        self
    }

    pub(crate) fn storage(mut self, path: &[&str]) -> Self {
        self.decls.push(Decl {
            path: path.iter().map(|s| s.to_string()).collect(),
            node: Node::Storage,
        });
        self
    }

    pub(crate) fn stream(mut self, path: &[&str], data: &[u8]) -> Self {
        self.decls.push(Decl {
            path: path.iter().map(|s| s.to_string()).collect(),
            node: Node::Stream(data.to_vec()),
        });
        self
    }

    /// Serialize the image. Entries get SIDs in declaration order, root
    /// first; sibling trees are balanced BSTs under the format ordering.
    pub(crate) fn build(self) -> Vec<u8> {
        let num_entries = self.decls.len() + 1;

        // Mini stream assembly: streams under the cutoff, each padded to a
        // whole mini sector, chained consecutively in the mini-FAT.
        let mut ministream: Vec<u8> = Vec::new();
        let mut minifat: Vec<u32> = Vec::new();
        let mut mini_start: Vec<Option<u32>> = vec![None; self.decls.len()];
        for (i, decl) in self.decls.iter().enumerate() {
            let Node::Stream(data) = &decl.node else {
                continue;
            };
            if data.is_empty() || data.len() as u32 >= self.cutoff {
                continue;
            }
            let blocks = data.len().div_ceil(MINI);
            mini_start[i] = Some(minifat.len() as u32);
            for b in 0..blocks {
                let last = b + 1 == blocks;
                minifat.push(if last {
                    ENDOFCHAIN
                } else {
                    minifat.len() as u32 + 1
                });
            }
            ministream.extend_from_slice(data);
            while ministream.len() % MINI != 0 {
                ministream.push(0);
            }
        }

        let dir_sectors = num_entries.div_ceil(SECTOR / DIRENTRY_SIZE);
        let minifat_sectors = minifat.len().div_ceil(WORDS);
        let carrier_sectors = ministream.len().div_ceil(SECTOR);
        let big_blocks: Vec<usize> = self
            .decls
            .iter()
            .map(|decl| match &decl.node {
                Node::Stream(data) if data.len() as u32 >= self.cutoff => {
                    data.len().div_ceil(SECTOR)
                },
                _ => 0,
            })
            .collect();
        let data_sectors: usize = big_blocks.iter().sum();

        // FAT sector count: the FAT must also cover its own sectors.
        let mut fat_sectors = 1usize;
        let total = loop {
            let total =
                fat_sectors + dir_sectors + minifat_sectors + carrier_sectors + data_sectors;
            if fat_sectors * WORDS >= total {
                break total;
            }
            fat_sectors += 1;
        };
        assert!(fat_sectors <= HEADER_DIFAT_ENTRIES, "fixture too large");

        let dir_first = fat_sectors as u32;
        let minifat_first = dir_first + dir_sectors as u32;
        let carrier_first = minifat_first + minifat_sectors as u32;
        let data_first = carrier_first + carrier_sectors as u32;

        // Data region slot order; interleaving hands out evens then odds.
        let mut slots: Vec<u32> = (0..data_sectors as u32).map(|i| data_first + i).collect();
        if self.interleave {
            let (evens, odds): (Vec<u32>, Vec<u32>) = slots
                .iter()
                .copied()
                .partition(|&s| (s - data_first) % 2 == 0);
            slots = evens.into_iter().chain(odds).collect();
        }

        // Assign slots to big streams in declaration order.
        let mut fat = vec![FREESECT; fat_sectors * WORDS];
        for s in 0..fat_sectors {
            fat[s] = FATSECT;
        }
        let chain_sequential = |first: u32, count: usize, fat: &mut Vec<u32>| {
            for i in 0..count {
                let at = first as usize + i;
                fat[at] = if i + 1 == count {
                    ENDOFCHAIN
                } else {
                    first + i as u32 + 1
                };
            }
        };
        chain_sequential(dir_first, dir_sectors, &mut fat);
        chain_sequential(minifat_first, minifat_sectors, &mut fat);
        chain_sequential(carrier_first, carrier_sectors, &mut fat);

        let mut slot_cursor = 0usize;
        let mut big_start: Vec<Option<u32>> = vec![None; self.decls.len()];
        let mut placement: Vec<(u32, usize, usize)> = Vec::new(); // (sector, decl, block)
        for (i, &blocks) in big_blocks.iter().enumerate() {
            if blocks == 0 {
                continue;
            }
            let mine = &slots[slot_cursor..slot_cursor + blocks];
            slot_cursor += blocks;
            big_start[i] = Some(mine[0]);
            for (b, &sect) in mine.iter().enumerate() {
                let next = mine.get(b + 1).copied().unwrap_or(ENDOFCHAIN);
                fat[sect as usize] = next;
                placement.push((sect, i, b));
            }
        }

        let entries = self.directory_entries(&mini_start, &big_start, carrier_first, carrier_sectors, ministream.len());

        // Assemble the image.
        let mut bytes = header_bytes(
            fat_sectors as u32,
            dir_first,
            self.cutoff,
            if minifat_sectors > 0 {
                minifat_first
            } else {
                ENDOFCHAIN
            },
            minifat_sectors as u32,
        );
        bytes.resize(HEADER_SIZE + total * SECTOR, 0);

        let sector_at = |sect: u32| HEADER_SIZE + sect as usize * SECTOR;
        for (i, word) in fat.iter().enumerate() {
            let at = HEADER_SIZE + i * 4;
            bytes[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }
        for (i, entry) in entries.iter().enumerate() {
            let at = sector_at(dir_first) + i * DIRENTRY_SIZE;
            bytes[at..at + DIRENTRY_SIZE].copy_from_slice(entry);
        }
        // Pad the directory with unallocated entries.
        for i in entries.len()..dir_sectors * (SECTOR / DIRENTRY_SIZE) {
            let at = sector_at(dir_first) + i * DIRENTRY_SIZE;
            bytes[at..at + DIRENTRY_SIZE].copy_from_slice(&free_entry());
        }
        for (i, word) in minifat.iter().enumerate() {
            let at = sector_at(minifat_first) + i * 4;
            bytes[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }
        for i in minifat.len()..minifat_sectors * WORDS {
            let at = sector_at(minifat_first) + i * 4;
            bytes[at..at + 4].copy_from_slice(&FREESECT.to_le_bytes());
        }
        let at = sector_at(carrier_first);
        bytes[at..at + ministream.len()].copy_from_slice(&ministream);
        for (sect, decl, block) in placement {
            let Node::Stream(data) = &self.decls[decl].node else {
                unreachable!()
            };
            let chunk = &data[block * SECTOR..data.len().min((block + 1) * SECTOR)];
            let at = sector_at(sect);
            bytes[at..at + chunk.len()].copy_from_slice(chunk);
        }

        bytes
    }

    fn directory_entries(
        &self,
        mini_start: &[Option<u32>],
        big_start: &[Option<u32>],
        carrier_first: u32,
        carrier_sectors: usize,
        ministream_len: usize,
    ) -> Vec<[u8; DIRENTRY_SIZE]> {
        // Children per parent path, as SIDs (declaration index + 1).
        let mut sibling: Vec<(u32, u32, u32)> = vec![(NOSTREAM, NOSTREAM, NOSTREAM); self.decls.len() + 1];
        let parents: Vec<Vec<String>> = self
            .decls
            .iter()
            .map(|decl| decl.path[..decl.path.len() - 1].to_vec())
            .collect();
        let mut storages: Vec<(Vec<String>, u32)> = vec![(Vec::new(), 0)];
        for (i, decl) in self.decls.iter().enumerate() {
            if matches!(decl.node, Node::Storage) {
                storages.push((decl.path.clone(), i as u32 + 1));
            }
        }
        for (path, sid) in &storages {
            let mut kids: Vec<u32> = parents
                .iter()
                .enumerate()
                .filter(|(_, parent)| parent == &path)
                .map(|(i, _)| i as u32 + 1)
                .collect();
            kids.sort_by(|&a, &b| {
                cmp_names(
                    self.decls[a as usize - 1].path.last().unwrap(),
                    self.decls[b as usize - 1].path.last().unwrap(),
                )
            });
            let child = build_bst(&kids, &mut sibling);
            sibling[*sid as usize].2 = child;
        }

        let mut out = Vec::with_capacity(self.decls.len() + 1);
        let (_, _, root_child) = sibling[0];
        out.push(raw_entry(
            "Root Entry",
            STGTY_ROOT,
            NOSTREAM,
            NOSTREAM,
            root_child,
            if carrier_sectors > 0 {
                carrier_first
            } else {
                ENDOFCHAIN
            },
            ministream_len as u64,
        ));
        for (i, decl) in self.decls.iter().enumerate() {
            let (left, right, child) = sibling[i + 1];
            let name = decl.path.last().unwrap();
            let entry = match &decl.node {
                Node::Storage => raw_entry(name, STGTY_STORAGE, left, right, child, ENDOFCHAIN, 0),
                Node::Stream(data) => {
                    let start = mini_start[i]
                        .or(big_start[i])
                        .unwrap_or(ENDOFCHAIN);
                    raw_entry(
                        name,
                        STGTY_STREAM,
                        left,
                        right,
                        child,
                        start,
                        data.len() as u64,
                    )
                },
            };
            out.push(entry);
        }
        out
    }
}

/// Balanced BST over `sids` (already sorted); fills left/right pointers in
/// `sibling` and returns the subtree root.
fn build_bst(sids: &[u32], sibling: &mut [(u32, u32, u32)]) -> u32 {
    if sids.is_empty() {
        return NOSTREAM;
    }
    let mid = sids.len() / 2;
    let root = sids[mid];
    let left = build_bst(&sids[..mid], sibling);
    let right = build_bst(&sids[mid + 1..], sibling);
    sibling[root as usize].0 = left;
    sibling[root as usize].1 = right;
    root
}

fn header_bytes(
    num_fat: u32,
    first_dir: u32,
    cutoff: u32,
    first_minifat: u32,
    num_minifat: u32,
) -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_SIZE];
    bytes[..8].copy_from_slice(MAGIC);
    bytes[0x18..0x1A].copy_from_slice(&0x003Eu16.to_le_bytes());
    bytes[0x1A..0x1C].copy_from_slice(&3u16.to_le_bytes());
    bytes[0x1C..0x1E].copy_from_slice(&0xFFFEu16.to_le_bytes());
    bytes[0x1E..0x20].copy_from_slice(&9u16.to_le_bytes());
    bytes[0x20..0x22].copy_from_slice(&6u16.to_le_bytes());
    bytes[0x2C..0x30].copy_from_slice(&num_fat.to_le_bytes());
    bytes[0x30..0x34].copy_from_slice(&first_dir.to_le_bytes());
    bytes[0x38..0x3C].copy_from_slice(&cutoff.to_le_bytes());
    bytes[0x3C..0x40].copy_from_slice(&first_minifat.to_le_bytes());
    bytes[0x40..0x44].copy_from_slice(&num_minifat.to_le_bytes());
    bytes[0x44..0x48].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
    // num_difat_sectors stays 0
    for i in 0..HEADER_DIFAT_ENTRIES {
        let at = 0x4C + i * 4;
        let value = if (i as u32) < num_fat { i as u32 } else { FREESECT };
        bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn raw_entry(
    name: &str,
    entry_type: u8,
    left: u32,
    right: u32,
    child: u32,
    start_sector: u32,
    size: u64,
) -> [u8; DIRENTRY_SIZE] {
    let mut bytes = [0u8; DIRENTRY_SIZE];
    let units: Vec<u16> = name.encode_utf16().collect();
    assert!(units.len() <= 31, "fixture name too long");
    for (i, unit) in units.iter().enumerate() {
        bytes[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    bytes[64..66].copy_from_slice(&((units.len() as u16 + 1) * 2).to_le_bytes());
    bytes[66] = entry_type;
    bytes[67] = 1; // black
    bytes[68..72].copy_from_slice(&left.to_le_bytes());
    bytes[72..76].copy_from_slice(&right.to_le_bytes());
    bytes[76..80].copy_from_slice(&child.to_le_bytes());
    bytes[116..120].copy_from_slice(&start_sector.to_le_bytes());
    bytes[120..128].copy_from_slice(&size.to_le_bytes());
    bytes
}

fn free_entry() -> [u8; DIRENTRY_SIZE] {
    let mut bytes = [0u8; DIRENTRY_SIZE];
    bytes[68..72].copy_from_slice(&NOSTREAM.to_le_bytes());
    bytes[72..76].copy_from_slice(&NOSTREAM.to_le_bytes());
    bytes[76..80].copy_from_slice(&NOSTREAM.to_le_bytes());
    bytes
}

/// Assemble a single-section property-set stream. `props` are `(id, tag,
/// value bytes)`; values land in table order, each padded to 4 bytes.
pub(crate) fn build_property_set(fmtid: &Guid, props: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xFFFEu16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0x0002_0005u32.to_le_bytes()); // OS version word
    out.extend_from_slice(&[0u8; 16]); // set clsid
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(fmtid.as_bytes());
    out.extend_from_slice(&48u32.to_le_bytes()); // section offset

    let mut offsets = Vec::new();
    let mut values = Vec::new();
    let table_len = 8 + props.len() * 8;
    for (_, tag, bytes) in props {
        offsets.push(table_len + values.len());
        values.extend_from_slice(&tag.to_le_bytes());
        values.extend_from_slice(bytes);
        while values.len() % 4 != 0 {
            values.push(0);
        }
    }
    out.extend_from_slice(&((table_len + values.len()) as u32).to_le_bytes());
    out.extend_from_slice(&(props.len() as u32).to_le_bytes());
    for ((id, _, _), value_offset) in props.iter().zip(&offsets) {
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&(*value_offset as u32).to_le_bytes());
    }
    out.extend_from_slice(&values);
    out
}
