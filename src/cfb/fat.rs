//! Sector allocation tables and chain traversal.
//!
//! The FAT is a flat array mapping each sector to the next sector of its
//! chain; the mini-FAT plays the same role for 64-byte mini sectors inside
//! the mini stream. Both are represented by [`SectorTable`]. Reconstructing
//! the FAT is a two-phase job: the header embeds the first 109 FAT sector
//! numbers, and larger files continue the list in a chain of DIFAT sectors.

use super::consts::*;
use super::error::{CfbError, Result};
use super::header::Header;
use fixedbitset::FixedBitSet;
use std::io::{Read, Seek, SeekFrom};
use zerocopy::{FromBytes, LE, U32};

/// A sector allocation table: FAT or mini-FAT.
#[derive(Debug)]
pub(crate) struct SectorTable {
    entries: Vec<u32>,
}

impl SectorTable {
    /// An empty table; chains against it resolve only for `ENDOFCHAIN`.
    pub(crate) fn empty() -> Self {
        SectorTable {
            entries: Vec::new(),
        }
    }

    /// Number of entries (the exclusive upper bound for regular SECTs).
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Lazily walk the chain starting at `start`.
    ///
    /// The iterator yields each sector in order and terminates at the first
    /// `ENDOFCHAIN`. It fails with `Cycle` on a revisited sector, `OutOfRange`
    /// on a SECT past the table, and `UnexpectedTerminator` when a reserved
    /// value other than `ENDOFCHAIN` shows up inside the chain. A start of
    /// `ENDOFCHAIN` yields an empty chain, which is how zero-length streams
    /// are stored.
    pub(crate) fn chain(&self, start: u32) -> ChainIter<'_> {
        ChainIter {
            table: &self.entries,
            next: start,
            visited: FixedBitSet::with_capacity(self.entries.len()),
            done: false,
        }
    }

    /// Collect a whole chain, failing on the first defect.
    pub(crate) fn chain_to_vec(&self, start: u32) -> Result<Vec<u32>> {
        self.chain(start).collect()
    }

    /// Reconstruct the FAT from the header DIFAT entries and the DIFAT chain.
    pub(crate) fn load_fat<R: Read + Seek>(
        reader: &mut R,
        header: &Header,
        total_sectors: u32,
    ) -> Result<SectorTable> {
        let fat_sectors = collect_fat_sector_list(reader, header, total_sectors)?;

        if fat_sectors.len() as u32 != header.num_fat_sectors {
            return Err(CfbError::TruncatedFat {
                expected: header.num_fat_sectors,
                found: fat_sectors.len() as u32,
            });
        }

        let mut entries = Vec::with_capacity(fat_sectors.len() * header.entries_per_sector());
        let mut sector = vec![0u8; header.sector_size];
        for &sect in &fat_sectors {
            read_sector_into(reader, header, total_sectors, sect, &mut sector)?;
            append_sect_words(&sector, &mut entries);
        }

        Ok(SectorTable { entries })
    }

    /// Load the mini-FAT by walking its FAT chain.
    ///
    /// The chain must supply at least the header's declared sector count;
    /// a shorter chain is a truncation.
    pub(crate) fn load_minifat<R: Read + Seek>(
        reader: &mut R,
        header: &Header,
        fat: &SectorTable,
        total_sectors: u32,
    ) -> Result<SectorTable> {
        if header.num_minifat_sectors == 0 {
            return Ok(SectorTable::empty());
        }

        let chain = fat.chain_to_vec(header.first_minifat_sector)?;
        if (chain.len() as u32) < header.num_minifat_sectors {
            return Err(CfbError::TruncatedMiniFat {
                expected: header.num_minifat_sectors,
                found: chain.len() as u32,
            });
        }

        let declared = header.num_minifat_sectors as usize;
        let mut entries = Vec::with_capacity(declared * header.entries_per_sector());
        let mut sector = vec![0u8; header.sector_size];
        for &sect in &chain[..declared] {
            read_sector_into(reader, header, total_sectors, sect, &mut sector)?;
            append_sect_words(&sector, &mut entries);
        }

        Ok(SectorTable { entries })
    }
}

/// Lazy traversal of a sector chain with cycle detection.
pub(crate) struct ChainIter<'a> {
    table: &'a [u32],
    next: u32,
    visited: FixedBitSet,
    done: bool,
}

impl Iterator for ChainIter<'_> {
    type Item = Result<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let sect = self.next;
        if sect == ENDOFCHAIN {
            self.done = true;
            return None;
        }
        if sect > MAXREGSECT {
            // FREESECT, FATSECT or DIFSECT inside a stream chain
            self.done = true;
            return Some(Err(CfbError::UnexpectedTerminator(sect)));
        }
        let index = sect as usize;
        if index >= self.table.len() {
            self.done = true;
            return Some(Err(CfbError::OutOfRange {
                offset: u64::from(sect),
                limit: self.table.len() as u64,
            }));
        }
        if self.visited.contains(index) {
            self.done = true;
            return Some(Err(CfbError::Cycle(sect)));
        }
        self.visited.insert(index);
        self.next = self.table[index];
        Some(Ok(sect))
    }
}

/// Gather the ordered list of FAT sector numbers: 109 embedded entries,
/// then the DIFAT chain. The chain length must match the header count.
fn collect_fat_sector_list<R: Read + Seek>(
    reader: &mut R,
    header: &Header,
    total_sectors: u32,
) -> Result<Vec<u32>> {
    let mut fat_sectors = Vec::with_capacity(header.num_fat_sectors as usize);
    for &sect in header.difat_head.iter() {
        if sect == FREESECT || sect == ENDOFCHAIN {
            break;
        }
        fat_sectors.push(sect);
    }

    let mut difat_sector = header.first_difat_sector;
    if difat_sector == ENDOFCHAIN || difat_sector == FREESECT {
        if header.num_difat_sectors != 0 {
            return Err(CfbError::TruncatedDifat {
                expected: header.num_difat_sectors,
                found: 0,
            });
        }
        return Ok(fat_sectors);
    }

    // Each DIFAT sector carries (sector_size/4 - 1) FAT sector numbers and a
    // final word pointing at the next DIFAT sector.
    let per_sector = header.entries_per_sector() - 1;
    let mut visited = FixedBitSet::with_capacity(total_sectors as usize);
    let mut walked: u32 = 0;
    let mut sector = vec![0u8; header.sector_size];

    while difat_sector != ENDOFCHAIN && difat_sector != FREESECT {
        if walked >= header.num_difat_sectors {
            // More linked sectors than declared; treat as the same count
            // mismatch as a short chain.
            return Err(CfbError::TruncatedDifat {
                expected: header.num_difat_sectors,
                found: walked + 1,
            });
        }
        let index = difat_sector as usize;
        if difat_sector > MAXREGSECT || index >= total_sectors as usize {
            return Err(CfbError::OutOfRange {
                offset: u64::from(difat_sector),
                limit: u64::from(total_sectors),
            });
        }
        if visited.contains(index) {
            return Err(CfbError::Cycle(difat_sector));
        }
        visited.insert(index);

        read_sector_into(reader, header, total_sectors, difat_sector, &mut sector)?;
        for chunk in sector[..per_sector * 4].chunks_exact(4) {
            let sect = U32::<LE>::read_from_bytes(chunk)
                .map(|v| v.get())
                .unwrap_or(FREESECT);
            if sect == FREESECT || sect == ENDOFCHAIN {
                continue;
            }
            fat_sectors.push(sect);
        }
        difat_sector = U32::<LE>::read_from_bytes(&sector[per_sector * 4..])
            .map(|v| v.get())
            .unwrap_or(ENDOFCHAIN);
        walked += 1;
    }

    if walked != header.num_difat_sectors {
        return Err(CfbError::TruncatedDifat {
            expected: header.num_difat_sectors,
            found: walked,
        });
    }

    Ok(fat_sectors)
}

/// Positioned read of one sector, bounds-checked against the file extent.
pub(crate) fn read_sector_into<R: Read + Seek>(
    reader: &mut R,
    header: &Header,
    total_sectors: u32,
    sect: u32,
    buf: &mut [u8],
) -> Result<()> {
    if sect > MAXREGSECT || sect >= total_sectors {
        return Err(CfbError::OutOfRange {
            offset: u64::from(sect),
            limit: u64::from(total_sectors),
        });
    }
    reader.seek(SeekFrom::Start(header.sector_offset(sect)))?;
    reader.read_exact(buf)?;
    Ok(())
}

/// Append a sector's worth of little-endian SECT words to `entries`.
fn append_sect_words(sector: &[u8], entries: &mut Vec<u32>) {
    for chunk in sector.chunks_exact(4) {
        let word = U32::<LE>::read_from_bytes(chunk)
            .map(|v| v.get())
            .unwrap_or(FREESECT);
        entries.push(word);
    }
}
