//! The reader facade: open a compound file and hand out its pieces.

use super::consts::*;
use super::directory::{Children, Directory, DirectoryEntry, EntryKind};
use super::error::{CfbError, Result};
use super::fat::{SectorTable, read_sector_into};
use super::header::Header;
use super::stream::{RunList, Stream};
use fixedbitset::FixedBitSet;
use std::io::{Read, Seek, SeekFrom};

/// A parsed compound file over a seekable byte source.
///
/// All tables are loaded and validated by [`CfbFile::open`]; afterwards the
/// structure is immutable and only the seek cursor of the underlying reader
/// moves. The reader owns the byte source and releases it on drop; streams
/// obtained from it borrow the source and cannot outlive the reader.
#[derive(Debug)]
pub struct CfbFile<R: Read + Seek> {
    reader: R,
    header: Header,
    total_sectors: u32,
    fat: SectorTable,
    minifat: SectorTable,
    directory: Directory,
    /// FAT chain of the mini stream, in order; mini sector `k` lives at
    /// 64-byte slot `k % (sector_size/64)` of `mini_carrier[k / (sector_size/64)]`.
    mini_carrier: Vec<u32>,
}

impl<R: Read + Seek> CfbFile<R> {
    /// Open and fully validate a compound file.
    ///
    /// Every structural defect is surfaced here; a reader is never handed
    /// back over a file whose header, FAT, DIFAT, mini-FAT or directory is
    /// inconsistent.
    pub fn open(mut reader: R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size < HEADER_SIZE as u64 {
            return Err(CfbError::BadSignature);
        }

        reader.seek(SeekFrom::Start(0))?;
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header = Header::parse(&header_bytes)?;

        // Sector 0 starts one sector past offset 0; a trailing partial
        // sector still counts as addressable.
        let sector_size = header.sector_size as u64;
        let total_sectors = (file_size.div_ceil(sector_size)).saturating_sub(1) as u32;

        let fat = SectorTable::load_fat(&mut reader, &header, total_sectors)?;

        let dir_data = read_chain_data(&mut reader, &header, total_sectors, &fat, header.first_dir_sector)?;
        let directory = Directory::parse(&dir_data, header.major_version)?;

        let minifat = SectorTable::load_minifat(&mut reader, &header, &fat, total_sectors)?;

        // The root's chain carries the mini stream; resolve it once so mini
        // chains can be mapped without touching the FAT again.
        let root = directory.root();
        let mini_carrier = if root.size > 0 {
            let carrier = fat.chain_to_vec(root.start_sector)?;
            if (carrier.len() as u64) * sector_size < root.size {
                return Err(CfbError::MalformedDirectory(
                    "mini stream chain shorter than the root entry size".to_string(),
                ));
            }
            carrier
        } else {
            Vec::new()
        };

        Ok(CfbFile {
            reader,
            header,
            total_sectors,
            fat,
            minifat,
            directory,
            mini_carrier,
        })
    }

    /// The validated header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The Root Entry (SID 0).
    #[inline]
    pub fn root(&self) -> &DirectoryEntry {
        self.directory.root()
    }

    /// The directory as a whole.
    #[inline]
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// All directory entries in SID order, unallocated slots included.
    pub fn entries(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.directory.iter()
    }

    /// A storage's children, in-order by the format's name ordering.
    pub fn children(&self, storage: &DirectoryEntry) -> Result<Children<'_>> {
        if !storage.is_storage() {
            return Err(CfbError::NotAStorage);
        }
        Ok(self.directory.children(storage))
    }

    /// Resolve a path of names from the root.
    ///
    /// Intermediate components must be storages; the final component may be
    /// a stream or a storage.
    pub fn lookup(&self, path: &[&str]) -> Result<&DirectoryEntry> {
        self.directory.resolve_path(path)
    }

    /// Whether a path resolves to any entry.
    pub fn exists(&self, path: &[&str]) -> bool {
        self.lookup(path).is_ok()
    }

    /// Open the stream at `path`.
    pub fn open_stream(&mut self, path: &[&str]) -> Result<Stream<'_, R>> {
        let sid = self.lookup(path)?.sid;
        self.open_stream_at(sid)
    }

    /// Open a stream by the SID of its directory entry.
    ///
    /// Streams below the mini cutoff resolve through the mini-FAT into the
    /// mini stream; everything else maps straight through the FAT. Opening
    /// the Root Entry yields the raw mini stream, which is FAT-allocated.
    pub fn open_stream_at(&mut self, sid: u32) -> Result<Stream<'_, R>> {
        let entry = self.directory.get(sid).ok_or(CfbError::NotFound)?;
        match entry.kind {
            EntryKind::Stream | EntryKind::Root => {},
            _ => return Err(CfbError::NotAStream),
        }
        let is_root = entry.is_root();
        let (start, size) = (entry.start_sector, entry.size);

        let runs = if is_root {
            // The mini stream itself; its chain is already resolved.
            self.fat_runs_from(&self.mini_carrier, size)?
        } else if size < u64::from(self.header.mini_stream_cutoff) {
            self.mini_runs(start, size)?
        } else {
            let chain = self.fat.chain_to_vec(start)?;
            self.fat_runs_from(&chain, size)?
        };

        Ok(Stream::new(&mut self.reader, runs, size))
    }

    /// Full paths of every stream in the file, depth-first.
    pub fn list_streams(&self) -> Vec<Vec<String>> {
        let mut streams = Vec::new();
        let mut visited = FixedBitSet::with_capacity(self.directory.len());
        let mut stack: Vec<(u32, Vec<String>)> = vec![(0, Vec::new())];

        while let Some((sid, path)) = stack.pop() {
            let index = sid as usize;
            if index >= self.directory.len() || visited.contains(index) {
                continue;
            }
            visited.insert(index);
            let Some(entry) = self.directory.get(sid) else {
                continue;
            };
            for child in self.directory.children(entry) {
                let mut child_path = path.clone();
                child_path.push(child.name.clone());
                if child.is_stream() {
                    streams.push(child_path);
                } else if child.is_storage() {
                    stack.push((child.sid, child_path));
                }
            }
        }

        streams.sort();
        streams
    }

    /// Map a FAT sector chain to byte runs, checking it covers `size`.
    fn fat_runs_from(&self, chain: &[u32], size: u64) -> Result<RunList> {
        let sector_size = self.header.sector_size as u64;
        if (chain.len() as u64) * sector_size < size {
            return Err(CfbError::MalformedDirectory(
                "stream chain shorter than the entry's declared size".to_string(),
            ));
        }
        let mut runs = RunList::default();
        for &sect in chain {
            if sect >= self.total_sectors {
                return Err(CfbError::OutOfRange {
                    offset: u64::from(sect),
                    limit: u64::from(self.total_sectors),
                });
            }
            runs.push(self.header.sector_offset(sect), sector_size);
        }
        Ok(runs)
    }

    /// Map a mini-FAT chain into the mini stream's sectors.
    fn mini_runs(&self, start: u32, size: u64) -> Result<RunList> {
        let mini_size = self.header.mini_sector_size as u64;
        let per_sector = (self.header.sector_size / self.header.mini_sector_size) as u64;

        let chain = self.minifat.chain_to_vec(start)?;
        if (chain.len() as u64) * mini_size < size {
            return Err(CfbError::MalformedDirectory(
                "mini chain shorter than the entry's declared size".to_string(),
            ));
        }

        let mut runs = RunList::default();
        for &mini in &chain {
            let carrier_index = (u64::from(mini) / per_sector) as usize;
            let slot = u64::from(mini) % per_sector;
            let Some(&sect) = self.mini_carrier.get(carrier_index) else {
                return Err(CfbError::OutOfRange {
                    offset: u64::from(mini),
                    limit: self.mini_carrier.len() as u64 * per_sector,
                });
            };
            runs.push(
                self.header.sector_offset(sect) + slot * mini_size,
                mini_size,
            );
        }
        Ok(runs)
    }
}

/// Read a whole FAT chain's sectors into one buffer.
fn read_chain_data<R: Read + Seek>(
    reader: &mut R,
    header: &Header,
    total_sectors: u32,
    fat: &SectorTable,
    start: u32,
) -> Result<Vec<u8>> {
    let sectors = fat.chain_to_vec(start)?;
    let mut data = vec![0u8; sectors.len() * header.sector_size];
    for (i, &sect) in sectors.iter().enumerate() {
        let at = i * header.sector_size;
        read_sector_into(
            reader,
            header,
            total_sectors,
            sect,
            &mut data[at..at + header.sector_size],
        )?;
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_open_rejects_short_input() {
        let result = CfbFile::open(Cursor::new(vec![0u8; 100]));
        assert!(matches!(result, Err(CfbError::BadSignature)));
    }

    #[test]
    fn test_open_rejects_garbage() {
        let result = CfbFile::open(Cursor::new(vec![0x42u8; 4096]));
        assert!(matches!(result, Err(CfbError::BadSignature)));
    }
}
