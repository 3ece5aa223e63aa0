//! Random-access view over one directory entry's bytes.
//!
//! A stream's sectors can land anywhere in the host file, so the materializer
//! resolves the whole chain up front into a run list: maximal contiguous byte
//! ranges in file order. Reads then map a logical offset to `(run, intra)`
//! and copy across run boundaries as needed. The run list doubles as the
//! amortization the format rewards for sequential access; the last-used run
//! index is cached so forward reads do not re-search.

use super::error::{CfbError, Result};
use std::io::{self, Read, Seek, SeekFrom};

/// A maximal contiguous byte range of the stream in the host file.
#[derive(Debug, Clone, Copy)]
struct Run {
    /// Logical offset of this run within the stream
    logical: u64,
    /// Absolute file offset where the run's bytes live
    file: u64,
    /// Run length in bytes
    len: u64,
}

/// Accumulates fragment offsets into coalesced runs.
///
/// Fragments arrive in logical order (one per sector or mini sector); a
/// fragment that starts exactly where the previous one ended in the file is
/// merged into it.
#[derive(Debug, Default)]
pub(crate) struct RunList {
    runs: Vec<Run>,
    logical: u64,
}

impl RunList {
    pub(crate) fn push(&mut self, file_offset: u64, len: u64) {
        if let Some(last) = self.runs.last_mut()
            && last.file + last.len == file_offset
        {
            last.len += len;
        } else {
            self.runs.push(Run {
                logical: self.logical,
                file: file_offset,
                len,
            });
        }
        self.logical += len;
    }

    /// Total bytes covered so far.
    pub(crate) fn covered(&self) -> u64 {
        self.logical
    }
}

/// A readable, seekable stream borrowed from its reader.
///
/// The borrow ties the stream to the reader's file handle: the reader cannot
/// be torn down, nor used for anything else, while the stream is alive.
#[derive(Debug)]
pub struct Stream<'a, R: Read + Seek> {
    reader: &'a mut R,
    runs: Vec<Run>,
    len: u64,
    pos: u64,
    last_run: usize,
}

impl<'a, R: Read + Seek> Stream<'a, R> {
    pub(crate) fn new(reader: &'a mut R, runs: RunList, len: u64) -> Stream<'a, R> {
        debug_assert!(runs.covered() >= len);
        Stream {
            reader,
            runs: runs.runs,
            len,
            pos: 0,
            last_run: 0,
        }
    }

    /// Stream length in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the stream is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read up to `buf.len()` bytes at `offset` without moving the cursor.
    ///
    /// Returns the number of bytes read, which is short only when the read
    /// reaches the end of the stream. An `offset` beyond the end fails with
    /// `OutOfRange`; reads never see the slack bytes of the final sector.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset > self.len {
            return Err(CfbError::OutOfRange {
                offset,
                limit: self.len,
            });
        }
        let count = (buf.len() as u64).min(self.len - offset) as usize;
        if count == 0 {
            return Ok(0);
        }

        let mut index = self.locate_run(offset);
        let mut logical = offset;
        let mut filled = 0usize;
        while filled < count {
            let run = self.runs[index];
            let within = logical - run.logical;
            let take = ((run.len - within) as usize).min(count - filled);
            self.reader.seek(SeekFrom::Start(run.file + within))?;
            self.reader.read_exact(&mut buf[filled..filled + take])?;
            filled += take;
            logical += take as u64;
            if logical >= run.logical + run.len {
                index += 1;
            }
        }
        self.last_run = index.min(self.runs.len().saturating_sub(1));
        Ok(count)
    }

    /// Read the entire stream into a vector.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.len as usize];
        self.read_at(0, &mut data)?;
        Ok(data)
    }

    /// Map a logical offset to the run containing it, preferring the run the
    /// previous read ended in.
    fn locate_run(&self, offset: u64) -> usize {
        if let Some(run) = self.runs.get(self.last_run)
            && offset >= run.logical
            && offset < run.logical + run.len
        {
            return self.last_run;
        }
        // First run strictly past the offset, minus one.
        self.runs
            .partition_point(|run| run.logical <= offset)
            .saturating_sub(1)
    }
}

impl<R: Read + Seek> Read for Stream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len {
            return Ok(0);
        }
        let n = self
            .read_at(self.pos, buf)
            .map_err(io::Error::other)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for Stream<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.pos = offset;
                Ok(offset)
            },
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // Backing buffer: 256 bytes, value == low byte of its offset.
    fn backing() -> Cursor<Vec<u8>> {
        Cursor::new((0..=255u8).collect())
    }

    fn scattered_runs() -> RunList {
        // Logical stream: file [64..96), [192..224), [96..128)
        let mut runs = RunList::default();
        runs.push(64, 32);
        runs.push(192, 32);
        runs.push(96, 32);
        runs
    }

    #[test]
    fn test_runs_coalesce() {
        let mut runs = RunList::default();
        runs.push(512, 512);
        runs.push(1024, 512);
        runs.push(2048, 512);
        assert_eq!(runs.runs.len(), 2);
        assert_eq!(runs.covered(), 1536);
        assert_eq!(runs.runs[0].len, 1024);
    }

    #[test]
    fn test_read_at_within_run() {
        let mut file = backing();
        let mut stream = Stream::new(&mut file, scattered_runs(), 96);
        let mut buf = [0u8; 4];
        assert_eq!(stream.read_at(4, &mut buf).unwrap(), 4);
        assert_eq!(buf, [68, 69, 70, 71]);
    }

    #[test]
    fn test_read_at_across_runs() {
        let mut file = backing();
        let mut stream = Stream::new(&mut file, scattered_runs(), 96);
        let mut buf = [0u8; 4];
        // Logical 30..34 straddles the first and second runs.
        assert_eq!(stream.read_at(30, &mut buf).unwrap(), 4);
        assert_eq!(buf, [94, 95, 192, 193]);
    }

    #[test]
    fn test_read_at_backwards_after_forwards() {
        let mut file = backing();
        let mut stream = Stream::new(&mut file, scattered_runs(), 96);
        let mut buf = [0u8; 2];
        stream.read_at(90, &mut buf).unwrap();
        assert_eq!(buf, [122, 123]);
        // Cache points at the last run; a read before it must still resolve.
        stream.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [64, 65]);
    }

    #[test]
    fn test_read_at_truncates_at_end() {
        let mut file = backing();
        // Declared length shorter than the chain capacity (sector slack).
        let mut stream = Stream::new(&mut file, scattered_runs(), 90);
        let mut buf = [0u8; 16];
        assert_eq!(stream.read_at(85, &mut buf).unwrap(), 5);
    }

    #[test]
    fn test_read_at_past_end() {
        let mut file = backing();
        let mut stream = Stream::new(&mut file, scattered_runs(), 96);
        let mut buf = [0u8; 1];
        assert!(matches!(
            stream.read_at(97, &mut buf),
            Err(CfbError::OutOfRange { offset: 97, limit: 96 })
        ));
        // Reading exactly at the end is an empty read, not an error.
        assert_eq!(stream.read_at(96, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_all() {
        let mut file = backing();
        let mut stream = Stream::new(&mut file, scattered_runs(), 96);
        let data = stream.read_all().unwrap();
        assert_eq!(data.len(), 96);
        assert_eq!(&data[..4], &[64, 65, 66, 67]);
        assert_eq!(&data[32..36], &[192, 193, 194, 195]);
        assert_eq!(&data[64..68], &[96, 97, 98, 99]);
    }

    #[test]
    fn test_read_seek_impls() {
        let mut file = backing();
        let mut stream = Stream::new(&mut file, scattered_runs(), 96);
        let mut buf = [0u8; 8];
        stream.seek(SeekFrom::Start(28)).unwrap();
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [92, 93, 94, 95, 192, 193, 194, 195]);
        assert_eq!(stream.seek(SeekFrom::End(-2)).unwrap(), 94);
        assert_eq!(stream.seek(SeekFrom::Current(1)).unwrap(), 95);
        assert!(stream.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn test_empty_stream() {
        let mut file = backing();
        let mut stream = Stream::new(&mut file, RunList::default(), 0);
        assert!(stream.is_empty());
        let mut buf = [0u8; 4];
        assert_eq!(stream.read_at(0, &mut buf).unwrap(), 0);
    }
}
