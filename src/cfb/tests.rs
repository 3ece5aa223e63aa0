//! End-to-end tests driving the reader over synthetic images.
//!
//! These verify that fixture-built compound files round-trip through the
//! whole stack: header, FAT, mini-FAT, directory, streams and the property
//! decoder on top.

use super::consts::*;
use super::fixture::{Fixture, build_property_set};
use super::{CfbError, CfbFile};
use crate::common::Guid;
use crate::props::consts::*;
use crate::props::{PropertyVisitor, Visit, decode_property_set};
use proptest::prelude::*;
use std::io::Cursor;

fn open(bytes: Vec<u8>) -> CfbFile<Cursor<Vec<u8>>> {
    CfbFile::open(Cursor::new(bytes)).unwrap()
}

#[test]
fn test_minimal_file() {
    // One stream, "Data", holding bytes 0x00..=0x63.
    let data: Vec<u8> = (0..100u8).collect();
    let mut cfb = open(Fixture::new().stream(&["Data"], &data).build());

    let entry = cfb.lookup(&["Data"]).unwrap();
    assert_eq!(entry.size, 100);
    assert!(entry.is_stream());

    let mut stream = cfb.open_stream(&["Data"]).unwrap();
    assert_eq!(stream.len(), 100);
    let mut buf = vec![0u8; 100];
    assert_eq!(stream.read_at(0, &mut buf).unwrap(), 100);
    assert_eq!(buf, data);
}

#[test]
fn test_mini_vs_full_threshold() {
    // 4095 bytes sits under the 4096 cutoff, 4096 does not.
    let small = vec![0xAAu8; 4095];
    let big = vec![0xBBu8; 4096];
    let mut cfb = open(
        Fixture::new()
            .stream(&["Small"], &small)
            .stream(&["Big"], &big)
            .build(),
    );

    // "Small" lives in the mini stream: its start is a mini-sector index,
    // and the root entry's size covers exactly its padded mini sectors.
    let small_entry = cfb.lookup(&["Small"]).unwrap();
    assert!(small_entry.size < cfb.header().mini_stream_cutoff as u64);
    assert_eq!(cfb.root().size, 4096);
    assert_eq!(small_entry.start_sector, 0);

    // "Big" is FAT-allocated: its start sector is a real file sector.
    let big_entry = cfb.lookup(&["Big"]).unwrap();
    assert!(big_entry.start_sector >= cfb.header().first_dir_sector);

    let read_all = |cfb: &mut CfbFile<Cursor<Vec<u8>>>, name: &str| {
        cfb.open_stream(&[name]).unwrap().read_all().unwrap()
    };
    assert_eq!(read_all(&mut cfb, "Small"), small);
    assert_eq!(read_all(&mut cfb, "Big"), big);
}

fn long_pattern() -> Vec<u8> {
    (0..10_000usize).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_multi_sector_scattered_chain() {
    // 10 000 bytes over 20 sectors, deliberately non-contiguous.
    let data = long_pattern();
    let mut cfb = open(Fixture::new().interleaved().stream(&["Long"], &data).build());

    let mut stream = cfb.open_stream(&["Long"]).unwrap();
    assert_eq!(stream.len(), 10_000);

    let mut byte = [0u8; 1];
    assert_eq!(stream.read_at(9_999, &mut byte).unwrap(), 1);
    assert_eq!(byte[0], data[9_999]);

    // Straddle the sector 9 / sector 10 boundary (logical offset 5120).
    let mut splice = [0u8; 10];
    assert_eq!(stream.read_at(5_115, &mut splice).unwrap(), 10);
    assert_eq!(splice, data[5_115..5_125]);
}

#[test]
fn test_directory_lookup_at_sid() {
    // Two filler streams push \x05SummaryInformation to SID 3.
    let mut cfb = open(
        Fixture::new()
            .stream(&["Alpha"], b"one")
            .stream(&["Beta"], b"two")
            .stream(&["\u{0005}SummaryInformation"], b"soon")
            .build(),
    );
    let entry = cfb.lookup(&["\u{0005}SummaryInformation"]).unwrap();
    assert_eq!(entry.sid, 3);
    assert!(matches!(
        cfb.lookup(&["NoSuch"]),
        Err(CfbError::NotFound)
    ));
    let _ = cfb.open_stream_at(3).unwrap();
}

struct Record(Vec<(Guid, u32, u32, Vec<u8>)>);

impl PropertyVisitor for Record {
    fn property(&mut self, section: &Guid, id: u32, tag: u32, value: &[u8]) -> Visit {
        self.0.push((*section, id, tag, value.to_vec()));
        Visit::Continue
    }
}

#[test]
fn test_property_set_through_stream() {
    let mut lpstr = 6u32.to_le_bytes().to_vec();
    lpstr.extend_from_slice(b"Hello\0");
    let set = build_property_set(
        &FMTID_SUMMARY_INFORMATION,
        &[
            (0x02, VT_LPSTR, lpstr),
            (0x12, VT_I4, 7i32.to_le_bytes().to_vec()),
        ],
    );
    let mut cfb = open(
        Fixture::new()
            .stream(&["\u{0005}SummaryInformation"], &set)
            .build(),
    );

    let mut stream = cfb.open_stream(&["\u{0005}SummaryInformation"]).unwrap();
    let mut visitor = Record(Vec::new());
    decode_property_set(&mut stream, &mut visitor).unwrap();

    assert_eq!(visitor.0.len(), 2);
    let (section, id, tag, value) = &visitor.0[0];
    assert_eq!(*section, FMTID_SUMMARY_INFORMATION);
    assert_eq!((*id, *tag), (0x02, 30));
    assert_eq!(value, b"\x06\x00\x00\x00Hello\0");
    let (_, id, tag, value) = &visitor.0[1];
    assert_eq!((*id, *tag), (0x12, 3));
    assert_eq!(value, &7u32.to_le_bytes());
}

#[test]
fn test_cycle_detection_does_not_hang() {
    let data = long_pattern();
    let bytes = Fixture::new().stream(&["Long"], &data).build();

    // Find the chain's first sector, then make it point at itself. The FAT
    // occupies sector 0, so entry `s` lives at byte 512 + 4*s.
    let start = {
        let cfb = open(bytes.clone());
        cfb.lookup(&["Long"]).unwrap().start_sector
    };
    let mut corrupted = bytes;
    let at = HEADER_SIZE + 4 * start as usize;
    corrupted[at..at + 4].copy_from_slice(&start.to_le_bytes());

    let mut cfb = open(corrupted);
    assert!(matches!(
        cfb.open_stream(&["Long"]),
        Err(CfbError::Cycle(s)) if s == start
    ));
}

#[test]
fn test_root_stream_is_the_mini_stream() {
    let small = vec![0xAAu8; 100];
    let mut cfb = open(Fixture::new().stream(&["Small"], &small).build());
    // Opening SID 0 yields the raw mini stream: the small stream's bytes
    // padded out to whole mini sectors.
    let data = cfb.open_stream_at(0).unwrap().read_all().unwrap();
    assert_eq!(data.len(), 128);
    assert_eq!(&data[..100], &small[..]);
    assert!(data[100..].iter().all(|&b| b == 0));
}

#[test]
fn test_children_sorted_and_entries_sid_ordered() {
    let cfb = open(
        Fixture::new()
            .stream(&["Longername"], b"1")
            .stream(&["AAA"], b"2")
            .stream(&["zz"], b"3")
            .stream(&["ab"], b"4")
            .build(),
    );

    // entries() is SID order: declaration order behind the root.
    let sids: Vec<u32> = cfb.entries().map(|e| e.sid).collect();
    assert_eq!(sids, vec![0, 1, 2, 3, 4]);

    // children() is format order: by length, then folded units.
    let names: Vec<&str> = cfb
        .children(cfb.root())
        .unwrap()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, vec!["ab", "zz", "AAA", "Longername"]);
}

#[test]
fn test_nested_storage_paths() {
    let mut cfb = open(
        Fixture::new()
            .storage(&["Macros"])
            .stream(&["Macros", "Module1"], b"Sub Main()")
            .stream(&["Plain"], b"top-level")
            .build(),
    );

    let entry = cfb.lookup(&["Macros", "Module1"]).unwrap();
    assert!(entry.is_stream());
    let data = cfb.open_stream(&["Macros", "Module1"]).unwrap().read_all().unwrap();
    assert_eq!(data, b"Sub Main()");

    // A stream cannot be an intermediate component, and a storage cannot be
    // opened as a stream.
    assert!(matches!(
        cfb.lookup(&["Plain", "Deeper"]),
        Err(CfbError::NotAStorage)
    ));
    let storage_sid = cfb.lookup(&["Macros"]).unwrap().sid;
    assert!(matches!(
        cfb.open_stream_at(storage_sid),
        Err(CfbError::NotAStream)
    ));

    assert_eq!(
        cfb.list_streams(),
        vec![
            vec!["Macros".to_string(), "Module1".to_string()],
            vec!["Plain".to_string()],
        ]
    );
}

#[test]
fn test_metadata_end_to_end() {
    let mut title = 6u32.to_le_bytes().to_vec();
    title.extend_from_slice(b"Hello\0");
    let summary = build_property_set(
        &FMTID_SUMMARY_INFORMATION,
        &[
            (PID_CODEPAGE, VT_I2, 1252i16.to_le_bytes().to_vec()),
            (PID_TITLE, VT_LPSTR, title),
            (PID_NUM_PAGES, VT_I4, 7i32.to_le_bytes().to_vec()),
        ],
    );
    let mut company = 8u32.to_le_bytes().to_vec();
    company.extend_from_slice(b"Contoso\0");
    let doc_summary = build_property_set(
        &FMTID_DOC_SUMMARY_INFORMATION,
        &[
            (PID_CODEPAGE, VT_I2, 1252i16.to_le_bytes().to_vec()),
            (PID_COMPANY, VT_LPSTR, company),
        ],
    );

    let mut cfb = open(
        Fixture::new()
            .stream(&[SUMMARY_INFORMATION_STREAM], &summary)
            .stream(&[DOC_SUMMARY_INFORMATION_STREAM], &doc_summary)
            .build(),
    );
    let metadata = cfb.metadata().unwrap();
    assert_eq!(metadata.codepage, Some(1252));
    assert_eq!(metadata.title.as_deref(), Some("Hello"));
    assert_eq!(metadata.num_pages, Some(7));
    assert_eq!(metadata.company.as_deref(), Some("Contoso"));
}

#[test]
fn test_metadata_absent_streams() {
    let mut cfb = open(Fixture::new().stream(&["Data"], b"x").build());
    let metadata = cfb.metadata().unwrap();
    assert!(metadata.title.is_none());
    assert!(metadata.codepage.is_none());
}

#[test]
fn test_empty_stream_round_trip() {
    let mut cfb = open(Fixture::new().stream(&["Empty"], b"").build());
    let mut stream = cfb.open_stream(&["Empty"]).unwrap();
    assert!(stream.is_empty());
    assert_eq!(stream.read_all().unwrap(), Vec::<u8>::new());
}

proptest! {
    // Any in-bounds range reads back the exact logical bytes, and
    // overlapping reads agree on their intersection, even over a
    // scattered chain.
    #[test]
    fn prop_read_at_round_trips(x in 0usize..=10_000, y in 0usize..=10_000) {
        let data = long_pattern();
        let mut cfb = open(
            Fixture::new().interleaved().stream(&["Long"], &data).build(),
        );
        let mut stream = cfb.open_stream(&["Long"]).unwrap();

        let (lo, hi) = (x.min(y), x.max(y));
        let mut buf = vec![0u8; hi - lo];
        prop_assert_eq!(stream.read_at(lo as u64, &mut buf).unwrap(), hi - lo);
        prop_assert_eq!(&buf[..], &data[lo..hi]);

        // A second, shifted read agrees with the first where they overlap.
        let shift = (hi - lo) / 2;
        let mut other = vec![0u8; hi - lo];
        let n = stream.read_at((lo + shift) as u64, &mut other).unwrap();
        let overlap = (hi - lo - shift).min(n);
        prop_assert_eq!(&other[..overlap], &buf[shift..shift + overlap]);
    }
}
