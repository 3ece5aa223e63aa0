//! Longan - A Rust library for reading Compound File Binary containers
//!
//! This library provides random-access reading of CFB (Compound File Binary,
//! also known as OLE2 structured storage) containers - the on-disk format
//! underneath legacy Microsoft Office files (.doc, .xls, .ppt), MSI packages
//! and property-set streams - plus a decoder for the property sets stored
//! inside them.
//!
//! # Features
//!
//! - **Storage engine**: header validation, FAT/DIFAT/mini-FAT
//!   reconstruction, directory traversal and seekable stream access
//! - **Defensive parsing**: every chain walk is cycle-checked and bounded,
//!   so corrupt files fail with typed errors instead of hanging
//! - **Property sets**: visitor-style decoding of `\x05SummaryInformation`
//!   and friends, with typed values and a lossless fallback
//! - **Metadata extraction**: one call for document title, author,
//!   timestamps and the rest of the standard property ids
//!
//! # Example - Reading a stream
//!
//! ```no_run
//! use std::fs::File;
//! use longan::CfbFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("document.doc")?;
//! let mut cfb = CfbFile::open(file)?;
//!
//! // List all streams
//! for path in cfb.list_streams() {
//!     println!("Stream: {:?}", path);
//! }
//!
//! // Random-access read of a named stream
//! let mut stream = cfb.open_stream(&["WordDocument"])?;
//! let mut head = [0u8; 32];
//! stream.read_at(0, &mut head)?;
//! println!("Stream size: {} bytes", stream.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Document metadata
//!
//! ```no_run
//! use std::fs::File;
//! use longan::CfbFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cfb = CfbFile::open(File::open("report.xls")?)?;
//! let metadata = cfb.metadata()?;
//! if let Some(title) = metadata.title {
//!     println!("Title: {}", title);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Walking a property set by hand
//!
//! ```no_run
//! use std::fs::File;
//! use longan::CfbFile;
//! use longan::common::Guid;
//! use longan::props::{PropertyVisitor, Visit, decode_property_set};
//!
//! struct Dump;
//!
//! impl PropertyVisitor for Dump {
//!     fn property(&mut self, section: &Guid, id: u32, tag: u32, value: &[u8]) -> Visit {
//!         println!("{section} / {id}: tag {tag}, {} bytes", value.len());
//!         Visit::Continue
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut cfb = CfbFile::open(File::open("document.doc")?)?;
//! let mut stream = cfb.open_stream(&["\u{0005}SummaryInformation"])?;
//! decode_property_set(&mut stream, &mut Dump)?;
//! # Ok(())
//! # }
//! ```

/// Compound file storage engine
///
/// Header, allocation tables, directory and stream materialization. This is
/// the layer that turns a seekable byte source into named, readable streams.
pub mod cfb;

/// Shared utilities: bounds-checked little-endian reads, GUID values and the
/// codepage transcoding adapter
pub mod common;

/// Property-set decoding on top of compound file streams
pub mod props;

// Re-export commonly used types for convenience
pub use cfb::{CfbError, CfbFile, DirectoryEntry, EntryKind, Result, Stream, is_cfb};
pub use props::{DocumentMetadata, PropertyValue, PropertyVisitor, Visit};
