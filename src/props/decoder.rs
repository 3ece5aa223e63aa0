//! Property-set stream decoding.
//!
//! A property-set stream is a set header, a table of `(FMTID, offset)` pairs
//! naming sections, and per section a header, a `(propertyID, offset)` table
//! and the type-tagged values. The decoder walks that layout in stream order
//! and pushes `(section, id, tag, value bytes)` tuples at a visitor; it never
//! interprets values itself, so visitors can decode selectively via
//! [`PropertyValue::decode`](super::PropertyValue::decode).
//!
//! Bounds are enforced per section: a property whose offset or computed
//! length escapes its section aborts the decode, unless the visitor's
//! [`section_failed`](PropertyVisitor::section_failed) hook opts into
//! resuming with the next section.

use super::consts::*;
use super::value::{is_prefixed, prefix_unit, scalar_size};
use crate::cfb::{CfbError, Result, Stream};
use crate::common::Guid;
use crate::common::binary::{read_bytes, read_u16_le, read_u32_le};
use std::io::{Read, Seek};

/// Flow control returned by a visitor for each property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Keep decoding
    Continue,
    /// Stop the whole decode successfully
    Stop,
}

/// Receiver for decoded properties.
///
/// Properties arrive in the order of each section's offset table; sections
/// arrive in set-header order.
pub trait PropertyVisitor {
    /// One property: its section's FMTID, its id, its type tag, and the raw
    /// value bytes following the tag (length prefix included for prefixed
    /// types).
    fn property(&mut self, section: &Guid, id: u32, tag: u32, value: &[u8]) -> Visit;

    /// A section failed to decode. Return `true` to skip it and resume with
    /// the next section; the default keeps the abort-on-first-error policy.
    fn section_failed(&mut self, _section: &Guid, _error: &CfbError) -> bool {
        false
    }
}

/// Parsed set header, returned for callers that care about the provenance
/// fields.
#[derive(Debug, Clone)]
pub struct PropertySetInfo {
    /// Writer's OS version word
    pub os_version: u32,
    /// Set format revision (0 or 1)
    pub format: u16,
    /// Class id of the whole set
    pub clsid: Guid,
    /// Number of sections
    pub num_sections: u32,
}

/// Decode a property-set stream, feeding every property to `visitor`.
pub fn decode_property_set<R: Read + Seek>(
    stream: &mut Stream<'_, R>,
    visitor: &mut dyn PropertyVisitor,
) -> Result<PropertySetInfo> {
    let data = stream.read_all()?;
    decode_slice(&data, visitor)
}

/// Decode a property set already materialized as bytes.
pub fn decode_slice(data: &[u8], visitor: &mut dyn PropertyVisitor) -> Result<PropertySetInfo> {
    let byte_order = read_u16_le(data, 0)?;
    if byte_order != 0xFFFE {
        return Err(CfbError::MalformedPropertySet(format!(
            "byte-order marker {:#06X}",
            byte_order
        )));
    }
    let format = read_u16_le(data, 2)?;
    if format > 1 {
        return Err(CfbError::MalformedPropertySet(format!(
            "unknown set format {}",
            format
        )));
    }
    let os_version = read_u32_le(data, 4)?;
    let mut clsid = [0u8; 16];
    clsid.copy_from_slice(read_bytes(data, 8, 16)?);
    let num_sections = read_u32_le(data, 24)?;

    let info = PropertySetInfo {
        os_version,
        format,
        clsid: Guid::from_bytes(clsid),
        num_sections,
    };

    for index in 0..num_sections as usize {
        let at = 28 + index * 20;
        let mut fmtid_bytes = [0u8; 16];
        fmtid_bytes.copy_from_slice(read_bytes(data, at, 16)?);
        let fmtid = Guid::from_bytes(fmtid_bytes);
        let offset = read_u32_le(data, at + 16)? as usize;

        match decode_section(data, offset, &fmtid, visitor) {
            Ok(Visit::Continue) => {},
            Ok(Visit::Stop) => return Ok(info),
            Err(error) => {
                if !visitor.section_failed(&fmtid, &error) {
                    return Err(error);
                }
            },
        }
    }

    Ok(info)
}

/// Decode one section. All offsets inside are relative to the section start;
/// nothing may reach outside `cb_section`.
fn decode_section(
    data: &[u8],
    offset: usize,
    fmtid: &Guid,
    visitor: &mut dyn PropertyVisitor,
) -> Result<Visit> {
    let cb_section = read_u32_le(data, offset)? as usize;
    let num_properties = read_u32_le(data, offset + 4)? as usize;

    let table_end = num_properties
        .checked_mul(8)
        .and_then(|n| n.checked_add(8))
        .ok_or_else(|| {
            CfbError::MalformedPropertySet("property count overflows".to_string())
        })?;
    if cb_section < table_end {
        return Err(CfbError::MalformedPropertySet(format!(
            "section size {} cannot hold {} properties",
            cb_section, num_properties
        )));
    }
    let section = read_bytes(data, offset, cb_section).map_err(|_| {
        CfbError::MalformedPropertySet("section extends past the stream".to_string())
    })?;

    for k in 0..num_properties {
        let id = read_u32_le(section, 8 + k * 8)?;
        let value_offset = read_u32_le(section, 12 + k * 8)? as usize;

        let tag = read_u32_le(section, value_offset).map_err(|_| {
            CfbError::MalformedPropertySet(format!("property {} offset escapes section", id))
        })?;
        let body = &section[value_offset + 4..];
        let len = value_len(tag, body)?;
        let value = body.get(..len).ok_or_else(|| {
            CfbError::MalformedPropertySet(format!("property {} value escapes section", id))
        })?;

        if visitor.property(fmtid, id, tag, value) == Visit::Stop {
            return Ok(Visit::Stop);
        }
    }

    Ok(Visit::Continue)
}

/// Encoded length of a value, given the bytes that follow its type tag.
///
/// Fixed scalars have their natural width. Prefixed types span their length
/// prefix plus content. Vectors and arrays start with an element count;
/// packed sub-32-bit scalars use natural stride, prefixed elements are
/// individually padded to 4 bytes. Tags outside the decoded subset claim the
/// remaining bytes so they round-trip losslessly.
fn value_len(tag: u32, body: &[u8]) -> Result<usize> {
    if tag & (VT_VECTOR | VT_ARRAY) != 0 {
        let base = tag & VT_TYPE_MASK;
        let count = read_u32_le(body, 0)? as usize;
        if let Some(width) = scalar_size(base) {
            let content = count.checked_mul(width).ok_or_else(overlong)?;
            return 4usize.checked_add(content).ok_or_else(overlong);
        }
        if is_prefixed(base) {
            let mut offset = 4usize;
            for _ in 0..count {
                let units = read_u32_le(body, offset)? as usize;
                let content = units.checked_mul(prefix_unit(base)).ok_or_else(overlong)?;
                let end = offset.checked_add(4 + content).ok_or_else(overlong)?;
                if end > body.len() {
                    return Err(CfbError::MalformedPropertySet(
                        "vector element escapes its section".to_string(),
                    ));
                }
                // Elements are individually padded; the final pad may meet
                // the section end exactly.
                offset = offset
                    .checked_add(4 + content.div_ceil(4) * 4)
                    .ok_or_else(overlong)?;
            }
            return Ok(offset.min(body.len()));
        }
        return Ok(body.len());
    }

    if let Some(width) = scalar_size(tag) {
        return Ok(width);
    }
    if is_prefixed(tag) {
        let units = read_u32_le(body, 0)? as usize;
        let content = units.checked_mul(prefix_unit(tag)).ok_or_else(overlong)?;
        return 4usize.checked_add(content).ok_or_else(overlong);
    }
    // Unrecognized tag: hand the visitor everything up to the section end.
    Ok(body.len())
}

fn overlong() -> CfbError {
    CfbError::MalformedPropertySet("value length overflows".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfb::fixture::build_property_set as build_set;
    use crate::props::PropertyValue;

    #[derive(Default)]
    struct Collect {
        seen: Vec<(u32, u32, Vec<u8>)>,
        stop_after: Option<usize>,
        skip_failed: bool,
        failures: usize,
    }

    impl PropertyVisitor for Collect {
        fn property(&mut self, _section: &Guid, id: u32, tag: u32, value: &[u8]) -> Visit {
            self.seen.push((id, tag, value.to_vec()));
            match self.stop_after {
                Some(n) if self.seen.len() >= n => Visit::Stop,
                _ => Visit::Continue,
            }
        }

        fn section_failed(&mut self, _section: &Guid, _error: &CfbError) -> bool {
            self.failures += 1;
            self.skip_failed
        }
    }

    #[test]
    fn test_decode_summary_like_set() {
        let mut lpstr = 6u32.to_le_bytes().to_vec();
        lpstr.extend_from_slice(b"Hello\0");
        let data = build_set(
            &FMTID_SUMMARY_INFORMATION,
            &[
                (PID_TITLE, VT_LPSTR, lpstr.clone()),
                (PID_CREATING_APPLICATION, VT_I4, 7i32.to_le_bytes().to_vec()),
            ],
        );

        let mut visitor = Collect::default();
        let info = decode_slice(&data, &mut visitor).unwrap();
        assert_eq!(info.num_sections, 1);
        assert_eq!(info.format, 0);
        assert_eq!(
            visitor.seen,
            vec![
                (0x02, 30, lpstr),
                (0x12, 3, 7i32.to_le_bytes().to_vec()),
            ]
        );
    }

    #[test]
    fn test_decode_rejects_bad_byte_order() {
        let data = build_set(&FMTID_SUMMARY_INFORMATION, &[]);
        let mut flipped = data.clone();
        flipped[0] = 0xFF;
        flipped[1] = 0xFE;
        let mut visitor = Collect::default();
        assert!(matches!(
            decode_slice(&flipped, &mut visitor),
            Err(CfbError::MalformedPropertySet(_))
        ));
    }

    #[test]
    fn test_decode_rejects_offset_escaping_section() {
        let data = build_set(
            &FMTID_SUMMARY_INFORMATION,
            &[(PID_TITLE, VT_I4, 7i32.to_le_bytes().to_vec())],
        );
        // Point the lone property's value offset past the section.
        let mut broken = data.clone();
        let table_at = 48 + 8;
        broken[table_at + 4..table_at + 8].copy_from_slice(&0x4000u32.to_le_bytes());
        let mut visitor = Collect::default();
        assert!(matches!(
            decode_slice(&broken, &mut visitor),
            Err(CfbError::MalformedPropertySet(_))
        ));
        assert_eq!(visitor.failures, 1);
        assert!(visitor.seen.is_empty());
    }

    #[test]
    fn test_visitor_can_skip_failed_section() {
        let data = build_set(
            &FMTID_SUMMARY_INFORMATION,
            &[(PID_TITLE, VT_I4, 7i32.to_le_bytes().to_vec())],
        );
        let mut broken = data.clone();
        let table_at = 48 + 8;
        broken[table_at + 4..table_at + 8].copy_from_slice(&0x4000u32.to_le_bytes());
        let mut visitor = Collect {
            skip_failed: true,
            ..Collect::default()
        };
        assert!(decode_slice(&broken, &mut visitor).is_ok());
        assert_eq!(visitor.failures, 1);
    }

    #[test]
    fn test_decode_rejects_undersized_section() {
        let data = build_set(
            &FMTID_SUMMARY_INFORMATION,
            &[(PID_TITLE, VT_I4, 7i32.to_le_bytes().to_vec())],
        );
        let mut broken = data.clone();
        // cbSection too small for one property: must be at least 16.
        broken[48..52].copy_from_slice(&12u32.to_le_bytes());
        let mut visitor = Collect::default();
        assert!(matches!(
            decode_slice(&broken, &mut visitor),
            Err(CfbError::MalformedPropertySet(_))
        ));
    }

    #[test]
    fn test_visitor_stop_short_circuits() {
        let data = build_set(
            &FMTID_SUMMARY_INFORMATION,
            &[
                (2, VT_I4, 1i32.to_le_bytes().to_vec()),
                (3, VT_I4, 2i32.to_le_bytes().to_vec()),
                (4, VT_I4, 3i32.to_le_bytes().to_vec()),
            ],
        );
        let mut visitor = Collect {
            stop_after: Some(1),
            ..Collect::default()
        };
        decode_slice(&data, &mut visitor).unwrap();
        assert_eq!(visitor.seen.len(), 1);
    }

    #[test]
    fn test_value_bytes_lie_inside_section() {
        // P5: every emitted value range must sit inside its section.
        let mut blob = 5u32.to_le_bytes().to_vec();
        blob.extend_from_slice(&[1, 2, 3, 4, 5]);
        let data = build_set(
            &FMTID_DOC_SUMMARY_INFORMATION,
            &[
                (2, VT_BLOB, blob),
                (3, VT_BOOL, vec![0xFF, 0xFF]),
            ],
        );
        let cb_section = read_u32_le(&data, 48).unwrap() as usize;
        let mut visitor = Collect::default();
        decode_slice(&data, &mut visitor).unwrap();
        assert_eq!(visitor.seen.len(), 2);
        for (_, _, value) in &visitor.seen {
            // Values are raw slices of the section, so containment means the
            // decoder's computed spans stayed within cbSection.
            assert!(value.len() <= cb_section);
        }
        assert_eq!(visitor.seen[0].2.len(), 9);
        assert_eq!(visitor.seen[1].2, vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_decoded_values_round_trip() {
        let mut lpwstr = 3u32.to_le_bytes().to_vec();
        lpwstr.extend_from_slice(b"H\x00i\x00\x00\x00");
        let data = build_set(
            &FMTID_SUMMARY_INFORMATION,
            &[(PID_TITLE, VT_LPWSTR, lpwstr)],
        );
        let mut visitor = Collect::default();
        decode_slice(&data, &mut visitor).unwrap();
        let (id, tag, value) = &visitor.seen[0];
        assert_eq!(*id, PID_TITLE);
        assert_eq!(
            PropertyValue::decode(*tag, value).unwrap(),
            PropertyValue::Lpwstr("Hi".to_string())
        );
    }
}
