//! Codepage transcoding adapter for 8-bit property strings.
//!
//! The property-set decoder surfaces `VT_LPSTR` values as raw bytes together
//! with the section's codepage hint (property id 1); it never transcodes on
//! its own. This adapter sits on top and turns those bytes into UTF-8 using
//! `encoding_rs`. Keeping the mapping here means the storage engine and the
//! decoder stay byte-exact and the lossy step is opt-in.

use encoding_rs::Encoding;

/// Decode a codepage-encoded string, honoring an embedded null terminator.
///
/// Returns `None` when the codepage is not one this adapter knows; callers
/// that want the raw bytes regardless should keep the `VT_LPSTR` payload.
///
/// # Examples
///
/// ```
/// use longan::common::codepage::decode_lpstr;
///
/// let text = decode_lpstr(b"Hello\0", 1252);
/// assert_eq!(text, Some("Hello".to_string()));
/// assert_eq!(decode_lpstr(b"Hello", 99999), None);
/// ```
#[inline]
pub fn decode_lpstr(bytes: &[u8], codepage: u32) -> Option<String> {
    // The length prefix counts the terminator; strip it and anything after.
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let bytes = &bytes[..end];

    if bytes.is_empty() {
        return Some(String::new());
    }

    let encoding = encoding_for_codepage(codepage)?;
    // encoding_rs guarantees valid UTF-8 output
    Some(encoding.decode(bytes).0.into_owned())
}

/// Map a Windows codepage identifier to an `encoding_rs` encoding.
///
/// Covers the codepages that appear in real property sets; the returned
/// references are static so the mapping allocates nothing.
#[inline]
pub fn encoding_for_codepage(codepage: u32) -> Option<&'static Encoding> {
    match codepage {
        // Windows single-byte codepages
        874 => Some(encoding_rs::WINDOWS_874),   // Thai
        1250 => Some(encoding_rs::WINDOWS_1250), // Central European
        1251 => Some(encoding_rs::WINDOWS_1251), // Cyrillic
        1252 => Some(encoding_rs::WINDOWS_1252), // Western European (most common)
        1253 => Some(encoding_rs::WINDOWS_1253), // Greek
        1254 => Some(encoding_rs::WINDOWS_1254), // Turkish
        1255 => Some(encoding_rs::WINDOWS_1255), // Hebrew
        1256 => Some(encoding_rs::WINDOWS_1256), // Arabic
        1257 => Some(encoding_rs::WINDOWS_1257), // Baltic
        1258 => Some(encoding_rs::WINDOWS_1258), // Vietnamese

        // East Asian multi-byte codepages
        932 => Some(encoding_rs::SHIFT_JIS), // Japanese Shift-JIS
        936 => Some(encoding_rs::GBK),       // Simplified Chinese
        949 => Some(encoding_rs::EUC_KR),    // Korean
        950 => Some(encoding_rs::BIG5),      // Traditional Chinese
        20932 => Some(encoding_rs::EUC_JP),  // Japanese EUC-JP
        54936 => Some(encoding_rs::GB18030), // Chinese GB18030

        // ISO 8859 series
        28592 => Some(encoding_rs::ISO_8859_2),
        28595 => Some(encoding_rs::ISO_8859_5),
        28597 => Some(encoding_rs::ISO_8859_7),
        28598 => Some(encoding_rs::ISO_8859_8),
        28605 => Some(encoding_rs::ISO_8859_15),

        // Macintosh Roman
        10000 => Some(encoding_rs::MACINTOSH),

        // Unicode
        1200 => Some(encoding_rs::UTF_16LE),
        1201 => Some(encoding_rs::UTF_16BE),
        65001 => Some(encoding_rs::UTF_8),

        _ => None,
    }
}

/// Decode UTF-16LE bytes up to the first null code unit.
///
/// Used for `VT_LPWSTR` payloads, whose character count includes a trailing
/// null. Invalid sequences are replaced with U+FFFD; well-formed surrogate
/// pairs decode to their supplementary-plane character.
///
/// # Examples
///
/// ```
/// use longan::common::codepage::decode_utf16le;
///
/// assert_eq!(decode_utf16le(b"H\x00i\x00\x00\x00"), "Hi");
/// ```
#[inline]
pub fn decode_utf16le(bytes: &[u8]) -> String {
    // Ignore a trailing odd byte; code units are two bytes each.
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
        .take_while(|&unit| unit != 0)
        .collect();

    String::from_utf16_lossy(&units)
}
