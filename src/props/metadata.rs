//! Document metadata from the standard property streams.
//!
//! Convenience layer that decodes `\x05SummaryInformation` and
//! `\x05DocumentSummaryInformation` into one flat struct, applying the
//! section codepage to 8-bit strings and converting FILETIMEs. Everything
//! here rides on the visitor API; nothing below the decoder is touched.

use super::consts::*;
use super::decoder::{PropertyVisitor, Visit, decode_slice};
use super::value::PropertyValue;
use crate::cfb::{CfbError, CfbFile, Result};
use crate::common::Guid;
use crate::common::codepage::decode_lpstr;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::io::{Read, Seek};

/// Metadata gathered from the standard property streams.
///
/// Every field is optional; documents routinely omit most of them.
#[derive(Debug, Default)]
pub struct DocumentMetadata {
    // SummaryInformation
    pub codepage: Option<u32>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub author: Option<String>,
    pub keywords: Option<String>,
    pub comments: Option<String>,
    pub template: Option<String>,
    pub last_saved_by: Option<String>,
    pub revision_number: Option<String>,
    pub edit_time: Option<Duration>,
    pub create_time: Option<DateTime<Utc>>,
    pub last_printed_time: Option<DateTime<Utc>>,
    pub last_saved_time: Option<DateTime<Utc>>,
    pub num_pages: Option<u32>,
    pub num_words: Option<u32>,
    pub num_chars: Option<u32>,
    pub creating_application: Option<String>,
    pub security: Option<u32>,

    // DocumentSummaryInformation
    pub category: Option<String>,
    pub manager: Option<String>,
    pub company: Option<String>,
}

impl<R: Read + Seek> CfbFile<R> {
    /// Decode document metadata from the standard property streams.
    ///
    /// Absent streams and sections that fail to decode are skipped; whatever
    /// parsed cleanly is returned.
    pub fn metadata(&mut self) -> Result<DocumentMetadata> {
        let mut metadata = DocumentMetadata::default();

        if let Ok(props) = self.collect_properties(SUMMARY_INFORMATION_STREAM) {
            extract_summary_info(&mut metadata, &props);
        }
        if let Ok(props) = self.collect_properties(DOC_SUMMARY_INFORMATION_STREAM) {
            extract_doc_summary_info(&mut metadata, &props);
        }

        Ok(metadata)
    }

    fn collect_properties(&mut self, name: &str) -> Result<HashMap<u32, PropertyValue>> {
        let data = self.open_stream(&[name])?.read_all()?;
        let mut collector = Collector::default();
        decode_slice(&data, &mut collector)?;
        Ok(collector.properties)
    }
}

/// Visitor that decodes the first section's properties into a map.
///
/// Damaged sections are skipped rather than aborting; metadata extraction is
/// best-effort by design.
#[derive(Default)]
struct Collector {
    properties: HashMap<u32, PropertyValue>,
    first_section: Option<Guid>,
}

impl PropertyVisitor for Collector {
    fn property(&mut self, section: &Guid, id: u32, tag: u32, value: &[u8]) -> Visit {
        match self.first_section {
            None => self.first_section = Some(*section),
            Some(first) if first != *section => return Visit::Stop,
            _ => {},
        }
        if let Ok(decoded) = PropertyValue::decode(tag, value) {
            self.properties.insert(id, decoded);
        }
        Visit::Continue
    }

    fn section_failed(&mut self, _section: &Guid, _error: &CfbError) -> bool {
        true
    }
}

/// 100-nanosecond intervals between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_EPOCH: i64 = 116_444_736_000_000_000;

fn filetime_to_date(filetime: u64) -> Option<DateTime<Utc>> {
    // Zero means "not recorded", not the year 1601.
    if filetime == 0 {
        return None;
    }
    let ticks = i64::try_from(filetime).ok()?;
    Some(DateTime::from_timestamp_nanos(
        (ticks - FILETIME_UNIX_EPOCH).checked_mul(100)?,
    ))
}

fn filetime_to_duration(filetime: u64) -> Option<Duration> {
    let nanos = filetime.checked_mul(100)?;
    Some(Duration::nanoseconds(i64::try_from(nanos).ok()?))
}

fn extract_summary_info(metadata: &mut DocumentMetadata, props: &HashMap<u32, PropertyValue>) {
    let codepage = match props.get(&PID_CODEPAGE) {
        Some(PropertyValue::I2(value)) => Some(*value as u16 as u32),
        Some(PropertyValue::UI2(value)) => Some(u32::from(*value)),
        _ => None,
    };
    metadata.codepage = codepage;

    let text = |id: u32| extract_string(props.get(&id)?, codepage);
    metadata.title = text(PID_TITLE);
    metadata.subject = text(PID_SUBJECT);
    metadata.author = text(PID_AUTHOR);
    metadata.keywords = text(PID_KEYWORDS);
    metadata.comments = text(PID_COMMENTS);
    metadata.template = text(PID_TEMPLATE);
    metadata.last_saved_by = text(PID_LAST_SAVED_BY);
    metadata.revision_number = text(PID_REVISION_NUMBER);
    metadata.creating_application = text(PID_CREATING_APPLICATION);

    if let Some(PropertyValue::Filetime(value)) = props.get(&PID_EDIT_TIME) {
        metadata.edit_time = filetime_to_duration(*value);
    }
    if let Some(PropertyValue::Filetime(value)) = props.get(&PID_LAST_PRINTED_TIME) {
        metadata.last_printed_time = filetime_to_date(*value);
    }
    if let Some(PropertyValue::Filetime(value)) = props.get(&PID_CREATE_TIME) {
        metadata.create_time = filetime_to_date(*value);
    }
    if let Some(PropertyValue::Filetime(value)) = props.get(&PID_LAST_SAVED_TIME) {
        metadata.last_saved_time = filetime_to_date(*value);
    }
    if let Some(PropertyValue::I4(value)) = props.get(&PID_NUM_PAGES) {
        metadata.num_pages = Some(*value as u32);
    }
    if let Some(PropertyValue::I4(value)) = props.get(&PID_NUM_WORDS) {
        metadata.num_words = Some(*value as u32);
    }
    if let Some(PropertyValue::I4(value)) = props.get(&PID_NUM_CHARS) {
        metadata.num_chars = Some(*value as u32);
    }
    if let Some(PropertyValue::I4(value)) = props.get(&PID_SECURITY) {
        metadata.security = Some(*value as u32);
    }
}

fn extract_doc_summary_info(metadata: &mut DocumentMetadata, props: &HashMap<u32, PropertyValue>) {
    // This section carries its own codepage property.
    let codepage = match props.get(&PID_CODEPAGE) {
        Some(PropertyValue::I2(value)) => Some(*value as u16 as u32),
        Some(PropertyValue::UI2(value)) => Some(u32::from(*value)),
        _ => metadata.codepage,
    };

    let text = |id: u32| extract_string(props.get(&id)?, codepage);
    metadata.category = text(PID_CATEGORY);
    metadata.manager = text(PID_MANAGER);
    metadata.company = text(PID_COMPANY);
}

/// Turn a string-bearing value into text, applying the codepage hint to
/// 8-bit strings. Sections without a hint default to Windows-1252.
fn extract_string(value: &PropertyValue, codepage: Option<u32>) -> Option<String> {
    match value {
        PropertyValue::Lpstr(bytes) | PropertyValue::Bstr(bytes) => {
            if bytes.is_empty() {
                return None;
            }
            decode_lpstr(bytes, codepage.unwrap_or(DEFAULT_CODEPAGE))
                .filter(|text| !text.is_empty())
        },
        PropertyValue::Lpwstr(text) => {
            if text.is_empty() {
                None
            } else {
                Some(text.clone())
            }
        },
        _ => None,
    }
}
