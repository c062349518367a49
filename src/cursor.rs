//! Client-facing combined cursor.
//!
//! Wire form is `"{source}:{value};{source}:{value};..."`. An empty string is a cold
//! start. A source that is absent has not been touched yet; the value
//! [`COMPLETED`] marks a source that must never be queried again.
//!
//! Ids and values are percent-encoded on the wire, so backend tokens may carry any
//! character, separators included.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::CursorError;

pub const COMPLETED: &str = "COMPLETED";

const SEGMENT_SEP: char = ';';
const KV_SEP: char = ':';

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedCursor {
    entries: BTreeMap<String, String>,
}

impl CombinedCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the opaque client cursor. Any bad segment rejects the whole cursor.
    pub fn parse(raw: &str) -> Result<Self, CursorError> {
        let mut entries = BTreeMap::new();
        if raw.is_empty() {
            return Ok(Self { entries });
        }

        for (position, segment) in raw.split(SEGMENT_SEP).enumerate() {
            if segment.is_empty() {
                return Err(CursorError::EmptySegment { position });
            }
            let (source_id, value) = segment
                .split_once(KV_SEP)
                .ok_or_else(|| CursorError::MissingSeparator { segment: segment.to_string() })?;
            if source_id.is_empty() {
                return Err(CursorError::EmptySourceId { segment: segment.to_string() });
            }
            if value.is_empty() {
                return Err(CursorError::EmptyValue { source_id: source_id.to_string() });
            }
            let source_id = decode(source_id, segment)?;
            let value = decode(value, segment)?;
            if entries.contains_key(&source_id) {
                return Err(CursorError::DuplicateSource { source_id });
            }
            entries.insert(source_id, value);
        }

        Ok(Self { entries })
    }

    /// `None` is a cold start.
    pub fn parse_opt(raw: Option<&str>) -> Result<Self, CursorError> {
        match raw {
            Some(r) => Self::parse(r),
            None => Ok(Self::new()),
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (i, (source_id, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(SEGMENT_SEP);
            }
            out.push_str(&urlencoding::encode(source_id));
            out.push(KV_SEP);
            out.push_str(&urlencoding::encode(value));
        }
        out
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.entries.get(source_id).map(String::as_str)
    }

    pub fn set(&mut self, source_id: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(source_id.into(), value.into());
    }

    pub fn mark_completed(&mut self, source_id: impl Into<String>) {
        self.entries.insert(source_id.into(), COMPLETED.to_string());
    }

    pub fn is_completed(&self, source_id: &str) -> bool {
        self.get(source_id) == Some(COMPLETED)
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode(raw: &str, segment: &str) -> Result<String, CursorError> {
    urlencoding::decode(raw)
        .map(|v| v.into_owned())
        .map_err(|_| CursorError::BadEncoding { segment: segment.to_string() })
}

impl fmt::Display for CombinedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
