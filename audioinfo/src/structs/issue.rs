//! Structured records of recoverable anomalies.
//!
//! An [`Issue`] never stops a parse by itself. Parsers append issues to the
//! result they are building and keep going (or stop for independent reasons).

use std::error::Error;
use std::fmt;
use std::sync::Arc;

pub const SKIPPED_BYTES: &str = "skipped-bytes";
pub const TRAILING_BYTES: &str = "trailing-bytes";
pub const BOS_SEGMENT_SIZE: &str = "bos-segment-size";
pub const EXPECTED_SEQUENCE: &str = "expected-sequence";
pub const FOUND_SEQUENCE: &str = "found-sequence";

pub type Cause = Arc<dyn Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IssueKind {
    /// Bytes were skipped to find the next anchor.
    Sync,
    /// A frame, page or packet was structurally invalid.
    Format,
    /// Data ended inside a structure.
    Eof,
    Other,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Sync => write!(f, "Sync"),
            IssueKind::Format => write!(f, "Format"),
            IssueKind::Eof => write!(f, "EOF"),
            IssueKind::Other => write!(f, "Other"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Int(u64),
    Text(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Int(v) => write!(f, "{v}"),
            MetaValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<u64> for MetaValue {
    fn from(value: u64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<u32> for MetaValue {
    fn from(value: u32) -> Self {
        MetaValue::Int(value as u64)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

/// A recoverable anomaly at a byte location.
///
/// Equality and `Display` are structural: location, kind and metadata.
/// The originating error is kept for diagnostics only and shown with the
/// alternate flag (`{:#}`).
///
/// ```rust
/// use audioinfo::structs::issue::Issue;
///
/// let issue = Issue::sync(1930, 359);
/// assert_eq!(issue.to_string(), "Sync issue at 1930 {skipped-bytes=359}");
/// assert_eq!(issue.skipped_bytes(), Some(359));
/// ```
#[derive(Debug, Clone)]
pub struct Issue {
    location: u64,
    kind: IssueKind,
    cause: Option<Cause>,
    metadata: Vec<(&'static str, MetaValue)>,
}

impl Issue {
    fn new(location: u64, kind: IssueKind, cause: Option<Cause>) -> Self {
        Self {
            location,
            kind,
            cause,
            metadata: Vec::new(),
        }
    }

    pub fn sync(location: u64, skipped: u64) -> Self {
        Self::new(location, IssueKind::Sync, None).with_meta(SKIPPED_BYTES, skipped)
    }

    pub fn format<E>(location: u64, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::new(location, IssueKind::Format, Some(Arc::new(cause)))
    }

    pub fn eof<E>(location: u64, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::new(location, IssueKind::Eof, Some(Arc::new(cause)))
    }

    pub fn other(location: u64) -> Self {
        Self::new(location, IssueKind::Other, None)
    }

    pub fn other_error<E>(location: u64, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::new(location, IssueKind::Other, Some(Arc::new(cause)))
    }

    /// Appends a metadata entry, replacing an earlier value for `key`.
    pub fn with_meta(mut self, key: &'static str, value: impl Into<MetaValue>) -> Self {
        let value = value.into();
        match self.metadata.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.metadata.push((key, value)),
        }
        self
    }

    pub fn location(&self) -> u64 {
        self.location
    }

    pub fn kind(&self) -> IssueKind {
        self.kind
    }

    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Metadata entries in insertion order.
    pub fn metadata(&self) -> &[(&'static str, MetaValue)] {
        &self.metadata
    }

    pub fn meta(&self, key: &str) -> Option<&MetaValue> {
        self.metadata
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn skipped_bytes(&self) -> Option<u64> {
        match self.meta(SKIPPED_BYTES) {
            Some(MetaValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

impl PartialEq for Issue {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
            && self.kind == other.kind
            && self.metadata == other.metadata
    }
}

impl Eq for Issue {}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issue at {}", self.kind, self.location)?;

        if !self.metadata.is_empty() {
            write!(f, " {{")?;
            for (i, (key, value)) in self.metadata.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "}}")?;
        }

        if f.alternate() {
            if let Some(cause) = &self.cause {
                write!(f, ": {cause}")?;
            }
        }

        Ok(())
    }
}
