use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use audioinfo::structs::issue::{Issue, MetaValue};
use audioinfo::structs::stream::{LogicalStream, MpegInfo, StreamSet};

use crate::timestamp::duration_str;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaReport {
    Int(u64),
    Text(String),
}

impl From<&MetaValue> for MetaReport {
    fn from(value: &MetaValue) -> Self {
        match value {
            MetaValue::Int(v) => MetaReport::Int(*v),
            MetaValue::Text(v) => MetaReport::Text(v.clone()),
        }
    }
}

impl fmt::Display for MetaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaReport::Int(v) => write!(f, "{v}"),
            MetaReport::Text(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueReport {
    pub kind: String,
    pub location: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<&'static str, MetaReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&Issue> for IssueReport {
    fn from(issue: &Issue) -> Self {
        Self {
            kind: issue.kind().to_string(),
            location: issue.location(),
            metadata: issue
                .metadata()
                .iter()
                .map(|(key, value)| (*key, value.into()))
                .collect(),
            cause: issue.cause().map(|cause| cause.to_string()),
        }
    }
}

fn issue_reports(issues: &[Issue]) -> Vec<IssueReport> {
    issues.iter().map(IssueReport::from).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct MpegReport {
    pub name: String,
    pub format: &'static str,
    pub version: String,
    pub layer: String,
    pub channel_mode: String,
    pub channels: u8,
    pub sample_rate: u32,
    pub frames: u64,
    pub samples: u64,
    pub duration: String,
    pub duration_ns: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub id3v2: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_tag: Option<String>,
    pub incomplete: bool,
    pub issues: Vec<IssueReport>,
}

impl From<&MpegInfo> for MpegReport {
    fn from(info: &MpegInfo) -> Self {
        let duration = info.duration();

        Self {
            name: info.name.clone(),
            format: "mpeg",
            version: info.first_frame.version.to_string(),
            layer: info.first_frame.layer.to_string(),
            channel_mode: info.first_frame.mode.to_string(),
            channels: info.channels(),
            sample_rate: info.sample_rate(),
            frames: info.frame_count,
            samples: info.total_samples(),
            duration: duration_str(duration),
            duration_ns: nanos(duration),
            average_bitrate: info.average_bitrate(),
            id3v2: info.id3v2.iter().map(|tag| tag.to_string()).collect(),
            trailing_tag: info.trailing_tag.map(|tag| tag.to_string()),
            incomplete: info.incomplete,
            issues: issue_reports(&info.issues),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub serial: u32,
    pub codec: &'static str,
    pub channels: u8,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nominal_bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    pub pages: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_duration: Option<String>,
    pub payload_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_bitrate: Option<u32>,
    pub closed: bool,
    pub incomplete: bool,
    pub issues: Vec<IssueReport>,
}

impl From<&LogicalStream> for StreamReport {
    fn from(stream: &LogicalStream) -> Self {
        let duration = stream.duration();

        Self {
            serial: stream.serial,
            codec: stream.codec.name(),
            channels: stream.params.channels,
            sample_rate: stream.params.sample_rate,
            nominal_bitrate: stream.params.nominal_bitrate,
            vendor: stream.vendor().map(str::to_string),
            pages: stream.pages,
            duration: duration.map(duration_str),
            duration_ns: duration.map(nanos),
            payload_duration: stream.payload_duration().map(duration_str),
            payload_bytes: stream.payload_bytes(),
            average_bitrate: stream.average_bitrate(),
            closed: stream.closed,
            incomplete: stream.incomplete,
            issues: issue_reports(&stream.issues),
        }
    }
}

/// The main audio stream of an Ogg file.
#[derive(Debug, Clone, Serialize)]
pub struct OggReport {
    pub name: String,
    pub format: &'static str,
    #[serde(flatten)]
    pub stream: StreamReport,
}

impl OggReport {
    pub fn new(name: &str, stream: &LogicalStream) -> Self {
        Self {
            name: name.to_string(),
            format: "ogg",
            stream: stream.into(),
        }
    }
}

/// Every logical stream of an Ogg file.
#[derive(Debug, Clone, Serialize)]
pub struct StreamSetReport {
    pub name: String,
    pub pages: u64,
    pub incomplete: bool,
    pub streams: Vec<StreamReport>,
    pub issues: Vec<IssueReport>,
}

impl From<&StreamSet> for StreamSetReport {
    fn from(set: &StreamSet) -> Self {
        Self {
            name: set.name.clone(),
            pages: set.pages,
            incomplete: set.incomplete,
            streams: set.streams().iter().map(StreamReport::from).collect(),
            issues: issue_reports(&set.issues),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum InfoReport {
    Mpeg(MpegReport),
    Ogg(OggReport),
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Prints one YAML document.
pub fn print_yaml<T: Serialize>(report: &T) -> anyhow::Result<()> {
    let yaml = serde_yaml_ng::to_string(report)?;
    print!("---\n{yaml}");
    Ok(())
}

pub fn display_issues(issues: &[IssueReport]) {
    if issues.is_empty() {
        println!("  No issues");
        return;
    }

    for issue in issues {
        let metadata = issue
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ");

        print!("  {:<8}  at {:<12}", issue.kind, issue.location);
        if !metadata.is_empty() {
            print!("  {metadata}");
        }
        if let Some(cause) = &issue.cause {
            print!("  ({cause})");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use audioinfo::structs::issue::{SKIPPED_BYTES, TRAILING_BYTES};
    use audioinfo::utils::errors::ReadError;

    #[test]
    fn test_issue_report() {
        let report = IssueReport::from(&Issue::sync(1930, 359));

        assert_eq!(report.kind, "Sync");
        assert_eq!(report.location, 1930);
        assert_eq!(report.metadata.get(SKIPPED_BYTES), Some(&MetaReport::Int(359)));
        assert!(report.cause.is_none());

        let eof = IssueReport::from(&Issue::eof(7, ReadError::InvalidMark(7)));
        assert_eq!(eof.kind, "EOF");
        assert!(eof.metadata.is_empty());
        assert!(eof.cause.is_some());
    }

    #[test]
    fn test_issue_yaml() -> anyhow::Result<()> {
        let issue = Issue::other(4170).with_meta(TRAILING_BYTES, 5u64);
        let yaml = serde_yaml_ng::to_string(&IssueReport::from(&issue))?;

        assert!(yaml.contains("kind: Other"));
        assert!(yaml.contains("location: 4170"));
        assert!(yaml.contains("trailing-bytes: 5"));
        assert!(!yaml.contains("cause"));
        Ok(())
    }
}
