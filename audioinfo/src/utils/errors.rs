use std::fmt;
use std::io;

use crate::structs::issue::Issue;

/// Records a recoverable anomaly or escalates it in strict mode.
///
/// `$state` must expose `fail_level: log::Level` and `name`. When `$level` is at or
/// above the configured fail level the enclosing function returns
/// [`ProbeError::Strict`]; otherwise the issue is logged at `$level` and handed
/// back so the caller can attach it to the right issue list.
#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $issue:expr $(,)?) => {{
        let issue: $crate::structs::issue::Issue = $issue;
        if $level <= $state.fail_level {
            return Err($crate::utils::errors::ProbeError::Strict {
                name: $state.name.to_string(),
                issue,
            });
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}: {:#}", $state.name, issue),
                ::log::Level::Warn => ::log::warn!("{}: {:#}", $state.name, issue),
                ::log::Level::Info => ::log::info!("{}: {:#}", $state.name, issue),
                ::log::Level::Debug => ::log::debug!("{}: {:#}", $state.name, issue),
                ::log::Level::Trace => ::log::trace!("{}: {:#}", $state.name, issue),
            }
        }
        issue
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("Unexpected end of data at {position}: wanted {wanted} bytes, got {got}")]
    UnexpectedEof { position: u64, wanted: u64, got: u64 },

    #[error("Reset without a valid mark at {0}")]
    InvalidMark(u64),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ReadError {
    /// True for short reads, the only read failure that counts as truncation.
    pub fn is_eof(&self) -> bool {
        matches!(self, ReadError::UnexpectedEof { .. })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("Reserved MPEG audio version bits")]
    ReservedVersion,

    #[error("Reserved MPEG audio layer bits")]
    ReservedLayer,

    #[error("Free-format or invalid bitrate index {0}")]
    InvalidBitrate(u8),

    #[error("Reserved sample rate index")]
    ReservedSampleRate,

    #[error("Frame header bits: {0}")]
    Bits(#[from] io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum PageError {
    #[error("Unsupported Ogg stream structure version {0}")]
    UnsupportedVersion(u8),

    #[error("Page checksum mismatch. Calculated {calculated:#010X}, Read {read:#010X}")]
    ChecksumMismatch { calculated: u32, read: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum PacketError {
    #[error("Unsupported {codec} version {version}")]
    UnsupportedVersion { codec: &'static str, version: u32 },

    #[error("Invalid {codec} identification header: {reason}")]
    InvalidIdentification {
        codec: &'static str,
        reason: &'static str,
    },

    #[error("Missing identification packet on the first page")]
    MissingIdentification,

    #[error("Unexpected {codec} header packet type {kind:#04X}")]
    UnexpectedHeader { codec: &'static str, kind: u8 },

    #[error("Malformed {codec} {packet} packet: {reason}")]
    Malformed {
        codec: &'static str,
        packet: &'static str,
        reason: &'static str,
    },

    #[error("{codec} reader received {state} stream state")]
    StateMismatch {
        codec: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Structural faults with no meaningful local recovery.
#[derive(thiserror::Error, Debug)]
pub enum StreamError {
    #[error("Duplicate serial number {serial:#010X} in first page at {location}")]
    DuplicateSerial { serial: u32, location: u64 },

    #[error("Page for undeclared stream {serial:#010X} at {location}")]
    UndeclaredSerial { serial: u32, location: u64 },

    #[error("Unsupported codec ({codec}) for stream {serial:#010X} at {location}")]
    UnsupportedCodec {
        serial: u32,
        location: u64,
        codec: &'static str,
    },

    #[error("Codec {codec} for stream {serial:#010X} is not registered")]
    CodecNotRegistered { serial: u32, codec: &'static str },

    #[error("Invalid identification packet for stream {serial:#010X} at {location}: {source}")]
    InvalidIdentification {
        serial: u32,
        location: u64,
        #[source]
        source: PacketError,
    },

    #[error("Internal codec dispatch fault for stream {serial:#010X}: {source}")]
    Dispatch {
        serial: u32,
        #[source]
        source: PacketError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mpeg,
    Ogg,
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFormat::Mpeg => write!(f, "MPEG audio"),
            AudioFormat::Ogg => write!(f, "Ogg"),
        }
    }
}

/// Errors that end a parse without a result.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("{name}: not a valid {format} stream at {location}: {message}")]
    Format {
        name: String,
        format: AudioFormat,
        location: u64,
        message: String,
    },

    #[error("{name}: {source}")]
    Stream {
        name: String,
        #[source]
        source: StreamError,
    },

    #[error("{name}: {source}")]
    Read {
        name: String,
        #[source]
        source: ReadError,
    },

    #[error("{name}: strict mode: {issue:#}")]
    Strict { name: String, issue: Issue },
}

impl ProbeError {
    pub(crate) fn format(
        name: &str,
        format: AudioFormat,
        location: u64,
        message: impl Into<String>,
    ) -> Self {
        ProbeError::Format {
            name: name.to_string(),
            format,
            location,
            message: message.into(),
        }
    }

    pub(crate) fn stream(name: &str, source: StreamError) -> Self {
        ProbeError::Stream {
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn read(name: &str, source: ReadError) -> Self {
        ProbeError::Read {
            name: name.to_string(),
            source,
        }
    }
}
