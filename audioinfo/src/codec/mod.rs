//! Codec plugins for the Ogg demultiplexer.
//!
//! Each codec is recognized by the signature that opens its identification
//! packet. A codec reader parses that packet into [`StreamParams`] plus its own
//! state, then does the bookkeeping for every following packet of the stream.
//!
//! The set of codecs is closed: [`Codec`] dispatches statically to the
//! [`CodecReader`] implementations. Adding a codec means a new reader, a new
//! variant and a new signature; the demultiplexer is unaffected.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use crate::structs::issue::Issue;
use crate::structs::page::PacketSegment;
use crate::utils::errors::PacketError;
use crate::utils::reader::CountingReader;

pub mod opus;
pub mod vorbis;

use opus::{OpusReader, OpusState};
use vorbis::{VorbisReader, VorbisState};

/// Bytes peeked at the start of a stream to identify its codec.
pub const SIGNATURE_PEEK: usize = 8;

/// Codecs recognized only to name them in errors.
const UNSUPPORTED_SIGNATURES: [(&[u8], &str); 7] = [
    (b"\x80theora", "Theora"),
    (b"\x7fFLAC", "FLAC"),
    (b"Speex   ", "Speex"),
    (b"fishead\0", "Skeleton"),
    (b"\x80kate\0\0\0", "Kate"),
    (b"BBCD\0", "Dirac"),
    (b"\x01video\0\0", "OGM video"),
];

/// Stream parameters taken from an identification packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub channels: u8,
    pub sample_rate: u32,
    /// Granule positions count samples at this rate.
    pub granule_rate: u32,
    pub nominal_bitrate: Option<u32>,
}

/// Result of parsing an identification packet.
#[derive(Debug)]
pub struct Identified<S> {
    pub params: StreamParams,
    pub state: S,
    /// Recoverable anomalies found in the packet.
    pub issues: Vec<Issue>,
}

impl<S> Identified<S> {
    fn map_state<T>(self, f: impl FnOnce(S) -> T) -> Identified<T> {
        Identified {
            params: self.params,
            state: f(self.state),
            issues: self.issues,
        }
    }
}

/// Codec-specific packet handling.
pub trait CodecReader {
    type State: fmt::Debug + Clone;

    const NAME: &'static str;
    const SIGNATURE: &'static [u8];

    fn recognize(prefix: &[u8]) -> bool {
        prefix.starts_with(Self::SIGNATURE)
    }

    /// Parses the identification packet. The reader is positioned right after
    /// the signature; `segment.size` counts the signature too.
    fn read_identification<R: Read>(
        reader: &mut CountingReader<R>,
        segment: &PacketSegment,
    ) -> Result<Identified<Self::State>, PacketError>;

    /// Consumes one packet segment and updates the stream state.
    fn read_packet<R: Read>(
        state: &mut Self::State,
        reader: &mut CountingReader<R>,
        segment: &PacketSegment,
    ) -> Result<(), PacketError>;

    /// Playback time covered by `span` granules.
    fn granule_duration(_state: &Self::State, params: &StreamParams, span: u64) -> Duration {
        crate::utils::timing::duration_of(span, params.granule_rate)
    }

    /// Duration estimated from accumulated payload size, if the codec can.
    fn payload_duration(_state: &Self::State, _params: &StreamParams) -> Option<Duration> {
        None
    }

    fn payload_bytes(state: &Self::State) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Vorbis,
    Opus,
}

impl Codec {
    pub const ALL: [Codec; 2] = [Codec::Vorbis, Codec::Opus];

    pub fn name(self) -> &'static str {
        match self {
            Codec::Vorbis => VorbisReader::NAME,
            Codec::Opus => OpusReader::NAME,
        }
    }

    pub fn signature(self) -> &'static [u8] {
        match self {
            Codec::Vorbis => VorbisReader::SIGNATURE,
            Codec::Opus => OpusReader::SIGNATURE,
        }
    }

    pub fn recognize(self, prefix: &[u8]) -> bool {
        match self {
            Codec::Vorbis => VorbisReader::recognize(prefix),
            Codec::Opus => OpusReader::recognize(prefix),
        }
    }

    /// Every registered codec carries audio. Non-audio codecs such as Theora
    /// never reach a stream; they are rejected as unsupported when the
    /// identification page is read.
    pub fn is_audio(self) -> bool {
        match self {
            Codec::Vorbis | Codec::Opus => true,
        }
    }

    pub fn read_identification<R: Read>(
        self,
        reader: &mut CountingReader<R>,
        segment: &PacketSegment,
    ) -> Result<Identified<CodecState>, PacketError> {
        match self {
            Codec::Vorbis => Ok(VorbisReader::read_identification(reader, segment)?
                .map_state(CodecState::Vorbis)),
            Codec::Opus => {
                Ok(OpusReader::read_identification(reader, segment)?.map_state(CodecState::Opus))
            }
        }
    }

    pub fn read_packet<R: Read>(
        self,
        state: &mut CodecState,
        reader: &mut CountingReader<R>,
        segment: &PacketSegment,
    ) -> Result<(), PacketError> {
        match (self, state) {
            (Codec::Vorbis, CodecState::Vorbis(state)) => {
                VorbisReader::read_packet(state, reader, segment)
            }
            (Codec::Opus, CodecState::Opus(state)) => OpusReader::read_packet(state, reader, segment),
            (codec, state) => Err(PacketError::StateMismatch {
                codec: codec.name(),
                state: state.codec().name(),
            }),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Per-stream state owned by the codec reader.
#[derive(Debug, Clone)]
pub enum CodecState {
    Vorbis(VorbisState),
    Opus(OpusState),
}

impl CodecState {
    pub fn codec(&self) -> Codec {
        match self {
            CodecState::Vorbis(_) => Codec::Vorbis,
            CodecState::Opus(_) => Codec::Opus,
        }
    }

    pub fn payload_bytes(&self) -> u64 {
        match self {
            CodecState::Vorbis(state) => VorbisReader::payload_bytes(state),
            CodecState::Opus(state) => OpusReader::payload_bytes(state),
        }
    }

    pub fn vendor(&self) -> Option<&str> {
        match self {
            CodecState::Vorbis(state) => state.vendor.as_deref(),
            CodecState::Opus(state) => state.vendor.as_deref(),
        }
    }

    pub fn granule_duration(&self, params: &StreamParams, span: u64) -> Duration {
        match self {
            CodecState::Vorbis(state) => VorbisReader::granule_duration(state, params, span),
            CodecState::Opus(state) => OpusReader::granule_duration(state, params, span),
        }
    }

    pub fn payload_duration(&self, params: &StreamParams) -> Option<Duration> {
        match self {
            CodecState::Vorbis(state) => VorbisReader::payload_duration(state, params),
            CodecState::Opus(state) => OpusReader::payload_duration(state, params),
        }
    }
}

/// The codecs a demultiplexer will accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecRegistry {
    codecs: Vec<Codec>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new(Codec::ALL)
    }
}

impl CodecRegistry {
    pub fn new(codecs: impl IntoIterator<Item = Codec>) -> Self {
        let mut registry = Self { codecs: Vec::new() };
        for codec in codecs {
            if !registry.codecs.contains(&codec) {
                registry.codecs.push(codec);
            }
        }
        registry
    }

    /// Matches the first bytes of a stream against the registered signatures.
    pub fn identify(&self, prefix: &[u8]) -> Option<Codec> {
        self.codecs
            .iter()
            .copied()
            .find(|codec| codec.recognize(prefix))
    }

    /// Looks a codec up by identity.
    pub fn lookup(&self, codec: Codec) -> Option<Codec> {
        self.codecs.iter().copied().find(|&c| c == codec)
    }

    pub fn codecs(&self) -> &[Codec] {
        &self.codecs
    }

    /// Names the codec behind an unsupported signature, if it is a known one.
    pub fn describe_unsupported(prefix: &[u8]) -> &'static str {
        Codec::ALL
            .iter()
            .find(|codec| codec.recognize(prefix))
            .map(|codec| codec.name())
            .or_else(|| {
                UNSUPPORTED_SIGNATURES
                    .iter()
                    .find(|(signature, _)| prefix.starts_with(signature))
                    .map(|&(_, name)| name)
            })
            .unwrap_or("unrecognized")
    }
}

/// Vendor string and comment count of a Vorbis-comment style header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommentHeader {
    pub vendor: String,
    pub comment_count: u32,
    /// Bytes consumed from the reader.
    pub consumed: u64,
}

/// Reads the vendor string and comment count, staying within `available` bytes.
pub(crate) fn read_comment_header<R: Read>(
    reader: &mut CountingReader<R>,
    available: u64,
    codec: &'static str,
) -> Result<CommentHeader, PacketError> {
    let malformed = |reason: &'static str| PacketError::Malformed {
        codec,
        packet: "comment",
        reason,
    };

    if available < 8 {
        return Err(malformed("comment header too short"));
    }
    let vendor_len = reader.read_u32_le()? as u64;
    if vendor_len + 8 > available {
        return Err(malformed("vendor string exceeds packet"));
    }
    let vendor = reader.read_bytes(vendor_len as usize)?;
    let comment_count = reader.read_u32_le()?;

    Ok(CommentHeader {
        vendor: String::from_utf8_lossy(&vendor).into_owned(),
        comment_count,
        consumed: vendor_len + 8,
    })
}
