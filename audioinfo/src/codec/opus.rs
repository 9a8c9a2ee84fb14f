//! Opus packet bookkeeping.
//!
//! `OpusHead` carries the channel count, pre-skip and the original input
//! rate; the mandatory `OpusTags` packet follows. Granule positions always
//! count 48 kHz samples, and the first `pre_skip` of them are not played.

use std::io::Read;
use std::time::Duration;

use log::{debug, trace};

use super::{CodecReader, Identified, StreamParams, read_comment_header};
use crate::structs::page::PacketSegment;
use crate::utils::errors::PacketError;
use crate::utils::reader::CountingReader;
use crate::utils::timing::duration_of;

pub const OPUS_SIGNATURE: &[u8] = b"OpusHead";
pub const OPUS_TAGS: &[u8; 8] = b"OpusTags";
pub const OPUS_GRANULE_RATE: u32 = 48000;

const HEAD_LEN: u32 = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacketKind {
    Head,
    Tags,
    Audio,
}

#[derive(Debug, Clone, Default)]
pub struct OpusState {
    pub version: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    /// Q7.8 dB.
    pub output_gain: i16,
    pub mapping_family: u8,
    pub stream_count: Option<u8>,
    pub coupled_count: Option<u8>,
    pub vendor: Option<String>,
    pub comment_count: Option<u32>,
    pub tags_seen: bool,
    pub audio_packets: u64,
    pub payload_bytes: u64,
    open: Option<PacketKind>,
}

pub struct OpusReader;

impl CodecReader for OpusReader {
    type State = OpusState;

    const NAME: &'static str = "Opus";
    const SIGNATURE: &'static [u8] = OPUS_SIGNATURE;

    fn read_identification<R: Read>(
        reader: &mut CountingReader<R>,
        segment: &PacketSegment,
    ) -> Result<Identified<OpusState>, PacketError> {
        let invalid = |reason: &'static str| PacketError::InvalidIdentification {
            codec: Self::NAME,
            reason,
        };

        if segment.size < HEAD_LEN {
            return Err(invalid("OpusHead packet too short"));
        }

        let version = reader.read_u8()?;
        if version >> 4 != 0 {
            return Err(PacketError::UnsupportedVersion {
                codec: Self::NAME,
                version: version as u32,
            });
        }

        let channels = reader.read_u8()?;
        if channels == 0 {
            return Err(invalid("zero channels"));
        }

        let mut state = OpusState {
            version,
            pre_skip: reader.read_u16_le()?,
            input_sample_rate: reader.read_u32_le()?,
            output_gain: reader.read_i16_le()?,
            mapping_family: reader.read_u8()?,
            ..Default::default()
        };

        let mut consumed = HEAD_LEN;
        if state.mapping_family != 0 {
            let table_len = 2 + channels as u32;
            if segment.size < consumed + table_len {
                return Err(invalid("channel mapping table truncated"));
            }
            state.stream_count = Some(reader.read_u8()?);
            state.coupled_count = Some(reader.read_u8()?);
            reader.skip(channels as u64)?;
            consumed += table_len;
        }
        reader.skip((segment.size - consumed) as u64)?;
        state.open = (!segment.finished).then_some(PacketKind::Head);

        debug!(
            "Opus: {channels} channels, input rate {} Hz, pre-skip {}",
            state.input_sample_rate, state.pre_skip
        );

        let sample_rate = match state.input_sample_rate {
            0 => OPUS_GRANULE_RATE,
            rate => rate,
        };

        Ok(Identified {
            params: StreamParams {
                channels,
                sample_rate,
                granule_rate: OPUS_GRANULE_RATE,
                nominal_bitrate: None,
            },
            state,
            issues: Vec::new(),
        })
    }

    fn read_packet<R: Read>(
        state: &mut OpusState,
        reader: &mut CountingReader<R>,
        segment: &PacketSegment,
    ) -> Result<(), PacketError> {
        let size = segment.size as u64;

        if segment.continued {
            let kind = state.open.take();
            if kind == Some(PacketKind::Audio) {
                state.payload_bytes += size;
            }
            reader.skip(size)?;
            if !segment.finished {
                state.open = kind;
            }
            return Ok(());
        }

        if size == 0 {
            return Ok(());
        }

        let kind = if state.tags_seen {
            state.audio_packets += 1;
            state.payload_bytes += size;
            reader.skip(size)?;
            PacketKind::Audio
        } else {
            if size < OPUS_TAGS.len() as u64 {
                return Err(PacketError::Malformed {
                    codec: Self::NAME,
                    packet: "comment",
                    reason: "packet too short for OpusTags",
                });
            }
            let magic = reader.read_bytes(OPUS_TAGS.len())?;
            if magic != OPUS_TAGS {
                return Err(PacketError::Malformed {
                    codec: Self::NAME,
                    packet: "comment",
                    reason: "expected OpusTags after OpusHead",
                });
            }

            let available = size - OPUS_TAGS.len() as u64;
            if segment.finished {
                let comment = read_comment_header(reader, available, Self::NAME)?;
                reader.skip(available - comment.consumed)?;
                state.vendor = Some(comment.vendor);
                state.comment_count = Some(comment.comment_count);
            } else {
                reader.skip(available)?;
            }
            state.tags_seen = true;
            PacketKind::Tags
        };
        trace!("Opus {kind:?} packet, {size} bytes");

        state.open = (!segment.finished).then_some(kind);

        Ok(())
    }

    fn granule_duration(state: &OpusState, params: &StreamParams, span: u64) -> Duration {
        duration_of(span.saturating_sub(state.pre_skip as u64), params.granule_rate)
    }

    fn payload_bytes(state: &OpusState) -> u64 {
        state.payload_bytes
    }
}
