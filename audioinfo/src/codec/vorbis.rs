//! Vorbis packet bookkeeping.
//!
//! The identification header is a fixed 30-byte packet:
//!
//! ```text
//! 0x01 "vorbis" | version u32 | channels u8 | rate u32 |
//! bitrate max i32 | nominal i32 | min i32 | blocksizes u8 | framing u8
//! ```
//!
//! Comment (type 3) and setup (type 5) headers follow. Audio packets have the
//! low bit of their first byte cleared.

use std::io::Read;
use std::time::Duration;

use log::{debug, trace};

use super::{CodecReader, Identified, StreamParams, read_comment_header};
use crate::structs::issue::{BOS_SEGMENT_SIZE, Issue};
use crate::structs::page::PacketSegment;
use crate::utils::errors::PacketError;
use crate::utils::reader::CountingReader;

pub const VORBIS_SIGNATURE: &[u8] = b"\x01vorbis";
pub const IDENTIFICATION_LEN: u32 = 30;

const HEADER_MAGIC: &[u8; 6] = b"vorbis";

const PACKET_COMMENT: u8 = 0x03;
const PACKET_SETUP: u8 = 0x05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PacketKind {
    Identification,
    Comment,
    Setup,
    Audio,
}

#[derive(Debug, Clone, Default)]
pub struct VorbisState {
    pub version: u32,
    pub bitrate_maximum: i32,
    pub bitrate_nominal: i32,
    pub bitrate_minimum: i32,
    pub blocksize_short: u32,
    pub blocksize_long: u32,
    pub vendor: Option<String>,
    pub comment_count: Option<u32>,
    pub comment_seen: bool,
    pub setup_seen: bool,
    pub audio_packets: u64,
    /// Audio packet bytes, packet type byte excluded.
    pub payload_bytes: u64,
    open: Option<PacketKind>,
}

impl VorbisState {
    /// Bit rate to divide payload bits by: nominal, else maximum, else minimum.
    ///
    /// Only a hint for variable bit rate streams.
    pub fn bitrate_hint(&self) -> Option<u32> {
        [
            self.bitrate_nominal,
            self.bitrate_maximum,
            self.bitrate_minimum,
        ]
        .into_iter()
        .find(|&rate| rate > 0)
        .map(|rate| rate as u32)
    }
}

pub struct VorbisReader;

impl VorbisReader {
    fn consume<R: Read>(
        state: &mut VorbisState,
        reader: &mut CountingReader<R>,
        kind: PacketKind,
        len: u64,
    ) -> Result<(), PacketError> {
        if kind == PacketKind::Audio {
            state.payload_bytes += len;
        }
        reader.skip(len)?;

        Ok(())
    }

    fn read_comment<R: Read>(
        state: &mut VorbisState,
        reader: &mut CountingReader<R>,
        len: u64,
    ) -> Result<(), PacketError> {
        let malformed = |reason: &'static str| PacketError::Malformed {
            codec: Self::NAME,
            packet: "comment",
            reason,
        };

        if len < HEADER_MAGIC.len() as u64 {
            return Err(malformed("header too short"));
        }
        let magic = reader.read_bytes(HEADER_MAGIC.len())?;
        if magic != HEADER_MAGIC {
            return Err(malformed("missing vorbis magic"));
        }

        let available = len - HEADER_MAGIC.len() as u64;
        let comment = read_comment_header(reader, available, Self::NAME)?;
        debug!(
            "Vorbis vendor \"{}\", {} comments",
            comment.vendor, comment.comment_count
        );
        state.vendor = Some(comment.vendor);
        state.comment_count = Some(comment.comment_count);
        reader.skip(available - comment.consumed)?;

        Ok(())
    }
}

impl CodecReader for VorbisReader {
    type State = VorbisState;

    const NAME: &'static str = "Vorbis";
    const SIGNATURE: &'static [u8] = VORBIS_SIGNATURE;

    fn read_identification<R: Read>(
        reader: &mut CountingReader<R>,
        segment: &PacketSegment,
    ) -> Result<Identified<VorbisState>, PacketError> {
        let start = reader.position() - Self::SIGNATURE.len() as u64;
        let invalid = |reason: &'static str| PacketError::InvalidIdentification {
            codec: Self::NAME,
            reason,
        };

        if segment.size < IDENTIFICATION_LEN {
            return Err(invalid("identification packet too short"));
        }

        let version = reader.read_u32_le()?;
        if version != 0 {
            return Err(PacketError::UnsupportedVersion {
                codec: Self::NAME,
                version,
            });
        }

        let channels = reader.read_u8()?;
        let sample_rate = reader.read_u32_le()?;
        let bitrate_maximum = reader.read_i32_le()?;
        let bitrate_nominal = reader.read_i32_le()?;
        let bitrate_minimum = reader.read_i32_le()?;
        let blocksizes = reader.read_u8()?;
        let _framing = reader.read_u8()?;

        if channels == 0 {
            return Err(invalid("zero channels"));
        }
        if sample_rate == 0 {
            return Err(invalid("zero sample rate"));
        }

        let mut issues = Vec::new();
        if segment.size != IDENTIFICATION_LEN {
            issues.push(Issue::other(start).with_meta(BOS_SEGMENT_SIZE, segment.size));
            reader.skip((segment.size - IDENTIFICATION_LEN) as u64)?;
        }

        let state = VorbisState {
            version,
            bitrate_maximum,
            bitrate_nominal,
            bitrate_minimum,
            blocksize_short: 1 << (blocksizes & 0x0F),
            blocksize_long: 1 << (blocksizes >> 4),
            open: (!segment.finished).then_some(PacketKind::Identification),
            ..Default::default()
        };

        debug!(
            "Vorbis: {channels} channels, {sample_rate} Hz, nominal bitrate {bitrate_nominal}"
        );

        Ok(Identified {
            params: StreamParams {
                channels,
                sample_rate,
                granule_rate: sample_rate,
                nominal_bitrate: state.bitrate_hint(),
            },
            state,
            issues,
        })
    }

    fn read_packet<R: Read>(
        state: &mut VorbisState,
        reader: &mut CountingReader<R>,
        segment: &PacketSegment,
    ) -> Result<(), PacketError> {
        if segment.continued {
            let kind = state.open.take();
            match kind {
                Some(kind) => Self::consume(state, reader, kind, segment.size as u64)?,
                None => reader.skip(segment.size as u64)?,
            }
            if !segment.finished {
                state.open = kind;
            }
            return Ok(());
        }

        if segment.size == 0 {
            return Ok(());
        }

        let packet_type = reader.read_u8()?;
        let rest = segment.size as u64 - 1;

        let kind = if packet_type & 1 == 0 {
            PacketKind::Audio
        } else {
            match packet_type {
                PACKET_COMMENT => PacketKind::Comment,
                PACKET_SETUP => PacketKind::Setup,
                _ => {
                    return Err(PacketError::UnexpectedHeader {
                        codec: Self::NAME,
                        kind: packet_type,
                    });
                }
            }
        };
        trace!("Vorbis {kind:?} packet, {} bytes", segment.size);

        match kind {
            PacketKind::Audio => state.audio_packets += 1,
            PacketKind::Comment => state.comment_seen = true,
            PacketKind::Setup => state.setup_seen = true,
            PacketKind::Identification => {}
        }

        if kind == PacketKind::Comment && segment.finished {
            Self::read_comment(state, reader, rest)?;
        } else {
            Self::consume(state, reader, kind, rest)?;
        }

        state.open = (!segment.finished).then_some(kind);

        Ok(())
    }

    fn payload_duration(state: &VorbisState, _params: &StreamParams) -> Option<Duration> {
        let hint = state.bitrate_hint()?;
        Some(Duration::from_secs_f64(
            (state.payload_bytes * 8) as f64 / hint as f64,
        ))
    }

    fn payload_bytes(state: &VorbisState) -> u64 {
        state.payload_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fixtures::{vorbis_audio_packet, vorbis_comment_packet, vorbis_id_packet};

    fn segment(size: usize, finished: bool, continued: bool) -> PacketSegment {
        PacketSegment {
            size: size as u32,
            finished,
            continued,
        }
    }

    fn identify(packet: &[u8]) -> Result<Identified<VorbisState>, PacketError> {
        let mut reader = CountingReader::new(packet);
        reader.skip(VORBIS_SIGNATURE.len() as u64)?;
        VorbisReader::read_identification(&mut reader, &segment(packet.len(), true, false))
    }

    #[test]
    fn test_identification() {
        let identified = identify(&vorbis_id_packet(2, 44100, 128_000)).unwrap();
        assert_eq!(identified.params.channels, 2);
        assert_eq!(identified.params.sample_rate, 44100);
        assert_eq!(identified.params.nominal_bitrate, Some(128_000));
        assert_eq!(identified.state.blocksize_short, 256);
        assert_eq!(identified.state.blocksize_long, 2048);
        assert!(identified.issues.is_empty());
    }

    #[test]
    fn test_identification_size_mismatch() {
        let mut packet = vorbis_id_packet(1, 8000, 0);
        packet.extend_from_slice(&[0; 4]);

        let identified = identify(&packet).unwrap();
        assert_eq!(identified.params.nominal_bitrate, None);
        assert_eq!(
            identified.issues,
            vec![Issue::other(0).with_meta(BOS_SEGMENT_SIZE, 34u32)]
        );
    }

    #[test]
    fn test_identification_rejects_bad_fields() {
        assert!(matches!(
            identify(&vorbis_id_packet(0, 44100, 0)),
            Err(PacketError::InvalidIdentification { .. })
        ));
        assert!(matches!(
            identify(&vorbis_id_packet(2, 0, 0)),
            Err(PacketError::InvalidIdentification { .. })
        ));

        let mut versioned = vorbis_id_packet(2, 44100, 0);
        versioned[7] = 1;
        assert!(matches!(
            identify(&versioned),
            Err(PacketError::UnsupportedVersion { version: 1, .. })
        ));

        assert!(matches!(
            identify(&vorbis_id_packet(2, 44100, 0)[..20]),
            Err(PacketError::InvalidIdentification { .. })
        ));
    }

    #[test]
    fn test_bitrate_hint_order() {
        let state = VorbisState {
            bitrate_maximum: 320_000,
            bitrate_minimum: 32_000,
            ..Default::default()
        };
        assert_eq!(state.bitrate_hint(), Some(320_000));

        let state = VorbisState {
            bitrate_minimum: 32_000,
            ..Default::default()
        };
        assert_eq!(state.bitrate_hint(), Some(32_000));
        assert_eq!(VorbisState::default().bitrate_hint(), None);
    }

    #[test]
    fn test_packets() {
        let comment = vorbis_comment_packet("Xiph.Org libVorbis", 3);
        let audio = vorbis_audio_packet(100);
        let data = [comment.as_slice(), audio.as_slice()].concat();

        let mut state = VorbisState::default();
        let mut reader = CountingReader::new(&data[..]);
        VorbisReader::read_packet(&mut state, &mut reader, &segment(comment.len(), true, false))
            .unwrap();
        VorbisReader::read_packet(&mut state, &mut reader, &segment(audio.len(), true, false))
            .unwrap();

        assert_eq!(state.vendor.as_deref(), Some("Xiph.Org libVorbis"));
        assert_eq!(state.comment_count, Some(3));
        assert_eq!(state.audio_packets, 1);
        assert_eq!(state.payload_bytes, 99);
        assert_eq!(reader.position(), data.len() as u64);
    }

    #[test]
    fn test_continued_audio_packet() {
        let audio = vorbis_audio_packet(400);
        let mut state = VorbisState::default();
        let mut reader = CountingReader::new(&audio[..]);

        VorbisReader::read_packet(&mut state, &mut reader, &segment(255, false, false)).unwrap();
        VorbisReader::read_packet(&mut state, &mut reader, &segment(145, true, true)).unwrap();

        assert_eq!(state.audio_packets, 1);
        assert_eq!(state.payload_bytes, 399);
        assert_eq!(state.open, None);
    }

    #[test]
    fn test_unexpected_headers() {
        let mut state = VorbisState::default();
        let id = vorbis_id_packet(2, 44100, 0);
        let mut reader = CountingReader::new(&id[..]);
        assert!(matches!(
            VorbisReader::read_packet(&mut state, &mut reader, &segment(id.len(), true, false)),
            Err(PacketError::UnexpectedHeader { kind: 1, .. })
        ));

        let mut reader = CountingReader::new(&[0x07, 0, 0][..]);
        assert!(matches!(
            VorbisReader::read_packet(&mut state, &mut reader, &segment(3, true, false)),
            Err(PacketError::UnexpectedHeader { kind: 7, .. })
        ));

        let mut reader = CountingReader::new(&[0u8; 0][..]);
        VorbisReader::read_packet(&mut state, &mut reader, &segment(0, true, false)).unwrap();
    }
}
