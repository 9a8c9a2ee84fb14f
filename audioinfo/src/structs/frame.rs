//! MPEG audio frame headers and geometry.
//!
//! ## Header Layout
//!
//! ```text
//! AAAAAAAA AAABBCCD EEEEFFGH IIJJKLMM
//! A sync (11)   B version     C layer       D protection
//! E bitrate     F sample rate G padding     H private
//! I mode        J extension   K copyright   L original   M emphasis
//! ```
//!
//! Bit rates, sample rates and samples per frame are plain table lookups keyed
//! by version and layer. The bitrate row is selected by the version family
//! (MPEG-1 vs. MPEG-2/2.5) and the layer.

use std::fmt;

use bitstream_io::{BigEndian, BitRead, BitReader};

use crate::utils::errors::FrameError;

/// Top 11 bits of every frame header.
pub const FRAME_SYNC_MASK: u32 = 0xFFE0_0000;

pub const HEADER_LEN: u32 = 4;

/// Kilobits per second, `0` marks free format, index 15 is invalid.
const BITRATES_KBPS: [[u16; 16]; 6] = [
    // MPEG-1 Layer I, II, III
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
    // MPEG-2/2.5 Layer I, II, III
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
];

const SAMPLE_RATES: [[u32; 3]; 3] = [
    [44100, 48000, 32000],
    [22050, 24000, 16000],
    [11025, 12000, 8000],
];

const SAMPLES_PER_FRAME: [[u32; 3]; 2] = [[384, 1152, 1152], [384, 1152, 576]];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    V1,
    V2,
    V25,
}

impl MpegVersion {
    fn from_bits(bits: u8) -> Result<Self, FrameError> {
        match bits {
            0b11 => Ok(MpegVersion::V1),
            0b10 => Ok(MpegVersion::V2),
            0b00 => Ok(MpegVersion::V25),
            _ => Err(FrameError::ReservedVersion),
        }
    }

    fn index(self) -> usize {
        match self {
            MpegVersion::V1 => 0,
            MpegVersion::V2 => 1,
            MpegVersion::V25 => 2,
        }
    }

    fn family(self) -> usize {
        match self {
            MpegVersion::V1 => 0,
            MpegVersion::V2 | MpegVersion::V25 => 1,
        }
    }
}

impl fmt::Display for MpegVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MpegVersion::V1 => write!(f, "MPEG-1"),
            MpegVersion::V2 => write!(f, "MPEG-2"),
            MpegVersion::V25 => write!(f, "MPEG-2.5"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    I,
    II,
    III,
}

impl Layer {
    fn from_bits(bits: u8) -> Result<Self, FrameError> {
        match bits {
            0b11 => Ok(Layer::I),
            0b10 => Ok(Layer::II),
            0b01 => Ok(Layer::III),
            _ => Err(FrameError::ReservedLayer),
        }
    }

    fn index(self) -> usize {
        match self {
            Layer::I => 0,
            Layer::II => 1,
            Layer::III => 2,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::I => write!(f, "Layer I"),
            Layer::II => write!(f, "Layer II"),
            Layer::III => write!(f, "Layer III"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

impl ChannelMode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => ChannelMode::Stereo,
            0b01 => ChannelMode::JointStereo,
            0b10 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        }
    }

    pub fn channels(self) -> u8 {
        match self {
            ChannelMode::Mono => 1,
            _ => 2,
        }
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Stereo => write!(f, "Stereo"),
            ChannelMode::JointStereo => write!(f, "Joint stereo"),
            ChannelMode::DualChannel => write!(f, "Dual channel"),
            ChannelMode::Mono => write!(f, "Mono"),
        }
    }
}

/// Everything derivable from one frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub version: MpegVersion,
    pub layer: Layer,
    pub protected: bool,
    pub mode: ChannelMode,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub samples: u32,
    pub padding: bool,
    /// Total frame length in bytes, header included.
    pub length: u32,
}

impl FrameGeometry {
    pub fn channels(&self) -> u8 {
        self.mode.channels()
    }

    /// Bytes following the header.
    pub fn payload_len(&self) -> u32 {
        self.length.saturating_sub(HEADER_LEN)
    }
}

pub fn is_sync(word: u32) -> bool {
    word & FRAME_SYNC_MASK == FRAME_SYNC_MASK
}

/// Raw header fields as they appear in the bitstream.
#[derive(Debug, Clone, Copy, Default)]
struct RawHeader {
    version: u8,
    layer: u8,
    protection_absent: bool,
    bitrate_index: u8,
    sample_rate_index: u8,
    padding: bool,
    mode: u8,
}

impl RawHeader {
    fn read(word: u32) -> std::io::Result<Self> {
        let bytes = word.to_be_bytes();
        let mut bs = BitReader::endian(&bytes[..], BigEndian);

        bs.skip(11)?;
        let version = bs.read_unsigned_var::<u8>(2)?;
        let layer = bs.read_unsigned_var::<u8>(2)?;
        let protection_absent = bs.read_bit()?;
        let bitrate_index = bs.read_unsigned_var::<u8>(4)?;
        let sample_rate_index = bs.read_unsigned_var::<u8>(2)?;
        let padding = bs.read_bit()?;
        bs.skip(1)?;
        let mode = bs.read_unsigned_var::<u8>(2)?;

        Ok(Self {
            version,
            layer,
            protection_absent,
            bitrate_index,
            sample_rate_index,
            padding,
            mode,
        })
    }
}

impl FrameGeometry {
    /// Decodes a header word whose sync bits are already known to be set.
    pub fn decode(word: u32) -> Result<Self, FrameError> {
        let raw = RawHeader::read(word)?;

        let version = MpegVersion::from_bits(raw.version)?;
        let layer = Layer::from_bits(raw.layer)?;

        let bitrate_kbps =
            BITRATES_KBPS[version.family() * 3 + layer.index()][raw.bitrate_index as usize] as u32;
        if bitrate_kbps == 0 {
            return Err(FrameError::InvalidBitrate(raw.bitrate_index));
        }

        let sample_rate = *SAMPLE_RATES[version.index()]
            .get(raw.sample_rate_index as usize)
            .ok_or(FrameError::ReservedSampleRate)?;

        let samples = SAMPLES_PER_FRAME[version.family()][layer.index()];
        let padding = raw.padding as u32;

        let length = match layer {
            Layer::I => (12 * bitrate_kbps * 1000 / sample_rate + padding) * 4,
            Layer::II | Layer::III => (samples / 8) * bitrate_kbps * 1000 / sample_rate + padding,
        };

        Ok(Self {
            version,
            layer,
            protected: !raw.protection_absent,
            mode: ChannelMode::from_bits(raw.mode),
            bitrate_kbps,
            sample_rate,
            samples,
            padding: raw.padding,
            length,
        })
    }
}

#[test]
fn test_mpeg1_layer3() {
    let geometry = FrameGeometry::decode(0xFFFB_9000).unwrap();
    assert_eq!(geometry.version, MpegVersion::V1);
    assert_eq!(geometry.layer, Layer::III);
    assert_eq!(geometry.bitrate_kbps, 128);
    assert_eq!(geometry.sample_rate, 44100);
    assert_eq!(geometry.samples, 1152);
    assert_eq!(geometry.length, 417);
    assert_eq!(geometry.channels(), 2);
    assert!(!geometry.protected);

    let padded = FrameGeometry::decode(0xFFFB_9200).unwrap();
    assert_eq!(padded.length, 418);

    let mono = FrameGeometry::decode(0xFFFB_94C0).unwrap();
    assert_eq!(mono.sample_rate, 48000);
    assert_eq!(mono.length, 384);
    assert_eq!(mono.channels(), 1);
}

#[test]
fn test_mpeg2_and_25() {
    let mpeg2 = FrameGeometry::decode(0xFFF3_8000).unwrap();
    assert_eq!(mpeg2.version, MpegVersion::V2);
    assert_eq!(mpeg2.bitrate_kbps, 64);
    assert_eq!(mpeg2.sample_rate, 22050);
    assert_eq!(mpeg2.samples, 576);
    assert_eq!(mpeg2.length, 208);

    // MPEG-2.5 Layer III, 8 kbps, 8 kHz
    let mpeg25 = FrameGeometry::decode(0xFFE2_1800).unwrap();
    assert_eq!(mpeg25.version, MpegVersion::V25);
    assert_eq!(mpeg25.sample_rate, 8000);
    assert_eq!(mpeg25.length, 72);
}

#[test]
fn test_layer1_and_layer2() {
    // MPEG-1 Layer I, 32 kbps, 32 kHz
    let layer1 = FrameGeometry::decode(0xFFFF_1800).unwrap();
    assert_eq!(layer1.layer, Layer::I);
    assert_eq!(layer1.samples, 384);
    assert_eq!(layer1.length, 48);

    // MPEG-1 Layer II, 192 kbps, 48 kHz
    let layer2 = FrameGeometry::decode(0xFFFD_A400).unwrap();
    assert_eq!(layer2.layer, Layer::II);
    assert_eq!(layer2.samples, 1152);
    assert_eq!(layer2.length, 576);
}

#[test]
fn test_reserved_code_points() {
    assert!(matches!(
        FrameGeometry::decode(0xFFEB_9000),
        Err(FrameError::ReservedVersion)
    ));
    assert!(matches!(
        FrameGeometry::decode(0xFFF9_9000),
        Err(FrameError::ReservedLayer)
    ));
    assert!(matches!(
        FrameGeometry::decode(0xFFFB_F000),
        Err(FrameError::InvalidBitrate(15))
    ));
    assert!(matches!(
        FrameGeometry::decode(0xFFFB_0000),
        Err(FrameError::InvalidBitrate(0))
    ));
    assert!(matches!(
        FrameGeometry::decode(0xFFFB_9C00),
        Err(FrameError::ReservedSampleRate)
    ));
    assert!(is_sync(0xFFE0_0000));
    assert!(!is_sync(0xFFC0_0000));
}
