#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Two container families are supported, each with its own anchor:
//!
//! - **MPEG audio**: self-delimiting frames starting with an 11-bit sync
//!   pattern. The header alone gives the frame length and sample count.
//! - **Ogg**: pages starting with `OggS`, carrying lacing-delimited packet
//!   segments for one or more logical streams.
//!
//! Both parsers read sequentially through a position-counting reader and
//! never seek. Anything unexpected between anchors is recorded as an
//! [`Issue`](structs::issue::Issue) at its byte offset and the parser
//! resynchronizes on the next anchor.
//!
//! ### Durations
//!
//! Frame durations are accumulated as exact sample counts per sample rate and
//! converted once, so that long files do not drift. Ogg durations come from
//! the span of granule positions; Vorbis streams additionally offer a bit-count
//! estimate as a cross-check.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use audioinfo::process::frames::FrameParser;
//! use audioinfo::process::pages::PageDemuxer;
//!
//! let mp3 = FrameParser::default().parse_path("track.mp3")?;
//! println!("{:?}, {} issues", mp3.duration(), mp3.issues.len());
//!
//! let mut demuxer = PageDemuxer::default();
//! demuxer.set_fail_level(log::Level::Warn);
//! let vorbis = demuxer.parse_path("track.ogg")?;
//! println!("{} {:?}", vorbis.codec, vorbis.duration());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Codec plugins for Ogg logical streams.
///
/// - **Registry** ([`codec::CodecRegistry`]): Enabled codecs and signature matching
/// - **Vorbis** ([`codec::vorbis`]): Identification, comment and audio packets
/// - **Opus** ([`codec::opus`]): `OpusHead`, `OpusTags` and pre-skip handling
pub mod codec;

/// Parsers for audio containers.
///
/// 1. **Frames** ([`process::frames`]): MPEG audio frame scanning with
///    tag skipping and resynchronization.
///
/// 2. **Pages** ([`process::pages`]): Ogg page demultiplexing into logical
///    streams.
pub mod process;

/// Data structures representing format components.
///
/// - **Frames** ([`structs::frame`]): MPEG audio header decoding
/// - **Tags** ([`structs::tag`]): ID3v2 headers and trailing tag markers
/// - **Pages** ([`structs::page`]): Ogg page headers and lacing
/// - **Issues** ([`structs::issue`]): Recoverable anomalies
/// - **Streams** ([`structs::stream`]): Parse results
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Reader** ([`utils::reader`]): Position-counting reader with mark/reset
/// - **CRC Validation** ([`utils::crc`]): Ogg page checksums
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Timing** ([`utils::timing`]): Exact sample-count durations
pub mod utils;
