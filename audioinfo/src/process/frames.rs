use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, trace};

use crate::log_or_err;
use crate::process::resync::{Resync, resync};
use crate::structs::frame::{FrameGeometry, HEADER_LEN, is_sync};
use crate::structs::issue::{Issue, TRAILING_BYTES};
use crate::structs::stream::MpegInfo;
use crate::structs::tag::{ID3V2_MAGIC, Id3v2Header, TRAILING_TAG_PEEK, TrailingTag};
use crate::utils::errors::{AudioFormat, ProbeError, ReadError};
use crate::utils::reader::CountingReader;

/// Scans MPEG audio frames and accumulates their duration.
///
/// Leading zero padding and ID3v2 blocks are skipped, then every frame header
/// is decoded and its payload skipped. Corrupt headers and garbage between
/// frames are recorded as issues and the scan resynchronizes on the next
/// valid header. A trailing ID3v1, Lyrics3 or APE tag ends the scan.
///
/// # Example
///
/// ```rust,no_run
/// use audioinfo::process::frames::FrameParser;
///
/// let parser = FrameParser::default();
/// let info = parser.parse_path("track.mp3")?;
///
/// println!("{} frames, {:?}", info.frame_count, info.duration());
/// for issue in &info.issues {
///     println!("{issue}");
/// }
/// # Ok::<(), audioinfo::utils::errors::ProbeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FrameParser {
    fail_level: log::Level,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
        }
    }
}

struct ScanState<'a> {
    name: &'a str,
    fail_level: log::Level,
}

#[derive(Default)]
struct FrameScan {
    samples: BTreeMap<u32, u64>,
    issues: Vec<Issue>,
    incomplete: bool,
    frame_count: u64,
    frame_bytes: u64,
    first_frame: Option<FrameGeometry>,
    trailing_tag: Option<TrailingTag>,
}

impl FrameScan {
    fn add_frame(&mut self, geometry: FrameGeometry) {
        *self.samples.entry(geometry.sample_rate).or_default() += geometry.samples as u64;
        self.frame_count += 1;
        self.frame_bytes += geometry.length as u64;
        self.first_frame.get_or_insert(geometry);
    }
}

fn header_word(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_be_bytes(bytes.get(..4)?.try_into().ok()?))
}

fn is_valid_header(bytes: &[u8]) -> bool {
    header_word(bytes).is_some_and(|word| is_sync(word) && FrameGeometry::decode(word).is_ok())
}

impl FrameParser {
    /// Sets the failure level for recoverable anomalies.
    ///
    /// - `log::Level::Error`: Never fail on recorded issues (default)
    /// - `log::Level::Warn`: Fail on malformed frames and truncation (strict mode)
    /// - `log::Level::Info`: Also fail on resynchronization
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    /// Scans `source` to the end. `name` labels errors and log lines.
    pub fn parse<R: Read>(&self, source: R, name: &str) -> Result<MpegInfo, ProbeError> {
        let state = ScanState {
            name,
            fail_level: self.fail_level,
        };
        let mut reader = CountingReader::new(source);

        let id3v2 = skip_preamble(&mut reader).map_err(|e| ProbeError::read(name, e))?;
        let start = reader.position();

        let mut scan = FrameScan::default();
        Self::scan_frames(&state, &mut reader, &mut scan)?;

        let Some(first_frame) = scan.first_frame else {
            return Err(ProbeError::format(
                name,
                AudioFormat::Mpeg,
                start,
                "could not find a single frame",
            ));
        };

        debug!(
            "{name}: {} frames, {} bytes, ended at {}",
            scan.frame_count,
            scan.frame_bytes,
            reader.position()
        );

        Ok(MpegInfo {
            name: name.to_string(),
            samples: scan.samples,
            issues: scan.issues,
            incomplete: scan.incomplete,
            frame_count: scan.frame_count,
            frame_bytes: scan.frame_bytes,
            first_frame,
            id3v2,
            trailing_tag: scan.trailing_tag,
        })
    }

    /// Opens and scans the file at `path`, named by its display form.
    pub fn parse_path(&self, path: impl AsRef<Path>) -> Result<MpegInfo, ProbeError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| ProbeError::read(&name, e.into()))?;

        self.parse(BufReader::new(file), &name)
    }

    fn scan_frames<R: Read>(
        state: &ScanState,
        reader: &mut CountingReader<R>,
        scan: &mut FrameScan,
    ) -> Result<(), ProbeError> {
        let read_err = |e: ReadError| ProbeError::read(state.name, e);

        loop {
            let start = reader.position();
            reader.mark(HEADER_LEN as usize);
            let header = reader.read_up_to(HEADER_LEN as usize).map_err(read_err)?;
            if header.is_empty() {
                return Ok(());
            }

            if let Some(word) = header_word(&header).filter(|&word| is_sync(word)) {
                match FrameGeometry::decode(word) {
                    Ok(geometry) => {
                        trace!(
                            "Frame at {start}: {} {}, {} kbps, {} Hz, {} bytes",
                            geometry.version,
                            geometry.layer,
                            geometry.bitrate_kbps,
                            geometry.sample_rate,
                            geometry.length
                        );

                        match reader.skip(geometry.payload_len() as u64) {
                            Ok(()) => {
                                scan.add_frame(geometry);
                                continue;
                            }
                            Err(e) if e.is_eof() => {
                                let issue = log_or_err!(
                                    state,
                                    log::Level::Warn,
                                    Issue::eof(reader.position(), e)
                                );
                                scan.issues.push(issue);
                                scan.incomplete = true;
                                return Ok(());
                            }
                            Err(e) => return Err(read_err(e)),
                        }
                    }
                    Err(e) => {
                        let issue = log_or_err!(state, log::Level::Warn, Issue::format(start, e));
                        scan.issues.push(issue);
                    }
                }
            } else {
                reader.reset().map_err(read_err)?;
            }

            if !Self::resync(state, reader, scan)? {
                return Ok(());
            }
        }
    }

    /// Returns `false` when the scan should end.
    fn resync<R: Read>(
        state: &ScanState,
        reader: &mut CountingReader<R>,
        scan: &mut FrameScan,
    ) -> Result<bool, ProbeError> {
        let read_err = |e: ReadError| ProbeError::read(state.name, e);
        let position = reader.position();

        let upcoming = reader.peek(TRAILING_TAG_PEEK).map_err(read_err)?;
        if let Some(tag) = TrailingTag::detect(&upcoming) {
            debug!("{}: {tag} tag at {position}", state.name);
            scan.trailing_tag = Some(tag);
            return Ok(false);
        }

        match resync(reader, HEADER_LEN as usize, is_valid_header).map_err(read_err)? {
            Resync::Found { skipped: 0 } => Ok(true),
            Resync::Found { skipped } => {
                let issue = log_or_err!(state, log::Level::Info, Issue::sync(position, skipped));
                scan.issues.push(issue);
                Ok(true)
            }
            Resync::Exhausted { skipped: 0 } => Ok(false),
            Resync::Exhausted { skipped } => {
                let issue = log_or_err!(
                    state,
                    log::Level::Info,
                    Issue::other(position).with_meta(TRAILING_BYTES, skipped)
                );
                scan.issues.push(issue);
                Ok(false)
            }
        }
    }
}

/// Skips zero padding and ID3v2 blocks ahead of the first frame.
fn skip_preamble<R: Read>(reader: &mut CountingReader<R>) -> Result<Vec<Id3v2Header>, ReadError> {
    let mut tags = Vec::new();

    loop {
        let upcoming = reader.peek(ID3V2_MAGIC.len())?;

        if upcoming.first() == Some(&0) {
            let mut padding = 0u64;
            while reader.peek(1)? == [0] {
                reader.skip(1)?;
                padding += 1;
            }
            trace!("Skipped {padding} bytes of padding");
            continue;
        }

        if upcoming == ID3V2_MAGIC {
            let tag = Id3v2Header::read(reader)?;
            debug!("{tag}");
            reader.skip(tag.remaining_len())?;
            tags.push(tag);
            continue;
        }

        return Ok(tags);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;

    use super::*;
    use crate::process::fixtures::*;
    use crate::structs::issue::IssueKind;
    use crate::structs::tag::encode_synchsafe;
    use crate::utils::errors::FrameError;
    use crate::utils::timing::duration_of;

    fn parse(data: &[u8]) -> Result<MpegInfo, ProbeError> {
        FrameParser::default().parse(data, "test.mp3")
    }

    fn ten_frames() -> Vec<u8> {
        mpeg_frames(MPEG1_L3_44K, MPEG1_L3_44K_LEN, 10)
    }

    #[test]
    fn clean_stream() -> Result<()> {
        let info = parse(&ten_frames())?;

        assert_eq!(info.frame_count, 10);
        assert_eq!(info.frame_bytes, 4170);
        assert_eq!(info.duration(), Duration::from_nanos(261_224_490));
        assert_eq!(info.channels(), 2);
        assert_eq!(info.sample_rate(), 44100);
        assert!(info.issues.is_empty());
        assert!(!info.incomplete);

        Ok(())
    }

    #[test]
    fn tags_and_padding() -> Result<()> {
        let mut data = vec![0u8; 16];
        data.extend_from_slice(b"ID3\x04\x00\x00");
        data.extend_from_slice(&encode_synchsafe(100));
        data.extend_from_slice(&[0xAB; 100]);
        data.extend_from_slice(&ten_frames());
        data.extend_from_slice(b"TAG");
        data.extend_from_slice(&[0x20; 125]);

        let info = parse(&data)?;
        assert_eq!(info.id3v2.len(), 1);
        assert_eq!(info.id3v2[0].location, 16);
        assert_eq!(info.id3v2[0].total_len(), 110);
        assert_eq!(info.trailing_tag, Some(TrailingTag::Id3v1));
        assert_eq!(info.frame_count, 10);
        assert!(info.issues.is_empty());

        Ok(())
    }

    #[test]
    fn truncated_last_frame() -> Result<()> {
        let mut data = ten_frames();
        data.truncate(data.len() - 50);

        let info = parse(&data)?;
        assert!(info.incomplete);
        assert_eq!(info.frame_count, 9);
        assert_eq!(info.issues.len(), 1);
        assert_eq!(info.issues[0].kind(), IssueKind::Eof);
        assert_eq!(info.issues[0].location(), 4120);
        assert_eq!(info.duration(), duration_of(9 * 1152, 44100));

        Ok(())
    }

    #[test]
    fn corrupt_header() -> Result<()> {
        let mut data = ten_frames();
        data[2 * MPEG1_L3_44K_LEN + 2] = 0xF0;

        let info = parse(&data)?;
        assert_eq!(
            info.issues,
            vec![
                Issue::format(834, FrameError::InvalidBitrate(15)),
                Issue::sync(838, 413)
            ]
        );
        assert_eq!(info.frame_count, 9);
        assert!(!info.incomplete);
        assert_eq!(info.duration(), duration_of(9 * 1152, 44100));

        Ok(())
    }

    #[test]
    fn spliced_boundary() -> Result<()> {
        let mut data = ten_frames();
        data.drain(1648..1698);

        let info = parse(&data)?;
        assert_eq!(info.issues, vec![Issue::sync(1668, 367)]);
        assert_eq!(info.frame_count, 9);
        assert!(!info.incomplete);

        Ok(())
    }

    #[test]
    fn trailing_garbage() -> Result<()> {
        let mut data = ten_frames();
        data.extend_from_slice(&[0x12; 5]);

        let info = parse(&data)?;
        assert_eq!(
            info.issues,
            vec![Issue::other(4170).with_meta(TRAILING_BYTES, 5u64)]
        );
        assert_eq!(info.frame_count, 10);

        Ok(())
    }

    #[test]
    fn mixed_sample_rates() -> Result<()> {
        let mut data = mpeg_frames(MPEG1_L3_44K, MPEG1_L3_44K_LEN, 3);
        data.extend_from_slice(&mpeg_frames(MPEG1_L3_48K, MPEG1_L3_48K_LEN, 2));

        let info = parse(&data)?;
        assert_eq!(info.samples.get(&44100), Some(&3456));
        assert_eq!(info.samples.get(&48000), Some(&2304));
        assert_eq!(info.duration(), Duration::from_nanos(126_367_347));
        assert!(info.issues.is_empty());

        Ok(())
    }

    #[test]
    fn mpeg2_layer3() -> Result<()> {
        let info = parse(&mpeg_frames(MPEG2_L3_22K, MPEG2_L3_22K_LEN, 4))?;

        assert_eq!(info.sample_rate(), 22050);
        assert_eq!(info.total_samples(), 2304);
        assert_eq!(info.duration(), Duration::from_nanos(104_489_796));

        Ok(())
    }

    #[test]
    fn io_failure_propagates() {
        let data = ten_frames();
        let source = FailingSource::new(&data[..3 * MPEG1_L3_44K_LEN + 100]);

        match FrameParser::default().parse(source, "failing.mp3") {
            Err(ProbeError::Read { source, .. }) => assert!(!source.is_eof()),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn truncated_id3_is_read_error() {
        let data = [0, 0, 0, b'I', b'D', b'3', 4];

        match parse(&data) {
            Err(ProbeError::Read {
                source:
                    ReadError::UnexpectedEof {
                        position,
                        wanted,
                        got,
                    },
                ..
            }) => assert_eq!((position, wanted, got), (3, 10, 4)),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn no_frames() {
        assert!(matches!(
            parse(&[]),
            Err(ProbeError::Format {
                format: AudioFormat::Mpeg,
                ..
            })
        ));
        assert!(matches!(
            parse(b"not an mpeg stream at all"),
            Err(ProbeError::Format { .. })
        ));
    }

    #[test]
    fn strict_mode_escalates() {
        let mut data = ten_frames();
        data[2 * MPEG1_L3_44K_LEN + 2] = 0xF0;

        let mut parser = FrameParser::default();
        parser.set_fail_level(log::Level::Warn);

        match parser.parse(&data[..], "strict.mp3") {
            Err(ProbeError::Strict { name, issue }) => {
                assert_eq!(name, "strict.mp3");
                assert_eq!(issue.kind(), IssueKind::Format);
                assert_eq!(issue.location(), 834);
            }
            other => panic!("unexpected result {other:?}"),
        }

        let mut spliced = ten_frames();
        spliced.drain(1648..1698);
        assert!(parser.parse(&spliced[..], "strict.mp3").is_ok());
    }

    #[test]
    fn repeatable() -> Result<()> {
        let mut data = ten_frames();
        data[4 * MPEG1_L3_44K_LEN + 1] = 0x00;

        assert_eq!(parse(&data)?, parse(&data)?);

        Ok(())
    }
}
