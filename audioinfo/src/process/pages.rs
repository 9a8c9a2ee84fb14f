use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{debug, info, trace};

use crate::codec::{Codec, CodecRegistry, SIGNATURE_PEEK};
use crate::log_or_err;
use crate::process::resync::{Resync, resync};
use crate::structs::issue::{EXPECTED_SEQUENCE, FOUND_SEQUENCE, Issue, TRAILING_BYTES};
use crate::structs::page::{
    CAPTURE_PATTERN, CHECKSUM_OFFSET, PAGE_VERSION, PacketSegment, PageHeader,
};
use crate::structs::stream::{LogicalStream, StreamSet};
use crate::utils::crc::OGG_PAGE_CRC;
use crate::utils::errors::{
    AudioFormat, PacketError, PageError, ProbeError, ReadError, StreamError,
};
use crate::utils::reader::CountingReader;

/// Demultiplexes an Ogg physical stream into its logical streams.
///
/// Every page is routed by serial number to the codec that claimed the
/// stream on its first page. Garbage between pages, malformed packets and
/// checksum failures are recorded as issues; structural contradictions such as
/// a reused serial number end the parse.
///
/// # Example
///
/// ```rust,no_run
/// use audioinfo::process::pages::PageDemuxer;
///
/// let demuxer = PageDemuxer::default();
/// let streams = demuxer.parse_streams_path("track.ogg")?;
///
/// for stream in streams.streams() {
///     println!("{:#010X}: {} {:?}", stream.serial, stream.codec, stream.duration());
/// }
/// # Ok::<(), audioinfo::utils::errors::ProbeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PageDemuxer {
    fail_level: log::Level,
    verify_checksums: bool,
    codecs: CodecRegistry,
}

impl Default for PageDemuxer {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            verify_checksums: true,
            codecs: CodecRegistry::default(),
        }
    }
}

struct DemuxState<'a> {
    name: &'a str,
    fail_level: log::Level,
}

enum Flow {
    Continue,
    Stop,
}

/// CRC of a page from the bytes following its capture pattern, with the
/// checksum field taken as zero.
fn page_checksum(after_pattern: &[u8]) -> Option<u32> {
    let field = CHECKSUM_OFFSET - CAPTURE_PATTERN.len();
    let before = after_pattern.get(..field)?;
    let after = after_pattern.get(field + 4..)?;

    let crc = OGG_PAGE_CRC.checksum(CAPTURE_PATTERN);
    let crc = OGG_PAGE_CRC.update(crc, before);
    let crc = OGG_PAGE_CRC.update(crc, &[0; 4]);
    Some(OGG_PAGE_CRC.update(crc, after))
}

impl PageDemuxer {
    /// Sets the failure level for recoverable anomalies.
    ///
    /// - `log::Level::Error`: Never fail on recorded issues (default)
    /// - `log::Level::Warn`: Fail on malformed pages, packets and truncation (strict mode)
    /// - `log::Level::Info`: Also fail on resynchronization and sequence gaps
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    /// Enables or disables page CRC verification. Enabled by default.
    pub fn set_verify_checksums(&mut self, verify: bool) {
        self.verify_checksums = verify;
    }

    /// Restricts the codecs accepted on first pages.
    pub fn set_codecs(&mut self, codecs: CodecRegistry) {
        self.codecs = codecs;
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Reads every page of `source` and returns all logical streams.
    pub fn parse_streams<R: Read>(&self, source: R, name: &str) -> Result<StreamSet, ProbeError> {
        let state = DemuxState {
            name,
            fail_level: self.fail_level,
        };
        let read_err = |e: ReadError| ProbeError::read(name, e);

        let mut reader = CountingReader::new(source);
        let mut set = StreamSet::new(name);

        loop {
            let location = reader.position();
            reader.mark(CAPTURE_PATTERN.len());
            let pattern = reader
                .read_up_to(CAPTURE_PATTERN.len())
                .map_err(read_err)?;
            if pattern.is_empty() {
                break;
            }

            if pattern != CAPTURE_PATTERN {
                reader.reset().map_err(read_err)?;
                if !Self::resync(&state, &mut reader, &mut set)? {
                    break;
                }
                continue;
            }

            if self.verify_checksums {
                reader.start_capture();
            }
            match self.read_page(&state, &mut reader, &mut set, location)? {
                Flow::Continue => {}
                Flow::Stop => break,
            }
        }

        if set.pages == 0 {
            return Err(ProbeError::format(
                name,
                AudioFormat::Ogg,
                0,
                "could not find a single page",
            ));
        }
        if set.is_empty() {
            return Err(ProbeError::format(
                name,
                AudioFormat::Ogg,
                0,
                "no logical stream was declared",
            ));
        }

        for stream in set.streams().iter().filter(|s| !s.closed) {
            debug!(
                "{name}: stream {:#010X} has no end-of-stream page",
                stream.serial
            );
        }
        set.incomplete |= set.streams().iter().any(|s| !s.closed);

        debug!(
            "{name}: {} pages, {} streams, ended at {}",
            set.pages,
            set.len(),
            reader.position()
        );

        Ok(set)
    }

    /// Returns the first audio stream that carries payload, with the issues
    /// of the whole physical stream attached.
    pub fn parse<R: Read>(&self, source: R, name: &str) -> Result<LogicalStream, ProbeError> {
        self.parse_streams(source, name)?
            .into_canonical()
            .ok_or_else(|| {
                ProbeError::format(name, AudioFormat::Ogg, 0, "no audio stream with payload")
            })
    }

    /// Opens and demultiplexes the file at `path`, named by its display form.
    pub fn parse_streams_path(&self, path: impl AsRef<Path>) -> Result<StreamSet, ProbeError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| ProbeError::read(&name, e.into()))?;

        self.parse_streams(BufReader::new(file), &name)
    }

    pub fn parse_path(&self, path: impl AsRef<Path>) -> Result<LogicalStream, ProbeError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| ProbeError::read(&name, e.into()))?;

        self.parse(BufReader::new(file), &name)
    }

    /// Reads one page whose capture pattern was just consumed.
    fn read_page<R: Read>(
        &self,
        state: &DemuxState,
        reader: &mut CountingReader<R>,
        set: &mut StreamSet,
        location: u64,
    ) -> Result<Flow, ProbeError> {
        let header = match PageHeader::read(reader, location) {
            Ok(header) => header,
            Err(e) => {
                Self::truncated(state, set, None, reader.position(), e)?;
                return Ok(Flow::Stop);
            }
        };

        if header.version != PAGE_VERSION {
            reader.take_capture();
            let issue = log_or_err!(
                state,
                log::Level::Warn,
                Issue::format(location, PageError::UnsupportedVersion(header.version))
            );
            set.issues.push(issue);
            return Ok(Flow::Continue);
        }

        set.pages += 1;
        let serial = header.serial;
        let segments = header.segments();
        trace!(
            "Page {} of stream {serial:#010X} at {location}: {} segments, {} bytes, granule {:?}",
            header.sequence,
            segments.len(),
            header.body_len(),
            header.granule()
        );

        let mut first_packet = 0;
        if header.is_bos() {
            if set.contains(serial) {
                return Err(ProbeError::stream(
                    state.name,
                    StreamError::DuplicateSerial { serial, location },
                ));
            }
            let Some(stream) = self.open_stream(state, reader, set, &header, &segments)? else {
                return Ok(Flow::Stop);
            };
            info!(
                "{}: stream {serial:#010X}: {}, {} channels, {} Hz",
                state.name, stream.codec, stream.params.channels, stream.params.sample_rate
            );
            set.insert(stream).map_err(|stream| {
                ProbeError::stream(
                    state.name,
                    StreamError::DuplicateSerial {
                        serial: stream.serial,
                        location,
                    },
                )
            })?;
            first_packet = 1;
        }

        let Some(stream) = set.get_mut(serial) else {
            return Err(ProbeError::stream(
                state.name,
                StreamError::UndeclaredSerial { serial, location },
            ));
        };
        let Some(codec) = self.codecs.lookup(stream.codec) else {
            return Err(ProbeError::stream(
                state.name,
                StreamError::CodecNotRegistered {
                    serial,
                    codec: stream.codec.name(),
                },
            ));
        };

        if let Some(last) = stream.last_sequence {
            let expected = last.wrapping_add(1);
            if header.sequence != expected {
                let issue = log_or_err!(
                    state,
                    log::Level::Info,
                    Issue::other(location)
                        .with_meta(EXPECTED_SEQUENCE, expected)
                        .with_meta(FOUND_SEQUENCE, header.sequence)
                );
                stream.issues.push(issue);
            }
        }
        stream.last_sequence = Some(header.sequence);
        stream.pages += 1;

        if let Some(granule) = header.granule() {
            stream.update_granule(granule);
        }
        if header.is_eos() {
            debug!("{}: stream {serial:#010X} closed", state.name);
            stream.closed = true;
        }

        match Self::read_packets(codec, stream, reader, &segments[first_packet..]) {
            Ok(()) => {}
            Err(PacketError::Read(e)) => {
                Self::truncated(state, set, Some(serial), reader.position(), e)?;
                return Ok(Flow::Stop);
            }
            Err(e @ PacketError::StateMismatch { .. }) => {
                return Err(ProbeError::stream(
                    state.name,
                    StreamError::Dispatch { serial, source: e },
                ));
            }
            Err(e) => {
                reader.take_capture();
                let issue = log_or_err!(state, log::Level::Warn, Issue::format(location, e));
                stream.issues.push(issue);
                return Ok(Flow::Continue);
            }
        }

        let captured = reader.take_capture();
        if self.verify_checksums {
            let calculated = page_checksum(&captured).unwrap_or(header.checksum);
            if calculated != header.checksum {
                let issue = log_or_err!(
                    state,
                    log::Level::Warn,
                    Issue::format(
                        location,
                        PageError::ChecksumMismatch {
                            calculated,
                            read: header.checksum,
                        }
                    )
                );
                stream.issues.push(issue);
            }
        }

        Ok(Flow::Continue)
    }

    /// Identifies the codec of a first page and parses its identification
    /// packet. Returns `None` when data ended inside the packet.
    fn open_stream<R: Read>(
        &self,
        state: &DemuxState,
        reader: &mut CountingReader<R>,
        set: &mut StreamSet,
        header: &PageHeader,
        segments: &[PacketSegment],
    ) -> Result<Option<LogicalStream>, ProbeError> {
        let (serial, location) = (header.serial, header.location);
        let read_err = |e: ReadError| ProbeError::read(state.name, e);
        let invalid = |source: PacketError| {
            ProbeError::stream(
                state.name,
                StreamError::InvalidIdentification {
                    serial,
                    location,
                    source,
                },
            )
        };

        let Some(segment) = segments.first() else {
            return Err(invalid(PacketError::MissingIdentification));
        };

        reader.mark(SIGNATURE_PEEK);
        let peeked = reader.read_up_to(SIGNATURE_PEEK).map_err(read_err)?;
        reader.reset().map_err(read_err)?;
        let wanted = SIGNATURE_PEEK.min(segment.size as usize);
        let prefix = &peeked[..peeked.len().min(wanted)];

        let Some(codec) = self.codecs.identify(prefix) else {
            if peeked.len() < wanted {
                let position = reader.position();
                reader.skip(peeked.len() as u64).map_err(read_err)?;
                let error = ReadError::UnexpectedEof {
                    position,
                    wanted: wanted as u64,
                    got: peeked.len() as u64,
                };
                Self::truncated(state, set, None, reader.position(), error)?;
                return Ok(None);
            }

            return Err(ProbeError::stream(
                state.name,
                StreamError::UnsupportedCodec {
                    serial,
                    location,
                    codec: CodecRegistry::describe_unsupported(prefix),
                },
            ));
        };

        reader
            .skip(codec.signature().len() as u64)
            .map_err(read_err)?;
        let identified = match codec.read_identification(reader, segment) {
            Ok(identified) => identified,
            Err(PacketError::Read(e)) => {
                Self::truncated(state, set, None, reader.position(), e)?;
                return Ok(None);
            }
            Err(e) => return Err(invalid(e)),
        };

        let mut stream = LogicalStream::new(serial, codec, identified.params, identified.state);
        stream.issues.reserve(identified.issues.len());
        for issue in identified.issues {
            let issue = log_or_err!(state, log::Level::Info, issue);
            stream.issues.push(issue);
        }

        Ok(Some(stream))
    }

    fn read_packets<R: Read>(
        codec: Codec,
        stream: &mut LogicalStream,
        reader: &mut CountingReader<R>,
        segments: &[PacketSegment],
    ) -> Result<(), PacketError> {
        for segment in segments {
            codec.read_packet(&mut stream.state, reader, segment)?;
        }

        Ok(())
    }

    /// Records end of data inside a page on the stream it belongs to, if known.
    fn truncated(
        state: &DemuxState,
        set: &mut StreamSet,
        serial: Option<u32>,
        location: u64,
        error: ReadError,
    ) -> Result<(), ProbeError> {
        if !error.is_eof() {
            return Err(ProbeError::read(state.name, error));
        }

        let issue = log_or_err!(state, log::Level::Warn, Issue::eof(location, error));
        match serial.and_then(|serial| set.get_mut(serial)) {
            Some(stream) => {
                stream.issues.push(issue);
                stream.incomplete = true;
            }
            None => set.issues.push(issue),
        }
        set.incomplete = true;

        Ok(())
    }

    /// Returns `false` when no further page exists.
    fn resync<R: Read>(
        state: &DemuxState,
        reader: &mut CountingReader<R>,
        set: &mut StreamSet,
    ) -> Result<bool, ProbeError> {
        let position = reader.position();
        let found = resync(reader, CAPTURE_PATTERN.len(), |window| {
            window == CAPTURE_PATTERN
        })
        .map_err(|e| ProbeError::read(state.name, e))?;

        match found {
            Resync::Found { skipped } => {
                if skipped > 0 {
                    let issue =
                        log_or_err!(state, log::Level::Info, Issue::sync(position, skipped));
                    set.issues.push(issue);
                }
                Ok(true)
            }
            Resync::Exhausted { skipped } => {
                if skipped > 0 {
                    let issue = log_or_err!(
                        state,
                        log::Level::Info,
                        Issue::other(position).with_meta(TRAILING_BYTES, skipped)
                    );
                    set.issues.push(issue);
                }
                Ok(false)
            }
        }
    }
}
