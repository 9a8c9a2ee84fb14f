//! Parse results.
//!
//! [`MpegInfo`] accumulates samples per sample rate for a frame stream.
//! [`StreamSet`] holds one [`LogicalStream`] per Ogg serial number, in the
//! order the streams were declared.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::codec::{Codec, CodecState, StreamParams};
use crate::structs::frame::FrameGeometry;
use crate::structs::issue::Issue;
use crate::structs::tag::{Id3v2Header, TrailingTag};
use crate::utils::timing::samples_to_duration;

/// Result of scanning an MPEG audio frame stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpegInfo {
    pub name: String,
    /// Samples accumulated per sample rate.
    pub samples: BTreeMap<u32, u64>,
    pub issues: Vec<Issue>,
    /// Data ended inside a frame.
    pub incomplete: bool,
    pub frame_count: u64,
    /// Bytes covered by decoded frames, headers included.
    pub frame_bytes: u64,
    /// Parameters of the first decoded frame.
    pub first_frame: FrameGeometry,
    pub id3v2: Vec<Id3v2Header>,
    pub trailing_tag: Option<TrailingTag>,
}

impl MpegInfo {
    /// Sum of `samples / rate` over all rates, rounded once.
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.iter().map(|(&rate, &count)| (rate, count)))
    }

    pub fn channels(&self) -> u8 {
        self.first_frame.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.first_frame.sample_rate
    }

    /// Average bit rate over all decoded frames, in bits per second.
    pub fn average_bitrate(&self) -> Option<u32> {
        let secs = self.duration().as_secs_f64();
        (secs > 0.0).then(|| (self.frame_bytes as f64 * 8.0 / secs).round() as u32)
    }

    pub fn total_samples(&self) -> u64 {
        self.samples.values().sum()
    }
}

/// State of one Ogg logical stream.
#[derive(Debug, Clone)]
pub struct LogicalStream {
    pub serial: u32,
    pub codec: Codec,
    pub params: StreamParams,
    pub first_granule: Option<u64>,
    pub last_granule: Option<u64>,
    pub issues: Vec<Issue>,
    pub incomplete: bool,
    /// The end-of-stream page was seen.
    pub closed: bool,
    pub pages: u64,
    pub last_sequence: Option<u32>,
    pub state: CodecState,
}

impl LogicalStream {
    pub fn new(serial: u32, codec: Codec, params: StreamParams, state: CodecState) -> Self {
        Self {
            serial,
            codec,
            params,
            first_granule: None,
            last_granule: None,
            issues: Vec::new(),
            incomplete: false,
            closed: false,
            pages: 0,
            last_sequence: None,
            state,
        }
    }

    pub(crate) fn update_granule(&mut self, granule: u64) {
        self.first_granule.get_or_insert(granule);
        self.last_granule = Some(granule);
    }

    /// Playback time from the granule position span.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.first_granule?, self.last_granule?);
        Some(
            self.state
                .granule_duration(&self.params, last.saturating_sub(first)),
        )
    }

    /// Duration estimated from payload size and the bit rate hint.
    ///
    /// Only approximate for variable bit rate streams.
    pub fn payload_duration(&self) -> Option<Duration> {
        self.state.payload_duration(&self.params)
    }

    pub fn payload_bytes(&self) -> u64 {
        self.state.payload_bytes()
    }

    pub fn has_payload(&self) -> bool {
        self.payload_bytes() > 0
    }

    /// Average payload bit rate over the granule duration, in bits per second.
    pub fn average_bitrate(&self) -> Option<u32> {
        let secs = self.duration()?.as_secs_f64();
        (secs > 0.0).then(|| (self.payload_bytes() as f64 * 8.0 / secs).round() as u32)
    }

    pub fn vendor(&self) -> Option<&str> {
        self.state.vendor()
    }
}

/// All logical streams of one Ogg physical stream.
#[derive(Debug, Clone, Default)]
pub struct StreamSet {
    pub name: String,
    streams: Vec<LogicalStream>,
    /// Anomalies not attributable to a declared stream.
    pub issues: Vec<Issue>,
    pub incomplete: bool,
    pub pages: u64,
}

impl StreamSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn contains(&self, serial: u32) -> bool {
        self.get(serial).is_some()
    }

    pub fn get(&self, serial: u32) -> Option<&LogicalStream> {
        self.streams.iter().find(|s| s.serial == serial)
    }

    pub fn get_mut(&mut self, serial: u32) -> Option<&mut LogicalStream> {
        self.streams.iter_mut().find(|s| s.serial == serial)
    }

    /// Adds a stream; returns it back if the serial is already taken.
    pub fn insert(&mut self, stream: LogicalStream) -> Result<(), LogicalStream> {
        if self.contains(stream.serial) {
            return Err(stream);
        }
        self.streams.push(stream);
        Ok(())
    }

    /// Streams in declaration order.
    pub fn streams(&self) -> &[LogicalStream] {
        &self.streams
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// First audio stream with payload, carrying the global issues and
    /// completeness.
    pub fn into_canonical(self) -> Option<LogicalStream> {
        let StreamSet {
            streams,
            issues,
            incomplete,
            ..
        } = self;

        let mut stream = streams
            .into_iter()
            .find(|s| s.codec.is_audio() && s.has_payload())?;
        stream.issues.extend(issues);
        stream.incomplete |= incomplete;

        Some(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::opus::OpusState;
    use crate::codec::vorbis::VorbisState;

    fn vorbis_stream(serial: u32, payload_bytes: u64) -> LogicalStream {
        let params = StreamParams {
            channels: 2,
            sample_rate: 44100,
            granule_rate: 44100,
            nominal_bitrate: Some(128_000),
        };
        let mut state = VorbisState::default();
        state.bitrate_nominal = 128_000;
        state.payload_bytes = payload_bytes;
        LogicalStream::new(serial, Codec::Vorbis, params, CodecState::Vorbis(state))
    }

    #[test]
    fn test_granule_duration() {
        let mut stream = vorbis_stream(1, 16_000);
        assert_eq!(stream.duration(), None);

        stream.update_granule(0);
        stream.update_granule(22_050);
        stream.update_granule(44_100);
        assert_eq!(stream.duration(), Some(Duration::from_secs(1)));
        assert_eq!(stream.payload_duration(), Some(Duration::from_secs(1)));
        assert_eq!(stream.average_bitrate(), Some(128_000));
    }

    #[test]
    fn test_opus_pre_skip() {
        let params = StreamParams {
            channels: 1,
            sample_rate: 48000,
            granule_rate: 48000,
            nominal_bitrate: None,
        };
        let mut state = OpusState::default();
        state.pre_skip = 3840;
        let mut stream = LogicalStream::new(9, Codec::Opus, params, CodecState::Opus(state));
        stream.update_granule(0);
        stream.update_granule(99_840);

        assert_eq!(stream.duration(), Some(Duration::from_secs(2)));
        assert_eq!(stream.payload_duration(), None);
    }

    #[test]
    fn test_set_insertion_order_and_canonical() {
        let mut set = StreamSet::new("test.ogg");
        set.insert(vorbis_stream(7, 0)).unwrap();
        set.insert(vorbis_stream(3, 10)).unwrap();
        set.insert(vorbis_stream(5, 10)).unwrap();
        assert!(set.insert(vorbis_stream(3, 0)).is_err());
        set.issues.push(Issue::sync(100, 4));
        set.incomplete = true;

        let serials: Vec<u32> = set.streams().iter().map(|s| s.serial).collect();
        assert_eq!(serials, vec![7, 3, 5]);

        let canonical = set.into_canonical().unwrap();
        assert_eq!(canonical.serial, 3);
        assert_eq!(canonical.issues, vec![Issue::sync(100, 4)]);
        assert!(canonical.incomplete);
    }
}
