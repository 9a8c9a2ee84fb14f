/// Resynchronization on a byte pattern.
///
/// Provides [`resync`](resync::resync), the one-byte-at-a-time scan both
/// parsers use to find their next anchor after garbage.
pub mod resync;

/// MPEG audio frame scanning.
///
/// Provides the [`FrameParser`](frames::FrameParser) for walking frame
/// headers, skipping tag blocks and resynchronizing after corruption.
pub mod frames;

/// Ogg page demultiplexing.
///
/// Provides the [`PageDemuxer`](pages::PageDemuxer) for reading pages,
/// routing packets to the codec of each logical stream and validating page
/// checksums.
pub mod pages;

/// Builders for synthetic streams used throughout the test suite.
#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{self, Read};

    use crate::structs::page::{CHECKSUM_OFFSET, FLAG_BOS, FLAG_EOS, MAX_LACING};
    use crate::utils::crc::OGG_PAGE_CRC;

    /// MPEG-1 Layer III, 128 kbps, 44.1 kHz, stereo: 417 bytes.
    pub const MPEG1_L3_44K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
    pub const MPEG1_L3_44K_LEN: usize = 417;

    /// MPEG-1 Layer III, 128 kbps, 48 kHz, stereo: 384 bytes.
    pub const MPEG1_L3_48K: [u8; 4] = [0xFF, 0xFB, 0x94, 0x00];
    pub const MPEG1_L3_48K_LEN: usize = 384;

    /// MPEG-2 Layer III, 64 kbps, 22.05 kHz, stereo: 208 bytes.
    pub const MPEG2_L3_22K: [u8; 4] = [0xFF, 0xF3, 0x80, 0x00];
    pub const MPEG2_L3_22K_LEN: usize = 208;

    pub fn mpeg_frames(header: [u8; 4], len: usize, count: usize) -> Vec<u8> {
        let mut frame = vec![0u8; len];
        frame[..4].copy_from_slice(&header);
        frame.repeat(count)
    }

    /// Serves `data`, then fails every further read with an I/O error.
    pub struct FailingSource {
        data: Vec<u8>,
        offset: usize,
    }

    impl FailingSource {
        pub fn new(data: &[u8]) -> Self {
            Self {
                data: data.to_vec(),
                offset: 0,
            }
        }
    }

    impl Read for FailingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let remaining = &self.data[self.offset..];
            if remaining.is_empty() {
                return Err(io::Error::other("device failure"));
            }
            let n = buf.len().min(remaining.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.offset += n;
            Ok(n)
        }
    }

    pub fn vorbis_id_packet(channels: u8, rate: u32, nominal: i32) -> Vec<u8> {
        let mut packet = b"\x01vorbis".to_vec();
        packet.extend_from_slice(&0u32.to_le_bytes());
        packet.push(channels);
        packet.extend_from_slice(&rate.to_le_bytes());
        packet.extend_from_slice(&0i32.to_le_bytes());
        packet.extend_from_slice(&nominal.to_le_bytes());
        packet.extend_from_slice(&0i32.to_le_bytes());
        packet.push(0xB8);
        packet.push(1);
        packet
    }

    pub fn vorbis_comment_packet(vendor: &str, count: u32) -> Vec<u8> {
        let mut packet = b"\x03vorbis".to_vec();
        packet.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        packet.extend_from_slice(vendor.as_bytes());
        packet.extend_from_slice(&count.to_le_bytes());
        for i in 0..count {
            let comment = format!("TRACKNUMBER={i}");
            packet.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            packet.extend_from_slice(comment.as_bytes());
        }
        packet.push(1);
        packet
    }

    pub fn vorbis_setup_packet(len: usize) -> Vec<u8> {
        let mut packet = b"\x05vorbis".to_vec();
        packet.resize(len.max(packet.len()), 0x42);
        packet
    }

    pub fn vorbis_audio_packet(len: usize) -> Vec<u8> {
        let mut packet = vec![0x5A; len];
        if let Some(first) = packet.first_mut() {
            *first = 0;
        }
        packet
    }

    pub fn opus_head_packet(channels: u8, pre_skip: u16, rate: u32) -> Vec<u8> {
        let mut packet = b"OpusHead".to_vec();
        packet.push(1);
        packet.push(channels);
        packet.extend_from_slice(&pre_skip.to_le_bytes());
        packet.extend_from_slice(&rate.to_le_bytes());
        packet.extend_from_slice(&0i16.to_le_bytes());
        packet.push(0);
        packet
    }

    pub fn opus_tags_packet(vendor: &str) -> Vec<u8> {
        let mut packet = b"OpusTags".to_vec();
        packet.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        packet.extend_from_slice(vendor.as_bytes());
        packet.extend_from_slice(&0u32.to_le_bytes());
        packet
    }

    /// Lacing values for one complete packet.
    pub fn lacing(len: usize) -> Vec<u8> {
        let mut values = vec![MAX_LACING; len / MAX_LACING as usize];
        values.push((len % MAX_LACING as usize) as u8);
        values
    }

    /// Builds a page from an explicit lacing table and body, with a valid
    /// checksum.
    pub fn ogg_page_raw(
        flags: u8,
        granule: u64,
        serial: u32,
        sequence: u32,
        lacing: &[u8],
        body: &[u8],
    ) -> Vec<u8> {
        let mut page = b"OggS".to_vec();
        page.push(0);
        page.push(flags);
        page.extend_from_slice(&granule.to_le_bytes());
        page.extend_from_slice(&serial.to_le_bytes());
        page.extend_from_slice(&sequence.to_le_bytes());
        page.extend_from_slice(&[0; 4]);
        page.push(lacing.len() as u8);
        page.extend_from_slice(lacing);
        page.extend_from_slice(body);

        let crc = OGG_PAGE_CRC.checksum(&page);
        page[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        page
    }

    /// Builds a page holding complete packets.
    pub fn ogg_page(
        flags: u8,
        granule: u64,
        serial: u32,
        sequence: u32,
        packets: &[&[u8]],
    ) -> Vec<u8> {
        let table: Vec<u8> = packets.iter().flat_map(|p| lacing(p.len())).collect();
        ogg_page_raw(flags, granule, serial, sequence, &table, &packets.concat())
    }

    pub const AUDIO_PACKET_LEN: usize = 373;
    pub const PACKETS_PER_PAGE: usize = 4;
    pub const GRANULES_PER_PAGE: u64 = 4096;

    /// A complete Vorbis stream and the offset of each of its pages.
    pub struct VorbisFixture {
        pub bytes: Vec<u8>,
        pub pages: Vec<usize>,
    }

    /// Identification page, one page with comment and setup headers, then
    /// `audio_pages` pages of four 373-byte audio packets at 44.1 kHz.
    pub fn vorbis_stream(serial: u32, audio_pages: usize) -> VorbisFixture {
        let id = vorbis_id_packet(2, 44100, 128_000);
        let comment = vorbis_comment_packet("Xiph.Org libVorbis I 20200704", 2);
        let setup = vorbis_setup_packet(300);
        let audio = vorbis_audio_packet(AUDIO_PACKET_LEN);
        let audio_packets = vec![audio.as_slice(); PACKETS_PER_PAGE];

        let mut pages = vec![
            ogg_page(FLAG_BOS, 0, serial, 0, &[id.as_slice()]),
            ogg_page(0, 0, serial, 1, &[comment.as_slice(), setup.as_slice()]),
        ];
        for i in 0..audio_pages {
            let flags = if i + 1 == audio_pages { FLAG_EOS } else { 0 };
            pages.push(ogg_page(
                flags,
                GRANULES_PER_PAGE * (i as u64 + 1),
                serial,
                i as u32 + 2,
                &audio_packets,
            ));
        }

        let mut offsets = Vec::with_capacity(pages.len());
        let mut bytes = Vec::new();
        for page in pages {
            offsets.push(bytes.len());
            bytes.extend_from_slice(&page);
        }

        VorbisFixture {
            bytes,
            pages: offsets,
        }
    }
}
