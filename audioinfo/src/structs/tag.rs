//! Tag blocks that surround MPEG audio frames.
//!
//! A leading ID3v2 block declares its own size as a synch-safe integer (seven
//! payload bits per byte). Trailing tags (ID3v1, Lyrics3, APE) are only
//! recognized by their marker so that the frame scan can stop cleanly.

use std::fmt;
use std::io::Read;

use crate::utils::errors::ReadError;
use crate::utils::reader::CountingReader;

pub const ID3V2_MAGIC: &[u8; 3] = b"ID3";
pub const ID3V2_HEADER_LEN: u64 = 10;
pub const ID3V2_FOOTER_FLAG: u8 = 0x10;

/// Longest trailing tag marker.
pub const TRAILING_TAG_PEEK: usize = 8;

/// Decodes a 28-bit synch-safe integer. The high bit of each byte is ignored.
pub const fn decode_synchsafe(bytes: [u8; 4]) -> u32 {
    ((bytes[0] as u32 & 0x7F) << 21)
        | ((bytes[1] as u32 & 0x7F) << 14)
        | ((bytes[2] as u32 & 0x7F) << 7)
        | (bytes[3] as u32 & 0x7F)
}

/// Encodes the low 28 bits of `value` as a synch-safe integer.
pub const fn encode_synchsafe(value: u32) -> [u8; 4] {
    [
        ((value >> 21) & 0x7F) as u8,
        ((value >> 14) & 0x7F) as u8,
        ((value >> 7) & 0x7F) as u8,
        (value & 0x7F) as u8,
    ]
}

/// Header of a leading ID3v2 tag block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Id3v2Header {
    pub location: u64,
    pub major: u8,
    pub revision: u8,
    pub flags: u8,
    /// Size of the tag body, excluding header and footer.
    pub size: u32,
}

impl Id3v2Header {
    /// Reads the 10-byte header at the current position.
    ///
    /// The caller has already checked the `ID3` marker.
    pub fn read<R: Read>(reader: &mut CountingReader<R>) -> Result<Self, ReadError> {
        let location = reader.position();
        let mut header = [0u8; ID3V2_HEADER_LEN as usize];
        reader.read_exact(&mut header)?;

        Ok(Self {
            location,
            major: header[3],
            revision: header[4],
            flags: header[5],
            size: decode_synchsafe([header[6], header[7], header[8], header[9]]),
        })
    }

    pub fn has_footer(&self) -> bool {
        self.flags & ID3V2_FOOTER_FLAG != 0
    }

    /// Bytes after the header that belong to this block.
    pub fn remaining_len(&self) -> u64 {
        self.size as u64
            + if self.has_footer() {
                ID3V2_HEADER_LEN
            } else {
                0
            }
    }

    /// Total block length, header included.
    pub fn total_len(&self) -> u64 {
        ID3V2_HEADER_LEN + self.remaining_len()
    }
}

impl fmt::Display for Id3v2Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ID3v2.{}.{} at {} ({} bytes)",
            self.major,
            self.revision,
            self.location,
            self.total_len()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingTag {
    Id3v1,
    Lyrics3,
    Ape,
}

const TRAILING_TAGS: [(&[u8], TrailingTag); 3] = [
    (b"TAG", TrailingTag::Id3v1),
    (b"LYRICSBE", TrailingTag::Lyrics3),
    (b"APETAGEX", TrailingTag::Ape),
];

impl TrailingTag {
    /// Recognizes a trailing tag marker at the start of `bytes`.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        TRAILING_TAGS
            .iter()
            .find(|(marker, _)| bytes.starts_with(marker))
            .map(|&(_, tag)| tag)
    }
}

impl fmt::Display for TrailingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrailingTag::Id3v1 => write!(f, "ID3v1"),
            TrailingTag::Lyrics3 => write!(f, "Lyrics3"),
            TrailingTag::Ape => write!(f, "APE"),
        }
    }
}

#[test]
fn test_synchsafe() {
    assert_eq!(decode_synchsafe([0x00, 0x00, 0x02, 0x01]), 257);
    assert_eq!(decode_synchsafe([0x7F, 0x7F, 0x7F, 0x7F]), 0x0FFF_FFFF);
    assert_eq!(decode_synchsafe([0x80, 0x80, 0x80, 0x81]), 1);
    assert_eq!(encode_synchsafe(257), [0x00, 0x00, 0x02, 0x01]);
    assert_eq!(encode_synchsafe(0x0FFF_FFFF), [0x7F; 4]);
    assert_eq!(decode_synchsafe(encode_synchsafe(1_000_000)), 1_000_000);
}

#[test]
fn test_id3v2_header() {
    let data = [b'I', b'D', b'3', 4, 0, ID3V2_FOOTER_FLAG, 0, 0, 0x01, 0x00];
    let mut reader = CountingReader::new(&data[..]);
    let header = Id3v2Header::read(&mut reader).unwrap();

    assert_eq!(header.major, 4);
    assert_eq!(header.size, 128);
    assert!(header.has_footer());
    assert_eq!(header.total_len(), 148);
}

#[test]
fn test_trailing_tags() {
    assert_eq!(TrailingTag::detect(b"TAGTitle"), Some(TrailingTag::Id3v1));
    assert_eq!(TrailingTag::detect(b"LYRICSBEGIN"), Some(TrailingTag::Lyrics3));
    assert_eq!(TrailingTag::detect(b"APETAGEX"), Some(TrailingTag::Ape));
    assert_eq!(TrailingTag::detect(b"APETAG"), None);
    assert_eq!(TrailingTag::detect(&[0xFF, 0xFB]), None);
}
