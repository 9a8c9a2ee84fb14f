//! Ogg page headers and lacing.
//!
//! ```text
//! 0      4       5      6          14       18        22     26     27
//! | OggS | vers. | type | granule  | serial | sequence | crc  | segs | lacing...
//! ```
//!
//! All multi-byte fields are little-endian. Packets are split into lacing
//! values of up to 255 bytes; a value below 255 ends a packet, a trailing run
//! of 255 leaves the packet open for the next page.

use std::io::Read;

use crate::utils::errors::ReadError;
use crate::utils::reader::CountingReader;

pub const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
pub const PAGE_VERSION: u8 = 0;

pub const FLAG_CONTINUED: u8 = 0x01;
pub const FLAG_BOS: u8 = 0x02;
pub const FLAG_EOS: u8 = 0x04;

pub const MAX_LACING: u8 = 255;

/// Granule position of a page on which no packet ends.
pub const NO_GRANULE: u64 = u64::MAX;

/// Byte offset of the checksum field within a page.
pub const CHECKSUM_OFFSET: usize = 22;

/// Fixed part of a page header, capture pattern included.
pub const PAGE_HEADER_LEN: usize = 27;

/// Contiguous bytes of one packet on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSegment {
    pub size: u32,
    /// The packet ends within this page.
    pub finished: bool,
    /// The packet started on an earlier page.
    pub continued: bool,
}

/// Rebuilds packet segments from a lacing table.
pub fn segments_from_lacing(lacing: &[u8], continued: bool) -> Vec<PacketSegment> {
    let mut segments = Vec::new();
    let mut size = 0u32;
    let mut first = true;

    for &value in lacing {
        size += value as u32;

        if value < MAX_LACING {
            segments.push(PacketSegment {
                size,
                finished: true,
                continued: continued && first,
            });
            size = 0;
            first = false;
        }
    }

    if lacing.last() == Some(&MAX_LACING) {
        segments.push(PacketSegment {
            size,
            finished: false,
            continued: continued && first,
        });
    }

    segments
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub location: u64,
    pub version: u8,
    pub flags: u8,
    pub granule: u64,
    pub serial: u32,
    pub sequence: u32,
    pub checksum: u32,
    pub lacing: Vec<u8>,
}

impl PageHeader {
    /// Reads the header fields that follow the capture pattern.
    ///
    /// `location` is the offset of the capture pattern. Stops after the version
    /// byte when the version is not supported.
    pub fn read<R: Read>(reader: &mut CountingReader<R>, location: u64) -> Result<Self, ReadError> {
        let version = reader.read_u8()?;
        if version != PAGE_VERSION {
            return Ok(Self {
                location,
                version,
                flags: 0,
                granule: NO_GRANULE,
                serial: 0,
                sequence: 0,
                checksum: 0,
                lacing: Vec::new(),
            });
        }

        let flags = reader.read_u8()?;
        let granule = reader.read_u64_le()?;
        let serial = reader.read_u32_le()?;
        let sequence = reader.read_u32_le()?;
        let checksum = reader.read_u32_le()?;
        let count = reader.read_u8()?;
        let lacing = reader.read_bytes(count as usize)?;

        Ok(Self {
            location,
            version,
            flags,
            granule,
            serial,
            sequence,
            checksum,
            lacing,
        })
    }

    pub fn is_continued(&self) -> bool {
        self.flags & FLAG_CONTINUED != 0
    }

    pub fn is_bos(&self) -> bool {
        self.flags & FLAG_BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.flags & FLAG_EOS != 0
    }

    /// Granule position, if a packet ends on this page.
    pub fn granule(&self) -> Option<u64> {
        (self.granule != NO_GRANULE).then_some(self.granule)
    }

    pub fn segments(&self) -> Vec<PacketSegment> {
        segments_from_lacing(&self.lacing, self.is_continued())
    }

    pub fn body_len(&self) -> u64 {
        self.lacing.iter().map(|&v| v as u64).sum()
    }

    pub fn header_len(&self) -> usize {
        PAGE_HEADER_LEN + self.lacing.len()
    }
}
