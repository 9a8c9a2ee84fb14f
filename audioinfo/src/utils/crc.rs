//! CRC validation for Ogg pages.
//!
//! Ogg uses a direct (non-reflected) CRC-32 with polynomial 0x04C11DB7, zero
//! initial value and no final xor, computed over the whole page with the
//! checksum field set to zero.

/// CRC parameters: polynomial and initial value.
pub struct Algorithm<T> {
    poly: T,
    init: T,
}

/// CRC-32 algorithm for Ogg page validation.
pub const CRC_OGG_PAGE_ALG: Algorithm<u32> = Algorithm {
    poly: 0x04C1_1DB7,
    init: 0x0000_0000,
};

/// Shifts `len` bits of `value` (aligned to the top byte) through the polynomial.
#[inline(always)]
pub const fn crc32(poly: u32, mut value: u32, len: usize) -> u32 {
    value <<= 24;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 31) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc32_table(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc32(poly, i as u32, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc32 {
    pub poly: u32,
    pub init: u32,
    table: [u32; 256],
}

impl Crc32 {
    pub const fn new(algorithm: &Algorithm<u32>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc32_table(algorithm.poly),
        }
    }

    const fn table_entry(&self, index: u32) -> u32 {
        self.table[(index & 0xFF) as usize]
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table_entry((crc >> 24) ^ bytes[i] as u32) ^ (crc << 8);
            i += 1;
        }

        crc
    }

    pub const fn checksum(&self, bytes: &[u8]) -> u32 {
        self.update(self.init, bytes)
    }
}

pub static OGG_PAGE_CRC: Crc32 = Crc32::new(&CRC_OGG_PAGE_ALG);

#[test]
fn test_ogg_crc_table() {
    assert_eq!(OGG_PAGE_CRC.checksum(&[]), 0);
    assert_eq!(OGG_PAGE_CRC.checksum(&[0x01]), 0x04C1_1DB7);
    assert_eq!(OGG_PAGE_CRC.checksum(&[0x00, 0x00, 0x00]), 0);
}

#[test]
fn test_ogg_crc_is_linear() {
    let a = b"OggS\x00\x02 first page body";
    let b = b"OggS\x00\x04 other page body";
    let xored: Vec<u8> = a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect();

    assert_eq!(
        OGG_PAGE_CRC.checksum(a) ^ OGG_PAGE_CRC.checksum(b),
        OGG_PAGE_CRC.checksum(&xored)
    );
    assert_ne!(OGG_PAGE_CRC.checksum(a), OGG_PAGE_CRC.checksum(b));
}

#[test]
fn test_ogg_crc_incremental() {
    let data = b"capture pattern and segment table";
    let (head, tail) = data.split_at(11);
    let partial = OGG_PAGE_CRC.update(OGG_PAGE_CRC.init, head);

    assert_eq!(OGG_PAGE_CRC.update(partial, tail), OGG_PAGE_CRC.checksum(data));
}
