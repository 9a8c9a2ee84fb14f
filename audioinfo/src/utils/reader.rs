//! Position-counting byte reader with bounded mark/reset.
//!
//! Every parser in this crate reads through [`CountingReader`]. It keeps an
//! absolute byte offset for stamping issues and errors, decodes fixed-width
//! fields, and supports a single bounded rewind point for signature sniffing
//! and resynchronization.

use std::collections::VecDeque;
use std::io::{self, Read};

use crate::utils::errors::ReadError;

const SKIP_CHUNK: usize = 8 * 1024;

#[derive(Debug)]
struct Mark {
    position: u64,
    limit: usize,
    recorded: Vec<u8>,
    capture_len: usize,
}

/// Sequential reader that counts consumed bytes.
///
/// All multi-byte reads are strict: a short read consumes what was available and
/// fails with [`ReadError::UnexpectedEof`] carrying the position before the read.
///
/// ```rust
/// use audioinfo::utils::reader::CountingReader;
///
/// let mut reader = CountingReader::new(&[0x12, 0x34, 0x56][..]);
/// reader.mark(2);
/// assert_eq!(reader.read_u16_be()?, 0x1234);
/// reader.reset()?;
/// assert_eq!(reader.position(), 0);
/// assert!(reader.read_u32_le().is_err());
/// assert_eq!(reader.position(), 3);
/// # Ok::<(), audioinfo::utils::errors::ReadError>(())
/// ```
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    position: u64,
    replay: VecDeque<u8>,
    mark: Option<Mark>,
    capture: Option<Vec<u8>>,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            replay: VecDeque::new(),
            mark: None,
            capture: None,
        }
    }

    /// Absolute number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Makes the current position reversible for the next `limit` bytes.
    ///
    /// Replaces any earlier mark.
    pub fn mark(&mut self, limit: usize) {
        self.mark = Some(Mark {
            position: self.position,
            limit,
            recorded: Vec::with_capacity(limit),
            capture_len: self.capture.as_ref().map_or(0, Vec::len),
        });
    }

    /// Rewinds to the last mark and invalidates it.
    pub fn reset(&mut self) -> Result<(), ReadError> {
        let Some(mark) = self.mark.take() else {
            return Err(ReadError::InvalidMark(self.position));
        };

        for byte in mark.recorded.into_iter().rev() {
            self.replay.push_front(byte);
        }
        if let Some(capture) = &mut self.capture {
            capture.truncate(mark.capture_len);
        }
        self.position = mark.position;

        Ok(())
    }

    /// Starts recording every consumed byte.
    pub fn start_capture(&mut self) {
        self.capture = Some(Vec::new());
    }

    /// Stops recording and returns what was captured.
    pub fn take_capture(&mut self) -> Vec<u8> {
        self.capture.take().unwrap_or_default()
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;

        while filled < buf.len() {
            let Some(byte) = self.replay.pop_front() else {
                break;
            };
            buf[filled] = byte;
            filled += 1;
        }

        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.consume(&buf[..filled]);
        Ok(filled)
    }

    fn consume(&mut self, bytes: &[u8]) {
        self.position += bytes.len() as u64;

        if let Some(mark) = &mut self.mark {
            if mark.recorded.len() + bytes.len() > mark.limit {
                self.mark = None;
            } else {
                mark.recorded.extend_from_slice(bytes);
            }
        }

        if let Some(capture) = &mut self.capture {
            capture.extend_from_slice(bytes);
        }
    }

    /// Reads exactly `buf.len()` bytes.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ReadError> {
        let position = self.position;
        let got = self.fill(buf)?;

        if got < buf.len() {
            return Err(ReadError::UnexpectedEof {
                position,
                wanted: buf.len() as u64,
                got: got as u64,
            });
        }

        Ok(())
    }

    /// Reads up to `len` bytes; fewer only at end of data.
    pub fn read_up_to(&mut self, len: usize) -> Result<Vec<u8>, ReadError> {
        let mut buf = vec![0; len];
        let got = self.fill(&mut buf)?;
        buf.truncate(got);

        Ok(buf)
    }

    /// Returns up to `len` upcoming bytes without consuming them.
    ///
    /// Uses the mark, so any earlier mark is dropped.
    pub fn peek(&mut self, len: usize) -> Result<Vec<u8>, ReadError> {
        self.mark(len);
        let bytes = self.read_up_to(len)?;
        self.reset()?;

        Ok(bytes)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ReadError> {
        let mut buf = vec![0; len];
        self.read_exact(&mut buf)?;

        Ok(buf)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let mut buf = [0; N];
        self.read_exact(&mut buf)?;

        Ok(buf)
    }

    /// Skips exactly `len` bytes.
    pub fn skip(&mut self, len: u64) -> Result<(), ReadError> {
        let position = self.position;
        let mut chunk = [0u8; SKIP_CHUNK];
        let mut remaining = len;

        while remaining > 0 {
            let want = remaining.min(SKIP_CHUNK as u64) as usize;
            let got = self.fill(&mut chunk[..want])?;
            remaining -= got as u64;

            if got < want {
                return Err(ReadError::UnexpectedEof {
                    position,
                    wanted: len,
                    got: len - remaining,
                });
            }
        }

        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_be(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u16_le(&mut self) -> Result<u16, ReadError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16_le(&mut self) -> Result<i16, ReadError> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16_be(&mut self) -> Result<i16, ReadError> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u24_be(&mut self) -> Result<u32, ReadError> {
        let [a, b, c] = self.read_array()?;
        Ok(u32::from_be_bytes([0, a, b, c]))
    }

    pub fn read_u24_le(&mut self) -> Result<u32, ReadError> {
        let [a, b, c] = self.read_array()?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_be(&mut self) -> Result<i32, ReadError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, ReadError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_be(&mut self) -> Result<u64, ReadError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, ReadError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_be(&mut self) -> Result<i64, ReadError> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, ReadError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Reads `len` bytes as ASCII; other bytes become U+FFFD.
    pub fn read_string(&mut self, len: usize) -> Result<String, ReadError> {
        let bytes = self.read_bytes(len)?;

        Ok(bytes
            .into_iter()
            .map(|b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
            .collect())
    }

    /// Reads an 80-bit big-endian IEEE 754 extended precision float.
    pub fn read_extended_f64_be(&mut self) -> Result<f64, ReadError> {
        let bytes: [u8; 10] = self.read_array()?;
        Ok(extended_to_f64(bytes))
    }
}

/// Converts 80-bit extended precision (explicit integer bit) to `f64`.
pub fn extended_to_f64(bytes: [u8; 10]) -> f64 {
    let sign_exp = u16::from_be_bytes([bytes[0], bytes[1]]);
    let mut mantissa = [0u8; 8];
    mantissa.copy_from_slice(&bytes[2..]);
    let mantissa = u64::from_be_bytes(mantissa);

    let sign = if sign_exp & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = (sign_exp & 0x7FFF) as i32;

    if exponent == 0 && mantissa == 0 {
        return sign * 0.0;
    }
    if exponent == 0x7FFF {
        return if mantissa << 1 == 0 {
            sign * f64::INFINITY
        } else {
            f64::NAN
        };
    }

    // value = mantissa * 2^(exponent - bias - 63), split to stay in range
    let shift = exponent - 16383 - 63;
    let half = shift / 2;
    sign * (mantissa as f64) * 2f64.powi(half) * 2f64.powi(shift - half)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("device failure"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(0xAA);
            self.remaining -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_integer_widths() {
        let data = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xFF, 0xFE, 0x10, 0x20, 0x30,
        ];
        let mut reader = CountingReader::new(&data[..]);

        assert_eq!(reader.read_u16_be().unwrap(), 0x0102);
        assert_eq!(reader.read_u16_le().unwrap(), 0x0403);
        assert_eq!(reader.read_u32_le().unwrap(), 0x0807_0605);
        assert_eq!(reader.read_i16_be().unwrap(), -2);
        assert_eq!(reader.read_u24_be().unwrap(), 0x10_2030);
        assert_eq!(reader.position(), 13);
    }

    #[test]
    fn test_wide_and_signed() {
        let data = [
            0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00,
        ];
        let mut reader = CountingReader::new(&data[..]);
        assert_eq!(reader.read_i64_le().unwrap(), -2);
        assert_eq!(reader.read_u64_be().unwrap(), 0x100);
    }

    #[test]
    fn test_short_read_reports_start_position() {
        let mut reader = CountingReader::new(&[1, 2, 3, 4, 5][..]);
        reader.read_u16_be().unwrap();

        match reader.read_u32_be() {
            Err(ReadError::UnexpectedEof {
                position,
                wanted,
                got,
            }) => {
                assert_eq!((position, wanted, got), (2, 4, 3));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn test_io_failure_is_not_eof() {
        let mut reader = CountingReader::new(FailingReader { remaining: 2 });
        let err = reader.read_u32_be().unwrap_err();
        assert!(!err.is_eof());
        assert!(matches!(err, ReadError::Io(_)));
    }

    #[test]
    fn test_mark_reset_replays() {
        let mut reader = CountingReader::new(&b"OggS-rest"[..]);
        reader.mark(4);
        assert_eq!(reader.read_bytes(4).unwrap(), b"OggS");
        reader.reset().unwrap();
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_string(9).unwrap(), "OggS-rest");
    }

    #[test]
    fn test_later_mark_overwrites() {
        let mut reader = CountingReader::new(&[1, 2, 3, 4, 5, 6][..]);
        reader.mark(6);
        reader.read_u8().unwrap();
        reader.mark(2);
        reader.read_u16_be().unwrap();
        reader.reset().unwrap();
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.read_u8().unwrap(), 2);
    }

    #[test]
    fn test_reset_requires_valid_mark() {
        let mut reader = CountingReader::new(&[0u8; 16][..]);
        assert!(matches!(reader.reset(), Err(ReadError::InvalidMark(0))));

        reader.mark(2);
        reader.read_u16_be().unwrap();
        reader.reset().unwrap();
        assert!(matches!(reader.reset(), Err(ReadError::InvalidMark(0))));

        reader.mark(2);
        reader.read_u32_be().unwrap();
        assert!(matches!(reader.reset(), Err(ReadError::InvalidMark(4))));
    }

    #[test]
    fn test_nested_replay_after_reset() {
        let mut reader = CountingReader::new(&[1, 2, 3, 4, 5][..]);
        reader.mark(3);
        reader.read_bytes(3).unwrap();
        reader.reset().unwrap();

        reader.read_u8().unwrap();
        reader.mark(4);
        assert_eq!(reader.read_bytes(4).unwrap(), vec![2, 3, 4, 5]);
        reader.reset().unwrap();
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.read_bytes(4).unwrap(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_peek_and_skip() {
        let mut reader = CountingReader::new(&[9, 8, 7, 6, 5][..]);
        assert_eq!(reader.peek(8).unwrap(), vec![9, 8, 7, 6, 5]);
        assert_eq!(reader.position(), 0);

        reader.skip(3).unwrap();
        assert_eq!(reader.position(), 3);

        let err = reader.skip(10).unwrap_err();
        assert!(matches!(
            err,
            ReadError::UnexpectedEof {
                position: 3,
                wanted: 10,
                got: 2
            }
        ));
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn test_capture_follows_reset() {
        let mut reader = CountingReader::new(&[1, 2, 3, 4, 5, 6][..]);
        reader.start_capture();
        reader.read_u8().unwrap();
        reader.mark(2);
        reader.read_u16_be().unwrap();
        reader.reset().unwrap();
        reader.skip(3).unwrap();

        assert_eq!(reader.take_capture(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_string_replacement() {
        let mut reader = CountingReader::new(&[b'T', b'A', 0xC3, b'G'][..]);
        assert_eq!(reader.read_string(4).unwrap(), "TA\u{FFFD}G");
    }

    #[test]
    fn test_extended_float() {
        let rate = [0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0];
        let mut reader = CountingReader::new(&rate[..]);
        assert_eq!(reader.read_extended_f64_be().unwrap(), 44100.0);

        assert_eq!(extended_to_f64([0x3F, 0xFF, 0x80, 0, 0, 0, 0, 0, 0, 0]), 1.0);
        assert_eq!(extended_to_f64([0xBF, 0xFF, 0x80, 0, 0, 0, 0, 0, 0, 0]), -1.0);

        let negative_zero = extended_to_f64([0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(negative_zero, 0.0);
        assert!(negative_zero.is_sign_negative());
        assert!(extended_to_f64([0x7F, 0xFF, 0x80, 0, 0, 0, 0, 0, 0, 0]).is_infinite());
    }
}
