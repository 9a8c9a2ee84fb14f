use std::io::Read;

use crate::utils::errors::ReadError;
use crate::utils::reader::CountingReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resync {
    /// A matching window starts at the current position.
    Found { skipped: u64 },
    /// Data ended before a full window matched. Everything was consumed.
    Exhausted { skipped: u64 },
}

impl Resync {
    pub fn skipped(&self) -> u64 {
        match *self {
            Resync::Found { skipped } | Resync::Exhausted { skipped } => skipped,
        }
    }
}

/// Advances one byte at a time until the next `width` bytes satisfy `matches`.
///
/// The matching window is left unconsumed.
pub fn resync<R, F>(
    reader: &mut CountingReader<R>,
    width: usize,
    mut matches: F,
) -> Result<Resync, ReadError>
where
    R: Read,
    F: FnMut(&[u8]) -> bool,
{
    let mut skipped = 0;

    loop {
        reader.mark(width);
        let window = reader.read_up_to(width)?;
        reader.reset()?;

        if window.len() < width {
            reader.skip(window.len() as u64)?;
            return Ok(Resync::Exhausted {
                skipped: skipped + window.len() as u64,
            });
        }
        if matches(&window) {
            return Ok(Resync::Found { skipped });
        }

        reader.skip(1)?;
        skipped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found() {
        let data = b"garbageOggS....";
        let mut reader = CountingReader::new(&data[..]);
        let result = resync(&mut reader, 4, |w| w == b"OggS").unwrap();

        assert_eq!(result, Resync::Found { skipped: 7 });
        assert_eq!(reader.position(), 7);
        assert_eq!(reader.read_bytes(4).unwrap(), b"OggS");
    }

    #[test]
    fn test_found_immediately() {
        let mut reader = CountingReader::new(&b"OggS"[..]);
        assert_eq!(
            resync(&mut reader, 4, |w| w == b"OggS").unwrap(),
            Resync::Found { skipped: 0 }
        );
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn test_exhausted() {
        let data = [0x12u8, 0xFF, 0xE0, 0x00, 0xFF, 0xF0];
        let mut reader = CountingReader::new(&data[..]);
        let result = resync(&mut reader, 4, |w| w[0] == 0xFF && w[1] == 0xFB).unwrap();

        assert_eq!(result, Resync::Exhausted { skipped: 6 });
        assert_eq!(result.skipped(), 6);
        assert_eq!(reader.position(), 6);
    }
}
