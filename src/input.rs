use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Unified input reader that handles both file and pipe input with buffered reading
pub struct InputReader {
    reader: Box<dyn Read>,
    name: String,
    is_pipe: bool,
}

impl InputReader {
    /// Create a new InputReader from a path
    /// Use "-" for stdin pipe input
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let input_path = input_path.as_ref();
        let path_str = input_path.to_string_lossy();

        if path_str == "-" {
            let mut input = Self::from_reader(io::stdin().lock(), "stdin");
            input.is_pipe = true;
            return Ok(input);
        }

        let file = File::open(input_path)
            .with_context(|| format!("Failed to open {}", input_path.display()))?;
        Ok(Self::from_reader(BufReader::new(file), &path_str))
    }

    pub fn from_reader(reader: impl Read + 'static, name: &str) -> Self {
        Self {
            reader: Box::new(reader),
            name: name.to_string(),
            is_pipe: false,
        }
    }

    /// Name used in reports and error messages
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if this is pipe input
    pub fn is_pipe(&self) -> bool {
        self.is_pipe
    }

    /// Returns up to `len` leading bytes without consuming them
    ///
    /// Works on pipes too: the bytes are replayed ahead of the rest of the input.
    pub fn sniff(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut prefix = Vec::with_capacity(len);
        (&mut self.reader).take(len as u64).read_to_end(&mut prefix)?;

        let rest = std::mem::replace(&mut self.reader, Box::new(io::empty()));
        self.reader = Box::new(Cursor::new(prefix.clone()).chain(rest));

        Ok(prefix)
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}
