/// Default cap on a single unterminated line, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Device sent {discarded} bytes without a line terminator (limit {limit})")]
pub struct LineOverflow {
    pub discarded: usize,
    pub limit: usize,
}

/// Splits the inbound byte stream into CR LF terminated text lines.
///
/// Bytes after the last terminator are kept and prepended to the next [`feed`](Self::feed).
#[derive(Debug)]
pub struct LineAssembler {
    buffer: Vec<u8>,
    max_line_len: usize,
    // Dropping the rest of an oversized line up to its terminator
    skipping: bool,
    overflow: Option<LineOverflow>,
}

impl LineAssembler {
    /// Create an assembler that drops unterminated lines longer than `max_line_len` bytes.
    pub fn new(max_line_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_len,
            skipping: false,
            overflow: None,
        }
    }

    /// Append raw bytes and return the complete lines now available.
    pub fn feed(&mut self, bytes: &[u8]) -> Lines<'_> {
        self.extend(bytes);
        self.lines()
    }

    /// Append raw bytes without draining any lines.
    pub fn extend(&mut self, bytes: &[u8]) {
        let mut bytes = bytes;
        if self.skipping {
            match bytes.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.skipping = false;
                    bytes = &bytes[pos + 1..];
                }
                None => bytes = &[],
            }
        }
        self.buffer.extend_from_slice(bytes);

        let tail_start = self
            .buffer
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        let tail_len = self.buffer.len() - tail_start;
        if tail_len > self.max_line_len {
            log::warn!(
                "Dropping {} unterminated bytes from device, line limit is {}",
                tail_len,
                self.max_line_len
            );
            self.buffer.truncate(tail_start);
            self.skipping = true;
            self.overflow = Some(LineOverflow {
                discarded: tail_len,
                limit: self.max_line_len,
            });
        }
    }

    /// Lines already buffered by earlier feeds.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { assembler: self }
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Forget buffered bytes and any pending overflow.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.skipping = false;
        self.overflow = None;
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LEN)
    }
}

/// Draining iterator over complete lines, terminator removed.
///
/// Lines that are not valid UTF-8 are logged and skipped. A pending overflow is
/// reported once, after the complete lines that preceded it.
pub struct Lines<'a> {
    assembler: &'a mut LineAssembler,
}

impl Iterator for Lines<'_> {
    type Item = Result<String, LineOverflow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(pos) = self.assembler.buffer.iter().position(|&b| b == b'\n') else {
                return self.assembler.overflow.take().map(Err);
            };

            let mut raw: Vec<u8> = self.assembler.buffer.drain(..=pos).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }

            match String::from_utf8(raw) {
                Ok(line) => return Some(Ok(line)),
                Err(e) => {
                    log::warn!("Discarding undecodable line from device: {}", e);
                }
            }
        }
    }
}
