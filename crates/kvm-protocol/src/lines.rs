//! CRLF line reassembly
//!
//! The switching devices speak ASCII lines terminated by `\r\n`, but a serial
//! read returns whatever bytes happen to be in the UART buffer: half a line,
//! three lines and a fragment, or a terminator split across two reads. The
//! codec buffers raw bytes and hands back complete lines one at a time, so a
//! read loop drains every finished line before it consumes more bytes and a
//! trailing fragment always survives until its terminator arrives.

const TERMINATOR: &[u8] = b"\r\n";

/// Upper bound on buffered bytes awaiting a terminator
///
/// A real command or status row is well under 100 bytes; anything that grows
/// past this without a CRLF is a device streaming garbage, and we keep only
/// the tail so a later terminator can still resynchronize the stream.
const MAX_BUFFERED: usize = 64 * 1024;

/// Streaming line codec for CRLF-delimited device output
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create an empty codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        if self.buffer.len() > MAX_BUFFERED {
            let start = self.buffer.len() - MAX_BUFFERED / 2;
            self.buffer.drain(..start);
        }
    }

    /// Extract the next complete line, if one is buffered
    ///
    /// Returns the line without its terminator. A lone `\n` is not a
    /// terminator; the devices always send the full CRLF pair.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self
            .buffer
            .windows(TERMINATOR.len())
            .position(|w| w == TERMINATOR)?;

        let line_bytes: Vec<u8> = self.buffer.drain(..pos + TERMINATOR.len()).collect();
        Some(String::from_utf8_lossy(&line_bytes[..pos]).into_owned())
    }

    /// Number of bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any buffered partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
