//! Fixed-capacity line buffer.
//!
//! Mail protocols frame everything as CRLF-terminated lines. The buffer keeps
//! unconsumed bytes between reads and exposes the most recently parsed line
//! as a view into its storage. The view is only valid until the next read.

use std::ops::Range;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::stream::with_timeout;
use crate::{Error, Result};

/// Capacity of the session read buffer.
pub const BUFFER_CAPACITY: usize = 8192;

/// Line buffer with a fixed capacity that is never resized.
#[derive(Debug)]
pub struct LineBuffer {
    data: Vec<u8>,
    /// First byte not yet handed out as part of a line.
    start: usize,
    /// One past the last buffered byte.
    end: usize,
    /// Current line, including its CRLF when present.
    line: Range<usize>,
}

impl LineBuffer {
    /// Allocates a buffer of [`BUFFER_CAPACITY`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the storage cannot be reserved.
    pub fn new() -> Result<Self> {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)?;
        data.resize(capacity, 0);
        Ok(Self {
            data,
            start: 0,
            end: 0,
            line: 0..0,
        })
    }

    /// Returns the buffer capacity (zero once released).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Returns the current line.
    #[must_use]
    pub fn line(&self) -> &[u8] {
        &self.data[self.line.clone()]
    }

    /// Returns the number of bytes buffered beyond the current line.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.end - self.start
    }

    /// Reads the next line from `reader`.
    ///
    /// Returns the line length including its CRLF. If the reader reaches end
    /// of stream with bytes still buffered, those bytes are returned as one
    /// unterminated record; with nothing buffered, `0` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineTooLong`] if the buffer fills up without a CRLF,
    /// [`Error::Closed`] if the buffer was released, and I/O or timeout errors
    /// from the reader.
    pub async fn read_line<R>(&mut self, reader: &mut R, timeout: Option<Duration>) -> Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        if self.data.is_empty() {
            return Err(Error::Closed);
        }

        self.line = self.start..self.start;

        loop {
            if let Some(pos) = find_crlf(&self.data[self.start..self.end]) {
                let stop = self.start + pos + 2;
                self.line = self.start..stop;
                self.start = stop;
                return Ok(self.line.len());
            }

            self.compact();
            if self.end == self.data.len() {
                return Err(Error::LineTooLong {
                    capacity: self.data.len(),
                });
            }

            let n = with_timeout(timeout, reader.read(&mut self.data[self.end..])).await?;
            if n == 0 {
                self.line = self.start..self.end;
                self.start = self.end;
                return Ok(self.line.len());
            }
            self.end += n;
        }
    }

    /// Drops any buffered bytes and releases the storage.
    pub fn release(&mut self) {
        self.data = Vec::new();
        self.start = 0;
        self.end = 0;
        self.line = 0..0;
    }

    /// Moves unconsumed bytes to the front of the buffer.
    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.data.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
        self.line = 0..0;
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"250 OK\r\n"), Some(6));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"bare\n"), None);
        assert_eq!(find_crlf(b"bare\r"), None);
    }

    #[test]
    fn test_new_buffer() {
        let buffer = LineBuffer::new().unwrap();
        assert_eq!(buffer.capacity(), BUFFER_CAPACITY);
        assert!(buffer.line().is_empty());
        assert_eq!(buffer.pending(), 0);
    }

    #[tokio::test]
    async fn test_reads_one_line_per_call() {
        let mut mock = Builder::new()
            .read(b"250-First\r\n250-Second\r\n250 Third\r\n")
            .build();
        let mut buffer = LineBuffer::new().unwrap();

        assert_eq!(buffer.read_line(&mut mock, None).await.unwrap(), 11);
        assert_eq!(buffer.line(), b"250-First\r\n");
        assert_eq!(buffer.read_line(&mut mock, None).await.unwrap(), 12);
        assert_eq!(buffer.line(), b"250-Second\r\n");
        assert_eq!(buffer.read_line(&mut mock, None).await.unwrap(), 11);
        assert_eq!(buffer.line(), b"250 Third\r\n");
        assert_eq!(buffer.read_line(&mut mock, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_line_split_across_reads() {
        let mut mock = Builder::new()
            .read(b"220 mail ES")
            .read(b"MTP ready\r")
            .read(b"\n")
            .build();
        let mut buffer = LineBuffer::new().unwrap();

        let n = buffer.read_line(&mut mock, None).await.unwrap();
        assert_eq!(buffer.line(), b"220 mail ESMTP ready\r\n");
        assert_eq!(n, buffer.line().len());
    }

    #[tokio::test]
    async fn test_partial_line_survives_compaction() {
        let mut mock = Builder::new().read(b"A\r\nBBBB").read(b"\r\n").build();
        let mut buffer = LineBuffer::new().unwrap();

        buffer.read_line(&mut mock, None).await.unwrap();
        assert_eq!(buffer.line(), b"A\r\n");
        assert_eq!(buffer.pending(), 4);

        buffer.read_line(&mut mock, None).await.unwrap();
        assert_eq!(buffer.line(), b"BBBB\r\n");
        assert_eq!(buffer.pending(), 0);
    }

    #[tokio::test]
    async fn test_unterminated_record_at_eof() {
        let mut mock = Builder::new().read(b"* BYE").build();
        let mut buffer = LineBuffer::new().unwrap();

        assert_eq!(buffer.read_line(&mut mock, None).await.unwrap(), 5);
        assert_eq!(buffer.line(), b"* BYE");
        assert_eq!(buffer.read_line(&mut mock, None).await.unwrap(), 0);
        assert!(buffer.line().is_empty());
    }

    #[tokio::test]
    async fn test_line_filling_buffer_exactly() {
        let mut line = vec![b'X'; 62];
        line.extend_from_slice(b"\r\n");
        let mut mock = Builder::new().read(&line).build();
        let mut buffer = LineBuffer::with_capacity(64).unwrap();

        assert_eq!(buffer.read_line(&mut mock, None).await.unwrap(), 64);
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let data = vec![b'A'; 64];
        let mut mock = Builder::new().read(&data).build();
        let mut buffer = LineBuffer::with_capacity(64).unwrap();

        let result = buffer.read_line(&mut mock, None).await;
        assert!(matches!(result, Err(Error::LineTooLong { capacity: 64 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let mut mock = Builder::new().wait(Duration::from_secs(30)).build();
        let mut buffer = LineBuffer::new().unwrap();

        let result = buffer
            .read_line(&mut mock, Some(Duration::from_secs(1)))
            .await;
        assert!(matches!(
            result,
            Err(Error::Timeout(d)) if d == Duration::from_secs(1)
        ));
    }

    #[tokio::test]
    async fn test_released_buffer_is_closed() {
        let mut mock = Builder::new().build();
        let mut buffer = LineBuffer::new().unwrap();
        buffer.release();
        assert_eq!(buffer.capacity(), 0);
        assert!(matches!(
            buffer.read_line(&mut mock, None).await,
            Err(Error::Closed)
        ));
    }
}
