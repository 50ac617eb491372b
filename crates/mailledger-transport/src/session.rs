//! Transport session: one connection, its optional TLS overlay, and its
//! read buffer.
//!
//! A session is owned by exactly one task. It is created connected by
//! [`connect`](crate::connect), mutated by status checks, TLS upgrades and
//! line reads, and released by [`TransportSession::close`] or by dropping it.
//! Release always happens in the same order: TLS state, then the socket,
//! then the buffer.

use std::borrow::Cow;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::buffer::LineBuffer;
use crate::config::TlsVerification;
use crate::status::Status;
use crate::stream::{TransportStream, with_timeout};
use crate::{Error, Result};

/// Outcome of a write: how many bytes went out versus how many were handed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    /// Bytes written to the stream.
    pub transferred: usize,
    /// Bytes the caller asked to write.
    pub expected: usize,
}

impl Transfer {
    /// Returns true if every byte was written.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.transferred == self.expected
    }

    /// Converts a short transfer into an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShortTransfer`] if fewer bytes than expected were written.
    pub fn complete(self) -> Result<usize> {
        if self.is_complete() {
            Ok(self.transferred)
        } else {
            Err(Error::ShortTransfer {
                transferred: self.transferred,
                expected: self.expected,
            })
        }
    }
}

/// A live or terminated client connection.
pub struct TransportSession {
    stream: Option<TransportStream>,
    host: String,
    peer_ip: IpAddr,
    status: Status,
    buffer: LineBuffer,
    verification: TlsVerification,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl TransportSession {
    /// Wraps a freshly connected socket.
    ///
    /// If the buffer cannot be allocated the socket is dropped (and closed)
    /// together with the error.
    pub(crate) fn from_connected(host: &str, tcp: TcpStream, peer_ip: IpAddr) -> Result<Self> {
        let buffer = match LineBuffer::new() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!(host, %peer_ip, "unable to allocate the session buffer");
                drop(tcp);
                return Err(e);
            }
        };

        Ok(Self {
            stream: Some(TransportStream::Plain(tcp)),
            host: host.to_string(),
            peer_ip,
            status: Status::Connected,
            buffer,
            verification: TlsVerification::default(),
            read_timeout: None,
            write_timeout: None,
        })
    }

    /// Returns the host this session was connected to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the peer address captured at connect time.
    #[must_use]
    pub const fn peer_ip(&self) -> IpAddr {
        self.peer_ip
    }

    /// Returns true once TLS has been established.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.stream.as_ref().is_some_and(TransportStream::is_tls)
    }

    /// Returns true while the session still owns its socket.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Sets the socket read and write timeouts.
    pub const fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) {
        self.read_timeout = read;
        self.write_timeout = write;
    }

    /// Returns the configured `(read, write)` timeouts.
    #[must_use]
    pub const fn timeouts(&self) -> (Option<Duration>, Option<Duration>) {
        (self.read_timeout, self.write_timeout)
    }

    /// Sets the certificate verification policy used by [`Self::secure`].
    pub const fn set_verification(&mut self, verification: TlsVerification) {
        self.verification = verification;
    }

    /// Determines the connection status.
    ///
    /// The cached status stays authoritative unless a liveness probe actively
    /// contradicts it. The TLS layer is asked first; if it has nothing to add
    /// the cached value is kept, otherwise the TCP layer gets the same chance.
    /// Anything else forces (and persists) [`Status::Error`].
    pub fn status(&mut self) -> Status {
        let cached = self.status;
        let next = match &self.stream {
            Some(stream) if !cached.is_error() => {
                match stream.probe_tls().map(|probe| cached.next(probe)) {
                    Some(status) if !status.is_error() => status,
                    _ => cached.next(stream.probe_tcp()),
                }
            }
            _ => Status::Error,
        };

        if next != cached {
            debug!(host = %self.host, from = %cached, to = %next, "status changed");
        }
        self.status = next;
        next
    }

    /// Establishes TLS over the connected socket.
    ///
    /// Succeeds without doing anything when TLS is already up. On success the
    /// status becomes [`Status::Connected`]. On failure the status becomes
    /// [`Status::Error`] and no TLS state is kept; after a failed handshake the
    /// socket is gone as well.
    ///
    /// Bytes the server sent after the reply that preceded the upgrade are
    /// never carried into the secure channel: if any are buffered the upgrade
    /// is refused before the handshake starts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the session no longer owns a socket,
    /// [`Error::InvalidDnsName`] if the host is not a valid server name,
    /// [`Error::SecureUpgrade`] if the status is already [`Status::Error`],
    /// plaintext is buffered or the handshake fails, and [`Error::Timeout`]
    /// if the handshake does not finish in time.
    pub async fn secure(&mut self) -> Result<()> {
        if self.is_secure() {
            return Ok(());
        }
        if self.status.is_error() {
            return Err(if self.stream.is_some() {
                Error::SecureUpgrade(std::io::Error::other("session status is error"))
            } else {
                Error::Closed
            });
        }
        if self.buffer.pending() > 0 {
            warn!(
                host = %self.host,
                pending = self.buffer.pending(),
                "plaintext buffered before TLS upgrade"
            );
            self.status = Status::Error;
            return Err(Error::SecureUpgrade(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "plaintext received ahead of the TLS handshake",
            )));
        }

        let server_name = match ServerName::try_from(self.host.clone()) {
            Ok(name) => name,
            Err(e) => {
                self.status = Status::Error;
                return Err(e.into());
            }
        };
        let Some(stream) = self.stream.take() else {
            self.status = Status::Error;
            return Err(Error::Closed);
        };

        let upgrade = stream.upgrade_to_tls(server_name, self.verification);
        let result = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, upgrade)
                .await
                .unwrap_or(Err(Error::Timeout(limit))),
            None => upgrade.await,
        };

        match result {
            Ok(stream) => {
                debug!(host = %self.host, "TLS established");
                self.stream = Some(stream);
                self.status = Status::Connected;
                Ok(())
            }
            Err(e) => {
                warn!(host = %self.host, error = %e, "TLS upgrade failed");
                self.status = Status::Error;
                Err(e)
            }
        }
    }

    /// Reads the next line into the session buffer.
    ///
    /// Returns the line length (CRLF included), or `0` when the peer shut the
    /// connection down in an orderly way, which also moves the status to
    /// [`Status::ShutdownGraceful`]. The line is available from [`Self::line`]
    /// until the next read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`], [`Error::LineTooLong`], [`Error::Timeout`] or
    /// an I/O error. Every error forces [`Status::Error`].
    pub async fn read_line(&mut self) -> Result<usize> {
        let Some(stream) = self.stream.as_mut() else {
            self.status = Status::Error;
            return Err(Error::Closed);
        };

        match self.buffer.read_line(stream, self.read_timeout).await {
            Ok(0) => {
                trace!(host = %self.host, "peer shut down the connection");
                if !self.status.is_error() {
                    self.status = Status::ShutdownGraceful;
                }
                Ok(0)
            }
            Ok(n) => {
                trace!(len = n, line = %self.line_lossy().trim_end(), "read");
                Ok(n)
            }
            Err(e) => {
                debug!(host = %self.host, error = %e, "read failed");
                self.status = Status::Error;
                Err(e)
            }
        }
    }

    /// Returns the most recently read line, including its CRLF if present.
    #[must_use]
    pub fn line(&self) -> &[u8] {
        self.buffer.line()
    }

    /// Returns the current line as text, replacing invalid UTF-8.
    #[must_use]
    pub fn line_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.buffer.line())
    }

    /// Writes `data` to the stream.
    ///
    /// A short write is not an error at this layer: the returned [`Transfer`]
    /// says how many bytes actually went out. Use [`Transfer::complete`] to
    /// turn a short transfer into an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the session has no socket, and I/O or
    /// timeout errors if nothing could be written. Errors force
    /// [`Status::Error`]; so does a failure after partial progress, which is
    /// reported as a short [`Transfer`] instead.
    pub async fn write(&mut self, data: &[u8]) -> Result<Transfer> {
        let Some(stream) = self.stream.as_mut() else {
            self.status = Status::Error;
            return Err(Error::Closed);
        };

        let (written, failure) = send(stream, data, self.write_timeout).await;
        if let Some(e) = failure {
            self.status = Status::Error;
            if written == 0 {
                return Err(e);
            }
            warn!(written, expected = data.len(), error = %e, "write interrupted");
        }

        trace!(written, expected = data.len(), "write");
        Ok(Transfer {
            transferred: written,
            expected: data.len(),
        })
    }

    /// Formats `args` and writes the result.
    ///
    /// # Errors
    ///
    /// Same as [`Self::write`].
    pub async fn print(&mut self, args: fmt::Arguments<'_>) -> Result<Transfer> {
        let text = fmt::format(args);
        self.write(text.as_bytes()).await
    }

    /// Closes the session.
    ///
    /// Sends a TLS close_notify when TLS is up, then releases the TLS state,
    /// the socket and the buffer, in that order. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if stream.is_tls()
                && let Err(e) = with_timeout(self.write_timeout, stream.shutdown_tls()).await
            {
                debug!(host = %self.host, error = %e, "TLS close_notify failed");
            }
            stream.teardown();
            debug!(host = %self.host, "session closed");
        }
        self.buffer.release();
        self.status = Status::Error;
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.teardown();
        }
        self.buffer.release();
    }
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("host", &self.host)
            .field("peer_ip", &self.peer_ip)
            .field("status", &self.status)
            .field("open", &self.stream.is_some())
            .field("secure", &self.is_secure())
            .field("buffer_capacity", &self.buffer.capacity())
            .finish_non_exhaustive()
    }
}

/// Writes as much of `data` as the stream accepts, then flushes.
///
/// Returns the bytes written and the error that cut the transfer short.
async fn send<W>(stream: &mut W, data: &[u8], timeout: Option<Duration>) -> (usize, Option<Error>)
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < data.len() {
        match with_timeout(timeout, stream.write(&data[written..])).await {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) => return (written, Some(e)),
        }
    }

    match with_timeout(timeout, stream.flush()).await {
        Ok(()) => (written, None),
        Err(e) => (written, Some(e)),
    }
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
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio_test::io::Builder;

    #[test]
    fn test_transfer_complete() {
        let transfer = Transfer {
            transferred: 6,
            expected: 6,
        };
        assert!(transfer.is_complete());
        assert_eq!(transfer.complete().unwrap(), 6);
    }

    #[test]
    fn test_transfer_short() {
        let transfer = Transfer {
            transferred: 3,
            expected: 16,
        };
        assert!(!transfer.is_complete());
        assert!(matches!(
            transfer.complete(),
            Err(Error::ShortTransfer {
                transferred: 3,
                expected: 16,
            })
        ));
    }

    /// Accepts every write, then fails to flush.
    struct FlushFails(Vec<u8>);

    impl AsyncWrite for FlushFails {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.0.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_send_writes_everything() {
        let mut mock = Builder::new().write(b"QUIT\r\n").build();
        let (written, failure) = send(&mut mock, b"QUIT\r\n", None).await;
        assert_eq!(written, 6);
        assert!(failure.is_none());
    }

    #[tokio::test]
    async fn test_send_keeps_partial_count_on_write_error() {
        let mut mock = Builder::new()
            .write(b"HELO ")
            .write_error(std::io::ErrorKind::ConnectionReset.into())
            .build();
        let (written, failure) = send(&mut mock, b"HELO localhost\r\n", None).await;
        assert_eq!(written, 5);
        assert!(matches!(failure, Some(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_send_keeps_count_on_flush_error() {
        let mut writer = FlushFails(Vec::new());
        let (written, failure) = send(&mut writer, b"DATA\r\n", None).await;
        assert_eq!(written, 6);
        assert_eq!(writer.0, b"DATA\r\n");
        assert!(matches!(failure, Some(Error::Io(_))));
    }
}
