//! The exchange driver.
//!
//! [`Exchange`] owns one transport session and runs [`Step`]s against it.
//! Each step is validated in a fixed order, stopping at the first mismatch:
//!
//! 1. the whole command was written
//! 2. a complete response was read under the step's framing
//! 3. the session is still connected (or, for a closing step, shut down
//!    in an orderly way)
//! 4. the terminal line carries the expected status
//! 5. the terminal line contains the required text, if any
//! 6. the server shuts down, if the step asks for it

use std::io;

use bytes::Bytes;
use mailledger_transport::{Config, Error as TransportError, Status, TransportSession, connect_with};
use tracing::{debug, trace, warn};

use crate::framing::status_token;
use crate::script::{ProtocolScript, Step};
use crate::{Error, Result};

/// Outcome of a successful step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResult {
    /// Leading status token of the terminal line (`250`, `OK`, `*`).
    pub token: Bytes,
    /// Whether the line ends the response under the step's framing.
    pub terminal: bool,
    /// The terminal line, CRLF included.
    pub line: Bytes,
}

impl ExchangeResult {
    /// Returns the status token as text.
    #[must_use]
    pub fn token_str(&self) -> &str {
        std::str::from_utf8(&self.token).unwrap_or("")
    }

    /// Returns the terminal line as text, replacing invalid UTF-8.
    #[must_use]
    pub fn line_lossy(&self) -> String {
        String::from_utf8_lossy(&self.line).into_owned()
    }
}

/// Drives command/response steps over a transport session.
#[derive(Debug)]
pub struct Exchange {
    session: TransportSession,
}

impl Exchange {
    /// Wraps an established session.
    #[must_use]
    pub const fn new(session: TransportSession) -> Self {
        Self { session }
    }

    /// Connects according to `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] labelled `connect` if the connection or
    /// an implicit TLS handshake fails.
    pub async fn connect(config: &Config) -> Result<Self> {
        let session = connect_with(config)
            .await
            .map_err(|e| Error::transport("connect", e))?;
        Ok(Self::new(session))
    }

    /// Returns the underlying session.
    #[must_use]
    pub const fn session(&self) -> &TransportSession {
        &self.session
    }

    /// Returns the underlying session mutably.
    pub const fn session_mut(&mut self) -> &mut TransportSession {
        &mut self.session
    }

    /// Consumes the driver and returns its session.
    #[must_use]
    pub fn into_session(self) -> TransportSession {
        self.session
    }

    /// Upgrades the session to TLS.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] labelled with `step` if the handshake fails.
    pub async fn secure(&mut self, step: &str) -> Result<()> {
        self.session
            .secure()
            .await
            .map_err(|e| Error::transport(step, e))
    }

    /// Closes the session. Safe to call more than once.
    pub async fn close(&mut self) {
        self.session.close().await;
    }

    /// Runs one step.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure, labelled with the step.
    pub async fn exchange(&mut self, step: &Step) -> Result<ExchangeResult> {
        let label = step.label();

        if let Some(payload) = step.payload() {
            debug!(step = label, len = payload.len(), "sending");
            let transfer = self
                .session
                .write(payload)
                .await
                .map_err(|e| self.fail(Error::transport(label, e)))?;
            if !transfer.is_complete() {
                return Err(self.fail(Error::ShortWrite {
                    step: label.to_string(),
                    transferred: transfer.transferred,
                    expected: transfer.expected,
                }));
            }
        } else {
            debug!(step = label, "awaiting response");
        }

        let framing = step.response_framing();
        loop {
            let n = self
                .session
                .read_line()
                .await
                .map_err(|e| self.fail(Error::transport(label, e)))?;
            if n == 0 {
                return Err(self.fail(Error::ShortRead {
                    step: label.to_string(),
                }));
            }
            if framing.is_terminal(self.session.line()) {
                break;
            }
            trace!(step = label, line = %self.session.line_lossy().trim_end(), "intermediate");
        }

        let status = self.session.status();
        let settled = match status {
            Status::Connected => true,
            // The peer may already have closed after a final reply.
            Status::ShutdownGraceful => step.expects_shutdown(),
            Status::Error | Status::Unknown => false,
        };
        if !settled {
            return Err(self.fail(Error::Inactive {
                step: label.to_string(),
                status,
            }));
        }

        let line = Bytes::copy_from_slice(self.session.line());
        let expect = step.expectation();
        if !expect.matches(&line, framing) {
            return Err(self.fail(Error::UnexpectedStatus {
                step: label.to_string(),
                expected: expect.to_string(),
                line: String::from_utf8_lossy(&line).into_owned(),
            }));
        }

        if let Some(needle) = step.required_text()
            && !contains(&line, needle.as_bytes())
        {
            return Err(self.fail(Error::MissingText {
                step: label.to_string(),
                needle: needle.to_string(),
                line: String::from_utf8_lossy(&line).into_owned(),
            }));
        }

        if step.expects_shutdown() {
            self.confirm_shutdown(label).await?;
        }

        let token = line.slice_ref(status_token(&line, framing));
        Ok(ExchangeResult {
            token,
            terminal: framing.is_terminal(&line),
            line,
        })
    }

    /// Runs every step of `script` in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first step that does not validate.
    pub async fn run(&mut self, script: &ProtocolScript) -> Result<Vec<ExchangeResult>> {
        debug!(
            script = script.name(),
            steps = script.len(),
            "running script"
        );
        let mut results = Vec::with_capacity(script.len());
        for step in script.steps() {
            results.push(self.exchange(step).await?);
        }
        Ok(results)
    }

    /// Verifies that no further bytes arrive before the peer closes.
    ///
    /// Only an end of stream confirms the close. A reset, or a TLS peer that
    /// drops the socket without close_notify, counts as one. Anything else,
    /// including a read timeout, means the server did not shut down.
    async fn confirm_shutdown(&mut self, label: &str) -> Result<()> {
        match self.session.read_line().await {
            Ok(0) => Ok(()),
            Err(TransportError::Io(e)) if closed_abruptly(&e) => {
                debug!(step = label, error = %e, "connection dropped after final reply");
                Ok(())
            }
            Ok(_) => Err(self.fail(Error::PrematureClose {
                step: label.to_string(),
            })),
            Err(e) => {
                debug!(step = label, error = %e, "no shutdown after final reply");
                Err(self.fail(Error::PrematureClose {
                    step: label.to_string(),
                }))
            }
        }
    }

    fn fail(&self, err: Error) -> Error {
        warn!(host = self.session.host(), error = %err, "step failed");
        err
    }
}

fn closed_abruptly(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof
    )
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
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

    #[test]
    fn test_contains() {
        assert!(contains(b"220 localhost ESMTP ready\r\n", b" ESMTP "));
        assert!(!contains(b"220 localhost SMTP ready\r\n", b" ESMTP "));
        assert!(contains(b"anything", b""));
        assert!(!contains(b"ab", b"abc"));
    }

    #[test]
    fn test_closed_abruptly() {
        assert!(closed_abruptly(&io::ErrorKind::ConnectionReset.into()));
        assert!(closed_abruptly(&io::ErrorKind::UnexpectedEof.into()));
        assert!(!closed_abruptly(&io::ErrorKind::TimedOut.into()));
        assert!(!closed_abruptly(&io::ErrorKind::InvalidData.into()));
    }

    #[test]
    fn test_result_accessors() {
        let line = Bytes::from_static(b"250 OK\r\n");
        let result = ExchangeResult {
            token: line.slice(..3),
            terminal: true,
            line: line.clone(),
        };
        assert_eq!(result.token_str(), "250");
        assert_eq!(result.line_lossy(), "250 OK\r\n");
    }
}
