//! Error types for protocol exchanges.

use mailledger_transport::Status;

/// Result type alias for exchange operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A failed exchange step.
///
/// Every variant names the step that failed; the `Display` output is the
/// diagnostic reported for the scenario.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fewer bytes were written than the command holds.
    #[error("{step}: wrote {transferred} of {expected} bytes")]
    ShortWrite {
        /// Step label.
        step: String,
        /// Bytes written.
        transferred: usize,
        /// Command length.
        expected: usize,
    },

    /// The connection ended before the response was complete.
    #[error("{step}: connection ended before a complete response")]
    ShortRead {
        /// Step label.
        step: String,
    },

    /// The response status does not match the step's expectation.
    #[error("{step}: expected {expected}, got {line:?}")]
    UnexpectedStatus {
        /// Step label.
        step: String,
        /// Expected token or prefix.
        expected: String,
        /// Offending response line.
        line: String,
    },

    /// A required substring is missing from the response.
    #[error("{step}: response lacks {needle:?}: {line:?}")]
    MissingText {
        /// Step label.
        step: String,
        /// Text that had to be present.
        needle: String,
        /// Offending response line.
        line: String,
    },

    /// The session was not in the connected state after the response.
    #[error("{step}: session status is {status}")]
    Inactive {
        /// Step label.
        step: String,
        /// Status observed.
        status: Status,
    },

    /// The server kept talking (or kept the connection) when it should have closed.
    #[error("{step}: server did not close the connection")]
    PrematureClose {
        /// Step label.
        step: String,
    },

    /// The server accepted a request it is required to refuse.
    #[error("{step}: server accepted a request it should have refused")]
    UnexpectedSuccess {
        /// Step label.
        step: String,
    },

    /// Transport-level failure.
    #[error("{step}: {source}")]
    Transport {
        /// Step label.
        step: String,
        /// Underlying transport error.
        #[source]
        source: mailledger_transport::Error,
    },
}

impl Error {
    /// Returns the label of the step that failed.
    #[must_use]
    pub fn step(&self) -> &str {
        match self {
            Self::ShortWrite { step, .. }
            | Self::ShortRead { step }
            | Self::UnexpectedStatus { step, .. }
            | Self::MissingText { step, .. }
            | Self::Inactive { step, .. }
            | Self::PrematureClose { step }
            | Self::UnexpectedSuccess { step }
            | Self::Transport { step, .. } => step,
        }
    }

    pub(crate) fn transport(step: &str, source: mailledger_transport::Error) -> Self {
        Self::Transport {
            step: step.to_string(),
            source,
        }
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

    #[test]
    fn test_display_names_the_step() {
        let err = Error::UnexpectedStatus {
            step: "HELO".to_string(),
            expected: "250".to_string(),
            line: "502 no\r\n".to_string(),
        };
        assert_eq!(err.to_string(), r#"HELO: expected 250, got "502 no\r\n""#);
        assert_eq!(err.step(), "HELO");

        let err = Error::Inactive {
            step: "QUIT".to_string(),
            status: Status::Error,
        };
        assert_eq!(err.to_string(), "QUIT: session status is error (-1)");
    }

    #[test]
    fn test_transport_source() {
        let err = Error::transport("connect", mailledger_transport::Error::Closed);
        assert_eq!(err.step(), "connect");
        assert!(std::error::Error::source(&err).is_some());
    }
}
