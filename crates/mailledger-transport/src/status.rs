//! Session status machine.
//!
//! A session caches its last known [`Status`]. Liveness probes on the TCP and
//! TLS layers are advisory: they can only demote the cached value (to
//! [`Status::ShutdownGraceful`] or [`Status::Error`]), never promote it.

use std::fmt;

/// Cached connection status of a transport session.
///
/// The numeric codes mirror the classic client status convention:
/// `-1` error, `0` unknown, `1` connected, `2` graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// The connection failed, was reset, or has been closed locally.
    Error,
    /// Nothing is known about the connection yet.
    #[default]
    Unknown,
    /// The connection is established.
    Connected,
    /// The peer performed an orderly shutdown.
    ShutdownGraceful,
}

impl Status {
    /// Returns the numeric status code.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Error => -1,
            Self::Unknown => 0,
            Self::Connected => 1,
            Self::ShutdownGraceful => 2,
        }
    }

    /// Returns true for [`Status::Error`].
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Returns true for [`Status::Connected`].
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Folds a probe result into the cached status.
    ///
    /// `Error` is absorbing. A probe that reports the connection closed forces
    /// `Error`, an observed orderly shutdown moves to `ShutdownGraceful`, and
    /// any other probe result leaves the cached value untouched.
    #[must_use]
    pub const fn next(self, probe: Liveness) -> Self {
        match (self, probe) {
            (Self::Error, _) | (_, Liveness::Closed) => Self::Error,
            (_, Liveness::PeerShutdown) => Self::ShutdownGraceful,
            (cached, Liveness::NoNewInfo | Liveness::Alive) => cached,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Unknown => "unknown",
            Self::Connected => "connected",
            Self::ShutdownGraceful => "shutdown",
        };
        write!(f, "{name} ({})", self.code())
    }
}

/// Result of a non-blocking liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Liveness {
    /// The probe could not observe anything without blocking.
    NoNewInfo,
    /// The peer has data pending; the connection is open.
    Alive,
    /// The peer finished sending (end of stream is readable).
    PeerShutdown,
    /// The connection was reset or failed.
    Closed,
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
    fn test_codes() {
        assert_eq!(Status::Error.code(), -1);
        assert_eq!(Status::Unknown.code(), 0);
        assert_eq!(Status::Connected.code(), 1);
        assert_eq!(Status::ShutdownGraceful.code(), 2);
    }

    #[test]
    fn test_neutral_probe_retains_cached_status() {
        for cached in [Status::Unknown, Status::Connected, Status::ShutdownGraceful] {
            assert_eq!(cached.next(Liveness::NoNewInfo), cached);
            assert_eq!(cached.next(Liveness::Alive), cached);
        }
    }

    #[test]
    fn test_closed_probe_forces_error() {
        for cached in [Status::Unknown, Status::Connected, Status::ShutdownGraceful] {
            assert_eq!(cached.next(Liveness::Closed), Status::Error);
        }
    }

    #[test]
    fn test_peer_shutdown_is_graceful() {
        for cached in [Status::Unknown, Status::Connected, Status::ShutdownGraceful] {
            assert_eq!(
                cached.next(Liveness::PeerShutdown),
                Status::ShutdownGraceful
            );
        }
    }

    #[test]
    fn test_error_is_absorbing() {
        for probe in [
            Liveness::NoNewInfo,
            Liveness::Alive,
            Liveness::PeerShutdown,
            Liveness::Closed,
        ] {
            assert_eq!(Status::Error.next(probe), Status::Error);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::Connected.to_string(), "connected (1)");
        assert_eq!(Status::Error.to_string(), "error (-1)");
    }
}
