//! Response status tokens: SMTP reply codes and IMAP completion results.

use std::fmt;
use std::str::FromStr;

/// Three-digit SMTP reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// Creates a new reply code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Parses the code from the first three bytes of a reply line.
    #[must_use]
    pub fn from_line(line: &[u8]) -> Option<Self> {
        match line {
            [a, b, c, ..] if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() => {
                Some(Self(
                    u16::from(a - b'0') * 100 + u16::from(b - b'0') * 10 + u16::from(c - b'0'),
                ))
            }
            _ => None,
        }
    }

    /// Returns true if `line` starts with this code.
    #[must_use]
    pub fn leads(self, line: &[u8]) -> bool {
        Self::from_line(line) == Some(self)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

// Codes the exchanges check for
impl ReplyCode {
    /// 220 Service ready
    pub const SERVICE_READY: Self = Self(220);
    /// 221 Service closing transmission channel
    pub const CLOSING: Self = Self(221);
    /// 235 Authentication succeeded
    pub const AUTH_SUCCEEDED: Self = Self(235);
    /// 250 Requested mail action okay, completed
    pub const OK: Self = Self(250);
    /// 334 Continue with authentication
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354 Start mail input
    pub const START_DATA: Self = Self(354);
    /// 535 Authentication credentials invalid
    pub const AUTH_FAILED: Self = Self(535);
    /// 550 Mailbox unavailable (not found, access denied)
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);
}

/// IMAP tagged completion result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Completion {
    /// Command completed successfully.
    Ok,
    /// Command failed.
    No,
    /// Command was not understood.
    Bad,
}

impl Completion {
    /// Returns the wire token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::No => "NO",
            Self::Bad => "BAD",
        }
    }
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Completion {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("OK") {
            Ok(Self::Ok)
        } else if s.eq_ignore_ascii_case("NO") {
            Ok(Self::No)
        } else if s.eq_ignore_ascii_case("BAD") {
            Ok(Self::Bad)
        } else {
            Err(())
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

    mod reply_code_tests {
        use super::*;

        #[test]
        fn from_line() {
            assert_eq!(ReplyCode::from_line(b"250 OK\r\n"), Some(ReplyCode::OK));
            assert_eq!(
                ReplyCode::from_line(b"334 VXNlcm5hbWU6\r\n"),
                Some(ReplyCode::AUTH_CONTINUE)
            );
            assert_eq!(
                ReplyCode::from_line(b"550"),
                Some(ReplyCode::MAILBOX_UNAVAILABLE)
            );
            assert_eq!(ReplyCode::from_line(b"25"), None);
            assert_eq!(ReplyCode::from_line(b"* OK ready\r\n"), None);
            assert_eq!(ReplyCode::from_line(b"2x0 nope\r\n"), None);
        }

        #[test]
        fn leads() {
            assert!(ReplyCode::SERVICE_READY.leads(b"220 localhost ESMTP\r\n"));
            assert!(ReplyCode::OK.leads(b"250-PIPELINING\r\n"));
            assert!(!ReplyCode::OK.leads(b"235 Authentication successful\r\n"));
            assert!(!ReplyCode::OK.leads(b""));
        }

        #[test]
        fn display() {
            assert_eq!(ReplyCode::OK.to_string(), "250");
            assert_eq!(ReplyCode::new(42).to_string(), "042");
        }
    }

    mod completion_tests {
        use super::*;

        #[test]
        fn parse() {
            assert_eq!("OK".parse::<Completion>(), Ok(Completion::Ok));
            assert_eq!("no".parse::<Completion>(), Ok(Completion::No));
            assert_eq!("BAD".parse::<Completion>(), Ok(Completion::Bad));
            assert!("BYE".parse::<Completion>().is_err());
        }

        #[test]
        fn display() {
            assert_eq!(Completion::Ok.to_string(), "OK");
            assert_eq!(Completion::Bad.to_string(), "BAD");
        }
    }
}
