//! SMTP command literals.
//!
//! Every command serializes to the exact bytes written on the wire,
//! trailing CRLF included.

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address, empty for the null reverse path
        from: String,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: String,
    },
    /// DATA - Begin message data
    Data,
    /// Bare end-of-data marker
    EndOfData,
    /// AUTH PLAIN with an initial response
    AuthPlain {
        /// Base64-encoded PLAIN credentials
        response: String,
    },
    /// AUTH LOGIN - Begin a username/password exchange
    AuthLogin,
    /// A SASL continuation answer sent on its own line
    SaslResponse(String),
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// RSET - Reset transaction
    Rset,
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::Helo { hostname } => {
                buf.extend_from_slice(b"HELO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::Ehlo { hostname } => {
                buf.extend_from_slice(b"EHLO ");
                buf.extend_from_slice(hostname.as_bytes());
            }
            Self::MailFrom { from } => {
                buf.extend_from_slice(b"MAIL FROM: <");
                buf.extend_from_slice(from.as_bytes());
                buf.push(b'>');
            }
            Self::RcptTo { to } => {
                buf.extend_from_slice(b"RCPT TO: <");
                buf.extend_from_slice(to.as_bytes());
                buf.push(b'>');
            }
            Self::Data => buf.extend_from_slice(b"DATA"),
            Self::EndOfData => buf.push(b'.'),
            Self::AuthPlain { response } => {
                buf.extend_from_slice(b"AUTH PLAIN ");
                buf.extend_from_slice(response.as_bytes());
            }
            Self::AuthLogin => buf.extend_from_slice(b"AUTH LOGIN"),
            Self::SaslResponse(response) => buf.extend_from_slice(response.as_bytes()),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Rset => buf.extend_from_slice(b"RSET"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Quit => buf.extend_from_slice(b"QUIT"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the command verb, used to label exchanges.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::EndOfData => "end of data",
            Self::AuthPlain { .. } => "AUTH PLAIN",
            Self::AuthLogin => "AUTH LOGIN",
            Self::SaslResponse(_) => "SASL response",
            Self::StartTls => "STARTTLS",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
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
    fn test_greeting_commands() {
        let helo = Command::Helo {
            hostname: "localhost".to_string(),
        };
        assert_eq!(helo.serialize(), b"HELO localhost\r\n");
        assert_eq!(helo.serialize().len(), 16);

        let ehlo = Command::Ehlo {
            hostname: "localhost".to_string(),
        };
        assert_eq!(ehlo.serialize(), b"EHLO localhost\r\n");
    }

    #[test]
    fn test_null_reverse_path() {
        let cmd = Command::MailFrom {
            from: String::new(),
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM: <>\r\n");
        assert_eq!(cmd.serialize().len(), 15);
    }

    #[test]
    fn test_envelope_commands() {
        let mail = Command::MailFrom {
            from: "magma@lavabit.com".to_string(),
        };
        assert_eq!(mail.serialize(), b"MAIL FROM: <magma@lavabit.com>\r\n");

        let rcpt = Command::RcptTo {
            to: "princess@example.com".to_string(),
        };
        assert_eq!(rcpt.serialize(), b"RCPT TO: <princess@example.com>\r\n");
        assert_eq!(rcpt.serialize().len(), 33);
    }

    #[test]
    fn test_data_commands() {
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::EndOfData.serialize(), b".\r\n");
    }

    #[test]
    fn test_auth_commands() {
        let plain = Command::AuthPlain {
            response: "bWFnbWEAbWFnbWEAcGFzc3dvcmQ=".to_string(),
        };
        let bytes = plain.serialize();
        assert_eq!(bytes, b"AUTH PLAIN bWFnbWEAbWFnbWEAcGFzc3dvcmQ=\r\n");
        assert_eq!(bytes.len(), 28 + 13);

        assert_eq!(Command::AuthLogin.serialize(), b"AUTH LOGIN\r\n");
        assert_eq!(
            Command::SaslResponse("bWFnbWE=".to_string()).serialize(),
            b"bWFnbWE=\r\n"
        );
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::Noop.serialize(), b"NOOP\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn test_verbs() {
        assert_eq!(Command::Quit.verb(), "QUIT");
        assert_eq!(
            Command::RcptTo {
                to: String::new()
            }
            .verb(),
            "RCPT"
        );
    }
}
