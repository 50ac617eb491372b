//! SMTP exchanges.
//!
//! The free functions build the [`Step`] for each command so they can be
//! composed into a [`ProtocolScript`](crate::ProtocolScript);
//! [`SmtpExchange`] runs them one at a time against a live session.

use bytes::Bytes;
use mailledger_transport::Config;
use tracing::debug;

use crate::command::Command;
use crate::exchange::{Exchange, ExchangeResult};
use crate::framing::Framing;
use crate::reply::ReplyCode;
use crate::script::{Expect, Step};
use crate::{Error, Result};

/// Text every ESMTP banner must contain.
pub const ESMTP_MARKER: &str = " ESMTP ";

/// Server banner: `220` containing `" ESMTP "`.
#[must_use]
pub fn greeting() -> Step {
    Step::new("greeting", Expect::Reply(ReplyCode::SERVICE_READY))
        .contains(ESMTP_MARKER)
}

/// `HELO hostname` answered by a single `250` line.
#[must_use]
pub fn helo(hostname: &str) -> Step {
    Step::command(
        &Command::Helo {
            hostname: hostname.to_string(),
        },
        Expect::Reply(ReplyCode::OK),
    )
}

/// `EHLO hostname` answered by a multi-line `250` reply.
#[must_use]
pub fn ehlo(hostname: &str) -> Step {
    Step::command(
        &Command::Ehlo {
            hostname: hostname.to_string(),
        },
        Expect::Reply(ReplyCode::OK),
    )
    .framing(Framing::Multiline)
}

/// `MAIL FROM: <from>`; an empty `from` is the null reverse path.
#[must_use]
pub fn mail_from(from: &str) -> Step {
    Step::command(
        &Command::MailFrom {
            from: from.to_string(),
        },
        Expect::Reply(ReplyCode::OK),
    )
    .framing(Framing::Multiline)
}

/// `RCPT TO: <to>`.
#[must_use]
pub fn rcpt_to(to: &str) -> Step {
    Step::command(
        &Command::RcptTo { to: to.to_string() },
        Expect::Reply(ReplyCode::OK),
    )
    .framing(Framing::Multiline)
}

/// `DATA`, answered by `354`.
#[must_use]
pub fn data() -> Step {
    Step::command(&Command::Data, Expect::Reply(ReplyCode::START_DATA))
        .framing(Framing::Multiline)
}

/// A raw message whose last line is the `.` terminator, answered by `250`.
#[must_use]
pub fn message(body: impl Into<Bytes>) -> Step {
    Step::new("message", Expect::Reply(ReplyCode::OK))
        .send(body)
        .framing(Framing::Multiline)
}

/// A bare `.` terminator, answered by `expected`.
#[must_use]
pub fn end_data(expected: ReplyCode) -> Step {
    Step::command(&Command::EndOfData, Expect::Reply(expected))
        .framing(Framing::Multiline)
}

/// `AUTH PLAIN <response>`, answered by `235`.
#[must_use]
pub fn auth_plain(response: &str) -> Step {
    Step::command(
        &Command::AuthPlain {
            response: response.to_string(),
        },
        Expect::Reply(ReplyCode::AUTH_SUCCEEDED),
    )
    .framing(Framing::Multiline)
}

/// The three steps of an AUTH LOGIN exchange: `334`, `334`, `235`.
#[must_use]
pub fn auth_login(username: &str, password: &str) -> [Step; 3] {
    [
        Step::command(&Command::AuthLogin, Expect::Reply(ReplyCode::AUTH_CONTINUE))
            .framing(Framing::Multiline),
        Step::new(
            "AUTH LOGIN username",
            Expect::Reply(ReplyCode::AUTH_CONTINUE),
        )
        .send(Command::SaslResponse(username.to_string()).serialize())
        .framing(Framing::Multiline),
        Step::new(
            "AUTH LOGIN password",
            Expect::Reply(ReplyCode::AUTH_SUCCEEDED),
        )
        .send(Command::SaslResponse(password.to_string()).serialize())
        .framing(Framing::Multiline),
    ]
}

/// `STARTTLS`, answered by `220`.
#[must_use]
pub fn starttls() -> Step {
    Step::command(&Command::StartTls, Expect::Reply(ReplyCode::SERVICE_READY))
}

/// `RSET`, answered by `250`.
#[must_use]
pub fn rset() -> Step {
    Step::command(&Command::Rset, Expect::Reply(ReplyCode::OK))
}

/// `NOOP`, answered by `250`.
#[must_use]
pub fn noop() -> Step {
    Step::command(&Command::Noop, Expect::Reply(ReplyCode::OK))
}

/// `QUIT`, answered by `221`, after which the server must close.
#[must_use]
pub fn quit() -> Step {
    Step::command(&Command::Quit, Expect::Reply(ReplyCode::CLOSING))
        .then_shutdown()
}

/// SMTP dialogue over one session.
#[derive(Debug)]
pub struct SmtpExchange {
    exchange: Exchange,
}

impl SmtpExchange {
    /// Wraps an exchange driver.
    #[must_use]
    pub const fn new(exchange: Exchange) -> Self {
        Self { exchange }
    }

    /// Connects according to `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the connection cannot be established.
    pub async fn connect(config: &Config) -> Result<Self> {
        Exchange::connect(config).await.map(Self::new)
    }

    /// Returns the underlying driver.
    pub const fn exchange_mut(&mut self) -> &mut Exchange {
        &mut self.exchange
    }

    /// Consumes the dialogue and returns its driver.
    #[must_use]
    pub fn into_inner(self) -> Exchange {
        self.exchange
    }

    /// Closes the session.
    pub async fn close(&mut self) {
        self.exchange.close().await;
    }

    /// Reads and checks the server banner.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn greeting(&mut self) -> Result<ExchangeResult> {
        self.exchange.exchange(&greeting()).await
    }

    /// Sends `HELO`.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn helo(&mut self, hostname: &str) -> Result<ExchangeResult> {
        self.exchange.exchange(&helo(hostname)).await
    }

    /// Sends `EHLO`.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn ehlo(&mut self, hostname: &str) -> Result<ExchangeResult> {
        self.exchange.exchange(&ehlo(hostname)).await
    }

    /// Sends `MAIL FROM`.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn mail_from(&mut self, from: &str) -> Result<ExchangeResult> {
        self.exchange.exchange(&mail_from(from)).await
    }

    /// Sends `RCPT TO`.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<ExchangeResult> {
        self.exchange.exchange(&rcpt_to(to)).await
    }

    /// Sends `DATA`.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn data(&mut self) -> Result<ExchangeResult> {
        self.exchange.exchange(&data()).await
    }

    /// Sends a message body that already ends with the `.` terminator.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn message(&mut self, body: impl Into<Bytes>) -> Result<ExchangeResult> {
        self.exchange.exchange(&message(body)).await
    }

    /// Sends a bare `.` terminator and expects `expected`.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn end_data(&mut self, expected: ReplyCode) -> Result<ExchangeResult> {
        self.exchange.exchange(&end_data(expected)).await
    }

    /// Opens a transaction: `MAIL FROM`, `RCPT TO`, then `DATA`.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first step that does not validate.
    pub async fn mail_rcpt_data(&mut self, from: &str, to: &str) -> Result<ExchangeResult> {
        self.mail_from(from).await?;
        self.rcpt_to(to).await?;
        self.data().await
    }

    /// Authenticates with `AUTH PLAIN` and a base64 initial response.
    ///
    /// # Errors
    ///
    /// Returns the step failure; a refusal shows up as
    /// [`Error::UnexpectedStatus`].
    pub async fn auth_plain(&mut self, response: &str) -> Result<ExchangeResult> {
        self.exchange.exchange(&auth_plain(response)).await
    }

    /// Authenticates with `AUTH LOGIN` and base64 username and password.
    ///
    /// # Errors
    ///
    /// Returns the failure of the first step that does not validate.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<ExchangeResult> {
        let [start, user, pass] = auth_login(username, password);
        self.exchange.exchange(&start).await?;
        self.exchange.exchange(&user).await?;
        self.exchange.exchange(&pass).await
    }

    /// Sends `STARTTLS` and upgrades the session once the server agrees.
    ///
    /// # Errors
    ///
    /// Returns the step failure or [`Error::Transport`] if the handshake fails.
    pub async fn starttls(&mut self) -> Result<ExchangeResult> {
        let reply = self.exchange.exchange(&starttls()).await?;
        self.exchange.secure("STARTTLS").await?;
        debug!("STARTTLS complete");
        Ok(reply)
    }

    /// Sends `RSET`, abandoning any open transaction.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn rset(&mut self) -> Result<ExchangeResult> {
        self.exchange.exchange(&rset()).await
    }

    /// Sends `NOOP`.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn noop(&mut self) -> Result<ExchangeResult> {
        self.exchange.exchange(&noop()).await
    }

    /// Sends `QUIT` and confirms the server closes the connection.
    ///
    /// # Errors
    ///
    /// Returns the step failure, or [`Error::PrematureClose`] if the server
    /// keeps talking.
    pub async fn quit(&mut self) -> Result<ExchangeResult> {
        self.exchange.exchange(&quit()).await
    }

    /// Runs `steps`, which the server must refuse somewhere along the way.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedSuccess`] if every step validated.
    pub async fn refused(&mut self, steps: &[Step]) -> Result<()> {
        for step in steps {
            if let Err(e) = self.exchange.exchange(step).await {
                debug!(step = step.label(), error = %e, "refused as required");
                return Ok(());
            }
        }
        Err(Error::UnexpectedSuccess {
            step: steps.last().map_or("", Step::label).to_string(),
        })
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
    fn test_greeting_step() {
        let step = greeting();
        assert_eq!(step.payload(), None);
        assert_eq!(step.required_text(), Some(" ESMTP "));
        assert_eq!(step.expectation(), &Expect::Reply(ReplyCode::SERVICE_READY));
    }

    #[test]
    fn test_command_lengths() {
        assert_eq!(helo("localhost").payload().unwrap().len(), 16);
        assert_eq!(ehlo("localhost").payload().unwrap().len(), 16);
        assert_eq!(mail_from("").payload().unwrap().len(), 15);
        assert_eq!(rcpt_to("princess@example.com").payload().unwrap().len(), 33);
        assert_eq!(data().payload().unwrap().len(), 6);
        assert_eq!(end_data(ReplyCode::OK).payload().unwrap().len(), 3);
        assert_eq!(quit().payload().unwrap().len(), 6);
        assert_eq!(rset().payload(), Some(&b"RSET\r\n"[..]));
        assert_eq!(noop().payload(), Some(&b"NOOP\r\n"[..]));
    }

    #[test]
    fn test_framing_choices() {
        assert_eq!(helo("localhost").response_framing(), &Framing::Line);
        assert_eq!(ehlo("localhost").response_framing(), &Framing::Multiline);
        assert_eq!(quit().response_framing(), &Framing::Line);
        assert!(quit().expects_shutdown());
    }

    #[test]
    fn test_auth_login_steps() {
        let steps = auth_login("bWFnbWE=", "cGFzc3dvcmQ=");
        assert_eq!(steps[0].payload(), Some(&b"AUTH LOGIN\r\n"[..]));
        assert_eq!(steps[1].payload(), Some(&b"bWFnbWE=\r\n"[..]));
        assert_eq!(steps[2].payload(), Some(&b"cGFzc3dvcmQ=\r\n"[..]));
        assert_eq!(
            steps[0].expectation(),
            &Expect::Reply(ReplyCode::AUTH_CONTINUE)
        );
        assert_eq!(
            steps[1].expectation(),
            &Expect::Reply(ReplyCode::AUTH_CONTINUE)
        );
        assert_eq!(
            steps[2].expectation(),
            &Expect::Reply(ReplyCode::AUTH_SUCCEEDED)
        );
    }

    #[test]
    fn test_relay_terminator_expectation() {
        let step = end_data(ReplyCode::MAILBOX_UNAVAILABLE);
        assert_eq!(step.payload(), Some(&b".\r\n"[..]));
        assert_eq!(
            step.expectation(),
            &Expect::Reply(ReplyCode::MAILBOX_UNAVAILABLE)
        );
    }
}
