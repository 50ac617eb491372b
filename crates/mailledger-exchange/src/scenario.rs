//! End-to-end conformance scenarios.
//!
//! Each scenario connects, runs a fixed dialogue, closes the session on every
//! exit path, and reports the outcome as data.

use std::fmt;
use std::time::Instant;

use mailledger_transport::Config;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Result;
use crate::exchange::Exchange;
use crate::imap::ImapExchange;
use crate::reply::ReplyCode;
use crate::sasl::{login_response, plain_response};
use crate::script::ProtocolScript;
use crate::smtp::{self, SmtpExchange};

/// SASL mechanism exercised by [`smtp_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mechanism {
    /// `AUTH PLAIN` with an initial response.
    Plain,
    /// `AUTH LOGIN` with username and password prompts.
    Login,
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("PLAIN"),
            Self::Login => f.write_str("LOGIN"),
        }
    }
}

/// Accounts and addresses the scenarios use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    /// Name sent with HELO/EHLO.
    pub client_hostname: String,
    /// Account that can authenticate.
    pub username: String,
    /// Its password.
    pub password: String,
    /// A password the server must reject.
    pub invalid_password: String,
    /// Sender address owned by the authenticated account.
    pub sender: String,
    /// Sender address the authenticated account does not own.
    pub foreign_sender: String,
    /// Recipient for every transaction.
    pub recipient: String,
    /// Mailbox selected by the IMAP scenario.
    pub mailbox: String,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            client_hostname: "localhost".to_string(),
            username: "magma".to_string(),
            password: "password".to_string(),
            invalid_password: "invalidpassword".to_string(),
            sender: "magma@lavabit.com".to_string(),
            foreign_sender: "ladar@lavabit.com".to_string(),
            recipient: "princess@example.com".to_string(),
            mailbox: "Inbox".to_string(),
        }
    }
}

impl Fixture {
    /// Returns the test message, ending with the `.` terminator.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "To: {}\r\nFrom: {}\r\nSubject: Unit Tests\r\n\r\nAren't unit tests great?\r\n.\r\n",
            self.sender, self.recipient
        )
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Scenario name.
    pub name: String,
    /// Whether every step validated.
    pub passed: bool,
    /// Diagnostic for a failed run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
}

impl ScenarioReport {
    fn from_outcome(name: &str, started: Instant, outcome: Result<()>) -> Self {
        let elapsed = started.elapsed().as_millis();
        let elapsed_ms = u64::try_from(elapsed).unwrap_or(u64::MAX);
        match outcome {
            Ok(()) => {
                info!(scenario = name, elapsed_ms, "passed");
                Self {
                    name: name.to_string(),
                    passed: true,
                    message: None,
                    elapsed_ms,
                }
            }
            Err(e) => {
                warn!(scenario = name, error = %e, elapsed_ms, "failed");
                Self {
                    name: name.to_string(),
                    passed: false,
                    message: Some(e.to_string()),
                    elapsed_ms,
                }
            }
        }
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        write!(f, "{verdict} {} ({} ms)", self.name, self.elapsed_ms)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// A runnable scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// See [`smtp_basic`].
    SmtpBasic,
    /// See [`smtp_auth`] with [`Mechanism::Plain`].
    SmtpAuthPlain,
    /// See [`smtp_auth`] with [`Mechanism::Login`].
    SmtpAuthLogin,
    /// See [`imap_basic`].
    ImapBasic,
}

impl Scenario {
    /// Every scenario, in run order.
    pub const ALL: [Self; 4] = [
        Self::SmtpBasic,
        Self::SmtpAuthPlain,
        Self::SmtpAuthLogin,
        Self::ImapBasic,
    ];

    /// Returns the scenario name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SmtpBasic => "smtp-basic",
            Self::SmtpAuthPlain => "smtp-auth-plain",
            Self::SmtpAuthLogin => "smtp-auth-login",
            Self::ImapBasic => "imap-basic",
        }
    }

    /// Returns true for the IMAP scenarios.
    #[must_use]
    pub const fn is_imap(self) -> bool {
        matches!(self, Self::ImapBasic)
    }

    /// Runs the scenario.
    pub async fn run(self, config: &Config, fixture: &Fixture) -> ScenarioReport {
        match self {
            Self::SmtpBasic => smtp_basic(config, fixture).await,
            Self::SmtpAuthPlain => smtp_auth(config, fixture, Mechanism::Plain).await,
            Self::SmtpAuthLogin => smtp_auth(config, fixture, Mechanism::Login).await,
            Self::ImapBasic => imap_basic(config, fixture).await,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the basic submission dialogue as a script.
#[must_use]
pub fn smtp_basic_script(fixture: &Fixture) -> ProtocolScript {
    ProtocolScript::new(Scenario::SmtpBasic.name())
        .step(smtp::greeting())
        .step(smtp::helo(&fixture.client_hostname))
        .step(smtp::ehlo(&fixture.client_hostname))
        .step(smtp::mail_from(""))
        .step(smtp::rcpt_to(&fixture.recipient))
        .step(smtp::data())
        .step(smtp::message(fixture.message()))
        .step(smtp::quit())
}

/// Banner, HELO, EHLO, a null-sender transaction, then QUIT with a confirmed
/// shutdown.
pub async fn smtp_basic(config: &Config, fixture: &Fixture) -> ScenarioReport {
    let name = Scenario::SmtpBasic.name();
    let started = Instant::now();
    let script = smtp_basic_script(fixture);

    let outcome = match Exchange::connect(config).await {
        Ok(mut exchange) => {
            let outcome = exchange.run(&script).await.map(|_| ());
            exchange.close().await;
            outcome
        }
        Err(e) => Err(e),
    };

    ScenarioReport::from_outcome(name, started, outcome)
}

/// Authentication and relay rules.
///
/// Invalid credentials must be refused and valid ones accepted. Once
/// authenticated, mail from an address the account does not own must be
/// rejected with `550` at the end of data, while mail from its own address
/// must be accepted with `250`.
pub async fn smtp_auth(config: &Config, fixture: &Fixture, mechanism: Mechanism) -> ScenarioReport {
    let name = match mechanism {
        Mechanism::Plain => Scenario::SmtpAuthPlain.name(),
        Mechanism::Login => Scenario::SmtpAuthLogin.name(),
    };
    let started = Instant::now();

    let outcome = match SmtpExchange::connect(config).await {
        Ok(mut smtp) => {
            let outcome = run_smtp_auth(&mut smtp, fixture, mechanism).await;
            smtp.close().await;
            outcome
        }
        Err(e) => Err(e),
    };

    ScenarioReport::from_outcome(name, started, outcome)
}

async fn run_smtp_auth(
    smtp: &mut SmtpExchange,
    fixture: &Fixture,
    mechanism: Mechanism,
) -> Result<()> {
    smtp.greeting().await?;
    smtp.ehlo(&fixture.client_hostname).await?;

    let invalid = match mechanism {
        Mechanism::Plain => vec![smtp::auth_plain(&plain_response(
            &fixture.username,
            &fixture.username,
            &fixture.invalid_password,
        ))],
        Mechanism::Login => smtp::auth_login(
            &login_response(&fixture.username),
            &login_response(&fixture.invalid_password),
        )
        .to_vec(),
    };
    smtp.refused(&invalid).await?;

    match mechanism {
        Mechanism::Plain => {
            smtp.auth_plain(&plain_response(
                &fixture.username,
                &fixture.username,
                &fixture.password,
            ))
            .await?;
        }
        Mechanism::Login => {
            smtp.auth_login(
                &login_response(&fixture.username),
                &login_response(&fixture.password),
            )
            .await?;
        }
    }

    smtp.mail_rcpt_data(&fixture.foreign_sender, &fixture.recipient)
        .await?;
    smtp.end_data(ReplyCode::MAILBOX_UNAVAILABLE).await?;

    smtp.mail_rcpt_data(&fixture.sender, &fixture.recipient)
        .await?;
    smtp.end_data(ReplyCode::OK).await?;

    smtp.quit().await?;
    Ok(())
}

/// Greeting, LOGIN, SELECT, SEARCH, FETCH, then LOGOUT with a confirmed
/// shutdown.
pub async fn imap_basic(config: &Config, fixture: &Fixture) -> ScenarioReport {
    let name = Scenario::ImapBasic.name();
    let started = Instant::now();

    let outcome = match ImapExchange::connect(config).await {
        Ok(mut imap) => {
            let outcome = run_imap_basic(&mut imap, fixture).await;
            imap.close().await;
            outcome
        }
        Err(e) => Err(e),
    };

    ScenarioReport::from_outcome(name, started, outcome)
}

async fn run_imap_basic(imap: &mut ImapExchange, fixture: &Fixture) -> Result<()> {
    imap.greeting().await?;
    imap.login(&fixture.username, &fixture.password).await?;
    imap.select(&fixture.mailbox).await?;
    imap.search("ALL").await?;
    imap.fetch("1", "(FLAGS)").await?;
    imap.logout().await?;
    Ok(())
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
    use crate::script::Step;

    #[test]
    fn test_default_fixture_message() {
        let fixture = Fixture::default();
        assert_eq!(
            fixture.message(),
            "To: magma@lavabit.com\r\nFrom: princess@example.com\r\nSubject: Unit Tests\r\n\r\nAren't unit tests great?\r\n.\r\n"
        );
    }

    #[test]
    fn test_basic_script_shape() {
        let script = smtp_basic_script(&Fixture::default());
        let labels: Vec<&str> = script.steps().iter().map(Step::label).collect();
        assert_eq!(
            labels,
            ["greeting", "HELO", "EHLO", "MAIL", "RCPT", "DATA", "message", "QUIT"]
        );
        assert_eq!(script.steps()[3].payload(), Some(&b"MAIL FROM: <>\r\n"[..]));
        assert!(script.steps()[7].expects_shutdown());
    }

    #[test]
    fn test_report_display_and_json() {
        let report = ScenarioReport {
            name: "smtp-basic".to_string(),
            passed: false,
            message: Some("HELO: expected 250, got \"502\"".to_string()),
            elapsed_ms: 12,
        };
        assert_eq!(
            report.to_string(),
            "FAIL smtp-basic (12 ms): HELO: expected 250, got \"502\""
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["name"], "smtp-basic");
        assert_eq!(json["passed"], false);

        let passed = ScenarioReport {
            message: None,
            passed: true,
            ..report
        };
        let json = serde_json::to_string(&passed).unwrap();
        assert!(!json.contains("message"));
    }

    #[test]
    fn test_scenario_names() {
        let names: Vec<&str> = Scenario::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            ["smtp-basic", "smtp-auth-plain", "smtp-auth-login", "imap-basic"]
        );
        assert!(Scenario::ImapBasic.is_imap());
        assert!(!Scenario::SmtpBasic.is_imap());
        assert_eq!(Mechanism::Login.to_string(), "LOGIN");
    }

    #[tokio::test]
    async fn test_unreachable_target_reports_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::builder("127.0.0.1").port(port).build();
        let report = smtp_basic(&config, &Fixture::default()).await;
        assert!(!report.passed);
        assert!(report.message.unwrap().starts_with("connect: "));
    }
}
