//! Command-line arguments and their mapping onto session configuration.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use mailledger_exchange::{Fixture, Scenario};
use mailledger_transport::{Config, Security, TlsVerification};

/// Which scenarios to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// Banner, HELO, EHLO, null-sender transaction, QUIT
    SmtpBasic,
    /// AUTH PLAIN and relay rules
    SmtpAuthPlain,
    /// AUTH LOGIN and relay rules
    SmtpAuthLogin,
    /// LOGIN, SELECT, SEARCH, FETCH, LOGOUT
    ImapBasic,
    /// Every scenario in turn
    All,
}

impl Target {
    /// Expands the target into scenarios, in run order.
    pub fn scenarios(self) -> Vec<Scenario> {
        match self {
            Self::SmtpBasic => vec![Scenario::SmtpBasic],
            Self::SmtpAuthPlain => vec![Scenario::SmtpAuthPlain],
            Self::SmtpAuthLogin => vec![Scenario::SmtpAuthLogin],
            Self::ImapBasic => vec![Scenario::ImapBasic],
            Self::All => Scenario::ALL.to_vec(),
        }
    }
}

/// Run SMTP and IMAP conformance scenarios against a live server
#[derive(Parser, Debug)]
#[command(name = "mailledger-check")]
#[command(
    about = "Run SMTP and IMAP conformance scenarios against a live server",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Scenario to run
    #[arg(value_enum, default_value = "all")]
    pub scenario: Target,

    /// Server hostname
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// SMTP port (default 25, or 465 with --tls)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// IMAP port (default 143, or 993 with --tls)
    #[arg(long)]
    pub imap_port: Option<u16>,

    /// Negotiate TLS right after connecting
    #[arg(long)]
    pub tls: bool,

    /// Accept any server certificate
    #[arg(long)]
    pub insecure: bool,

    /// Socket read/write timeout in seconds (0 disables)
    #[arg(long, default_value = "20")]
    pub timeout: u64,

    /// Concurrent sessions per scenario
    #[arg(
        long,
        default_value = "1",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub sessions: u32,

    /// Print one JSON report per line
    #[arg(long)]
    pub json: bool,

    /// Account username
    #[arg(long)]
    pub user: Option<String>,

    /// Account password
    #[arg(long)]
    pub password: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Default `EnvFilter` directives when `RUST_LOG` is unset.
    pub const fn log_filter(&self) -> &'static str {
        if self.verbose {
            "mailledger_check=debug,mailledger_exchange=debug,mailledger_transport=debug"
        } else {
            "mailledger_check=info,mailledger_exchange=info,mailledger_transport=info"
        }
    }

    /// Port for `scenario`, falling back to the protocol default.
    pub fn port_for(&self, scenario: Scenario) -> u16 {
        match (scenario.is_imap(), self.tls) {
            (false, false) => self.port.unwrap_or(25),
            (false, true) => self.port.unwrap_or(465),
            (true, false) => self.imap_port.unwrap_or(143),
            (true, true) => self.imap_port.unwrap_or(993),
        }
    }

    /// Session configuration for `scenario`.
    pub fn config_for(&self, scenario: Scenario) -> Config {
        let security = if self.tls {
            Security::Implicit
        } else {
            Security::Plain
        };
        let verification = if self.insecure {
            TlsVerification::Insecure
        } else {
            TlsVerification::WebPki
        };
        let timeout = (self.timeout > 0).then(|| Duration::from_secs(self.timeout));

        Config::builder(self.host.clone())
            .port(self.port_for(scenario))
            .security(security)
            .verification(verification)
            .io_timeout(timeout)
            .build()
    }

    /// Scenario fixture with any credential overrides applied.
    pub fn fixture(&self) -> Fixture {
        let mut fixture = Fixture::default();
        if let Some(user) = &self.user {
            fixture.username.clone_from(user);
        }
        if let Some(password) = &self.password {
            fixture.password.clone_from(password);
        }
        fixture
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
    fn test_defaults() {
        let cli = Cli::try_parse_from(["mailledger-check"]).unwrap();
        assert_eq!(cli.scenario, Target::All);
        assert_eq!(cli.host, "localhost");
        assert_eq!(cli.sessions, 1);
        assert!(!cli.json);

        let config = cli.config_for(Scenario::SmtpBasic);
        assert_eq!(config.port, 25);
        assert_eq!(config.security, Security::Plain);
        assert_eq!(config.verification, TlsVerification::WebPki);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(20)));
        assert_eq!(cli.port_for(Scenario::ImapBasic), 143);
    }

    #[test]
    fn test_tls_ports() {
        let cli = Cli::try_parse_from(["mailledger-check", "--tls", "--insecure"])
            .unwrap();
        let config = cli.config_for(Scenario::SmtpAuthPlain);
        assert_eq!(config.port, 465);
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.verification, TlsVerification::Insecure);
        assert_eq!(cli.port_for(Scenario::ImapBasic), 993);
    }

    #[test]
    fn test_explicit_ports_and_timeout() {
        let cli = Cli::try_parse_from([
            "mailledger-check",
            "smtp-auth-login",
            "--port",
            "2525",
            "--imap-port",
            "1143",
            "--timeout",
            "0",
        ])
        .unwrap();
        assert_eq!(cli.scenario, Target::SmtpAuthLogin);
        assert_eq!(cli.port_for(Scenario::SmtpBasic), 2525);
        assert_eq!(cli.port_for(Scenario::ImapBasic), 1143);

        let config = cli.config_for(Scenario::SmtpBasic);
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.write_timeout, None);
    }

    #[test]
    fn test_sessions_must_be_positive() {
        let refused = Cli::try_parse_from(["mailledger-check", "--sessions", "0"]);
        assert!(refused.is_err());
        let cli = Cli::try_parse_from(["mailledger-check", "--sessions", "8"])
            .unwrap();
        assert_eq!(cli.sessions, 8);
    }

    #[test]
    fn test_targets_expand() {
        assert_eq!(Target::All.scenarios(), Scenario::ALL.to_vec());
        assert_eq!(Target::ImapBasic.scenarios(), vec![Scenario::ImapBasic]);
    }

    #[test]
    fn test_credential_overrides() {
        let cli = Cli::try_parse_from([
            "mailledger-check",
            "--user",
            "alice",
            "--password",
            "s3cret",
        ])
        .unwrap();
        let fixture = cli.fixture();
        assert_eq!(fixture.username, "alice");
        assert_eq!(fixture.password, "s3cret");
        assert_eq!(fixture.recipient, Fixture::default().recipient);
    }

    #[test]
    fn test_verbose_filter() {
        let cli = Cli::try_parse_from(["mailledger-check", "-v"]).unwrap();
        assert!(cli.log_filter().starts_with("mailledger_check=debug"));
    }
}
