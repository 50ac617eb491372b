//! Connection configuration types.

use std::time::Duration;

/// Default socket read/write timeout applied after connect.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(20);

/// Transport security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plain TCP. Protocol-level upgrades (STARTTLS) are left to the caller.
    #[default]
    Plain,
    /// TLS is established right after connect, before any protocol bytes.
    Implicit,
}

impl Security {
    /// Returns true if TLS is required before the greeting.
    #[must_use]
    pub const fn is_tls(self) -> bool {
        matches!(self, Self::Implicit)
    }
}

/// Server certificate verification policy for TLS upgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsVerification {
    /// Verify against the bundled web PKI roots.
    #[default]
    WebPki,
    /// Accept any certificate. Only meant for self-signed conformance targets.
    Insecure,
}

/// Transport session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Certificate verification policy.
    pub verification: TlsVerification,
    /// Socket read timeout.
    pub read_timeout: Option<Duration>,
    /// Socket write timeout.
    pub write_timeout: Option<Duration>,
}

impl Config {
    /// Creates a new plaintext configuration with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::builder(host).port(port).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for transport configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: u16,
    security: Security,
    verification: TlsVerification,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 25,
            security: Security::Plain,
            verification: TlsVerification::WebPki,
            read_timeout: Some(DEFAULT_IO_TIMEOUT),
            write_timeout: Some(DEFAULT_IO_TIMEOUT),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the certificate verification policy.
    #[must_use]
    pub const fn verification(mut self, verification: TlsVerification) -> Self {
        self.verification = verification;
        self
    }

    /// Sets both the read and the write timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self.write_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            security: self.security,
            verification: self.verification,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
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
    fn test_config_new() {
        let config = Config::new("localhost", 2525);
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 2525);
        assert_eq!(config.security, Security::Plain);
        assert_eq!(config.verification, TlsVerification::WebPki);
        assert_eq!(config.read_timeout, Some(DEFAULT_IO_TIMEOUT));
        assert_eq!(config.write_timeout, Some(DEFAULT_IO_TIMEOUT));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("mail.example.com")
            .port(465)
            .security(Security::Implicit)
            .verification(TlsVerification::Insecure)
            .read_timeout(Some(Duration::from_secs(5)))
            .write_timeout(None)
            .build();

        assert_eq!(config.port, 465);
        assert!(config.security.is_tls());
        assert_eq!(config.verification, TlsVerification::Insecure);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.write_timeout, None);
    }

    #[test]
    fn test_io_timeout_sets_both_directions() {
        let config = Config::builder("localhost")
            .io_timeout(Some(Duration::from_secs(3)))
            .build();
        assert_eq!(config.read_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.write_timeout, Some(Duration::from_secs(3)));
    }
}
