//! IMAP exchanges.
//!
//! Every command is sent with a fresh tag and read under tagged framing:
//! untagged `*` lines are skipped until the line carrying the tag arrives,
//! and its completion result is checked.

use mailledger_transport::Config;

use crate::Result;
use crate::exchange::{Exchange, ExchangeResult};
use crate::framing::Framing;
use crate::reply::Completion;
use crate::script::{Expect, Step};

/// Prefix of an IMAP server greeting.
pub const GREETING_PREFIX: &str = "* OK";

/// Tag generator for IMAP commands.
///
/// Generates sequential tags in the format "A0000", "A0001", etc.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Generates the next tag.
    pub fn next_tag(&mut self) -> String {
        let n = self.counter;
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:04}", self.prefix, n)
    }

    /// Returns the current counter value without incrementing.
    #[must_use]
    pub const fn current(&self) -> u32 {
        self.counter
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
    }
}

/// Server greeting: a line starting with `* OK`.
#[must_use]
pub fn greeting() -> Step {
    Step::new("greeting", Expect::Prefix(GREETING_PREFIX.to_string()))
}

/// `tag text`, read up to the tagged line, which must carry `expected`.
#[must_use]
pub fn command(tag: &str, text: &str, expected: Completion) -> Step {
    let verb = text.split(' ').next().unwrap_or(text);
    Step::new(verb.to_ascii_uppercase(), Expect::Completion(expected))
        .send(format!("{tag} {text}\r\n"))
        .framing(Framing::Tagged(tag.to_string()))
}

/// Appends `s` as an IMAP astring, quoting it when needed.
pub fn write_astring(buf: &mut String, s: &str) {
    if s.is_empty() || s.bytes().any(needs_quoting) {
        buf.push('"');
        for c in s.chars() {
            if c == '"' || c == '\\' {
                buf.push('\\');
            }
            buf.push(c);
        }
        buf.push('"');
    } else {
        buf.push_str(s);
    }
}

const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}

/// IMAP dialogue over one session.
#[derive(Debug)]
pub struct ImapExchange {
    exchange: Exchange,
    tags: TagGenerator,
}

impl ImapExchange {
    /// Wraps an exchange driver.
    #[must_use]
    pub fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            tags: TagGenerator::default(),
        }
    }

    /// Connects according to `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the
    /// connection cannot be established.
    pub async fn connect(config: &Config) -> Result<Self> {
        Exchange::connect(config).await.map(Self::new)
    }

    /// Returns the underlying driver.
    pub const fn exchange_mut(&mut self) -> &mut Exchange {
        &mut self.exchange
    }

    /// Closes the session.
    pub async fn close(&mut self) {
        self.exchange.close().await;
    }

    /// Reads and checks the server greeting.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn greeting(&mut self) -> Result<ExchangeResult> {
        self.exchange.exchange(&greeting()).await
    }

    /// Sends `text` under a fresh tag and expects the `expected` completion.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn command(&mut self, text: &str, expected: Completion) -> Result<ExchangeResult> {
        let tag = self.tags.next_tag();
        self.exchange.exchange(&command(&tag, text, expected)).await
    }

    /// Logs in with a username and password.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<ExchangeResult> {
        let mut text = String::from("LOGIN ");
        write_astring(&mut text, username);
        text.push(' ');
        write_astring(&mut text, password);
        self.command(&text, Completion::Ok).await
    }

    /// Selects a mailbox.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn select(&mut self, mailbox: &str) -> Result<ExchangeResult> {
        let mut text = String::from("SELECT ");
        write_astring(&mut text, mailbox);
        self.command(&text, Completion::Ok).await
    }

    /// Runs a search with the given criteria.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn search(&mut self, criteria: &str) -> Result<ExchangeResult> {
        self.command(&format!("SEARCH {criteria}"), Completion::Ok)
            .await
    }

    /// Fetches items for a sequence set.
    ///
    /// # Errors
    ///
    /// Returns the step failure.
    pub async fn fetch(&mut self, sequence: &str, items: &str) -> Result<ExchangeResult> {
        self.command(&format!("FETCH {sequence} {items}"), Completion::Ok)
            .await
    }

    /// Sends `LOGOUT` and confirms the server closes the connection.
    ///
    /// # Errors
    ///
    /// Returns the step failure, or
    /// [`Error::PrematureClose`](crate::Error::PrematureClose) if the server
    /// keeps talking.
    pub async fn logout(&mut self) -> Result<ExchangeResult> {
        let tag = self.tags.next_tag();
        let step = command(&tag, "LOGOUT", Completion::Ok).then_shutdown();
        self.exchange.exchange(&step).await
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
    fn test_tag_generation() {
        let mut generator = TagGenerator::default();
        assert_eq!(generator.next_tag(), "A0000");
        assert_eq!(generator.next_tag(), "A0001");
        assert_eq!(generator.next_tag(), "A0002");
        assert_eq!(generator.current(), 3);
    }

    #[test]
    fn test_custom_prefix_and_padding() {
        let mut generator = TagGenerator::new('X');
        for _ in 0..100 {
            let _ = generator.next_tag();
        }
        assert_eq!(generator.next_tag(), "X0100");
    }

    #[test]
    fn test_uniqueness() {
        let mut generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10000 {
            assert!(seen.insert(generator.next_tag()), "duplicate tag generated");
        }
    }

    #[test]
    fn test_command_step() {
        let step = command("A0001", "select Inbox", Completion::Ok);
        assert_eq!(step.label(), "SELECT");
        assert_eq!(step.payload(), Some(&b"A0001 select Inbox\r\n"[..]));
        assert_eq!(
            step.response_framing(),
            &Framing::Tagged("A0001".to_string())
        );
        assert_eq!(step.expectation(), &Expect::Completion(Completion::Ok));
    }

    #[test]
    fn test_greeting_step() {
        let step = greeting();
        assert_eq!(step.payload(), None);
        assert_eq!(step.expectation(), &Expect::Prefix("* OK".to_string()));
    }

    #[test]
    fn test_write_astring() {
        let mut buf = String::new();
        write_astring(&mut buf, "magma");
        assert_eq!(buf, "magma");

        let mut buf = String::new();
        write_astring(&mut buf, "two words");
        assert_eq!(buf, "\"two words\"");

        let mut buf = String::new();
        write_astring(&mut buf, r#"pa"ss\"#);
        assert_eq!(buf, r#""pa\"ss\\""#);

        let mut buf = String::new();
        write_astring(&mut buf, "");
        assert_eq!(buf, "\"\"");
    }
}
