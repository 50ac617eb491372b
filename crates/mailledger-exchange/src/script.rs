//! Protocol steps and scripts.
//!
//! A [`Step`] is one command/response round trip: what to write, how the
//! response is framed, and what it must look like. A [`ProtocolScript`] is a
//! named, ordered list of steps. Both are immutable once built.

use std::fmt;

use bytes::Bytes;

use crate::command::Command;
use crate::framing::{Framing, status_token, tagged_completion};
use crate::reply::{Completion, ReplyCode};

/// What the terminal response line must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    /// SMTP reply code in the first three bytes.
    Reply(ReplyCode),
    /// IMAP completion result after the tag.
    Completion(Completion),
    /// Literal line prefix, e.g. `* OK` for an IMAP greeting.
    Prefix(String),
}

impl Expect {
    /// Returns true if `line` satisfies this expectation under `framing`.
    #[must_use]
    pub fn matches(&self, line: &[u8], framing: &Framing) -> bool {
        match self {
            Self::Reply(code) => code.leads(line),
            Self::Completion(expected) => match framing {
                Framing::Tagged(tag) => tagged_completion(line, tag) == Some(*expected),
                Framing::Line | Framing::Multiline => {
                    status_token(line, framing) == expected.as_str().as_bytes()
                }
            },
            Self::Prefix(prefix) => line.starts_with(prefix.as_bytes()),
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reply(code) => write!(f, "{code}"),
            Self::Completion(completion) => write!(f, "{completion}"),
            Self::Prefix(prefix) => write!(f, "{prefix:?}"),
        }
    }
}

/// One command/response round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    label: String,
    command: Option<Bytes>,
    framing: Framing,
    expect: Expect,
    contains: Option<String>,
    then_shutdown: bool,
}

impl Step {
    /// Creates a read-only step: nothing is written, one line is read.
    #[must_use]
    pub fn new(label: impl Into<String>, expect: Expect) -> Self {
        Self {
            label: label.into(),
            command: None,
            framing: Framing::Line,
            expect,
            contains: None,
            then_shutdown: false,
        }
    }

    /// Creates a step for an SMTP command, labelled with its verb.
    #[must_use]
    pub fn command(command: &Command, expect: Expect) -> Self {
        Self::new(command.verb(), expect).send(command.serialize())
    }

    /// Sets the bytes written before reading.
    #[must_use]
    pub fn send(mut self, bytes: impl Into<Bytes>) -> Self {
        self.command = Some(bytes.into());
        self
    }

    /// Sets the response framing.
    #[must_use]
    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Requires the terminal line to contain `needle`.
    #[must_use]
    pub fn contains(mut self, needle: impl Into<String>) -> Self {
        self.contains = Some(needle.into());
        self
    }

    /// Requires the server to shut the connection down after the response.
    #[must_use]
    pub const fn then_shutdown(mut self) -> Self {
        self.then_shutdown = true;
        self
    }

    /// Returns the step label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the bytes to write, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.command.as_deref()
    }

    /// Returns the response framing.
    #[must_use]
    pub const fn response_framing(&self) -> &Framing {
        &self.framing
    }

    /// Returns the expectation on the terminal line.
    #[must_use]
    pub const fn expectation(&self) -> &Expect {
        &self.expect
    }

    /// Returns the required substring, if any.
    #[must_use]
    pub fn required_text(&self) -> Option<&str> {
        self.contains.as_deref()
    }

    /// Returns true if an orderly shutdown must follow the response.
    #[must_use]
    pub const fn expects_shutdown(&self) -> bool {
        self.then_shutdown
    }
}

/// Named, ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolScript {
    name: String,
    steps: Vec<Step>,
}

impl ProtocolScript {
    /// Creates an empty script.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns the script name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the steps in order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the script has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
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
    fn test_expect_reply() {
        let expect = Expect::Reply(ReplyCode::OK);
        assert!(expect.matches(b"250 OK\r\n", &Framing::Line));
        assert!(!expect.matches(b"550 denied\r\n", &Framing::Line));
        assert_eq!(expect.to_string(), "250");
    }

    #[test]
    fn test_expect_completion() {
        let tagged = Framing::Tagged("A0001".to_string());
        let expect = Expect::Completion(Completion::Ok);
        assert!(expect.matches(b"A0001 OK done\r\n", &tagged));
        assert!(!expect.matches(b"A0001 NO nope\r\n", &tagged));
        assert!(!expect.matches(b"A0002 OK done\r\n", &tagged));
        let refusal = Expect::Completion(Completion::No);
        assert!(refusal.matches(b"A0001 NO nope\r\n", &tagged));
    }

    #[test]
    fn test_expect_prefix() {
        let expect = Expect::Prefix("* OK".to_string());
        assert!(expect.matches(b"* OK IMAP4rev1 ready\r\n", &Framing::Line));
        assert!(!expect.matches(b"* BYE\r\n", &Framing::Line));
        assert_eq!(expect.to_string(), "\"* OK\"");
    }

    #[test]
    fn test_step_builder() {
        let step = Step::command(&Command::Quit, Expect::Reply(ReplyCode::CLOSING))
            .then_shutdown();
        assert_eq!(step.label(), "QUIT");
        assert_eq!(step.payload(), Some(&b"QUIT\r\n"[..]));
        assert_eq!(step.response_framing(), &Framing::Line);
        assert!(step.expects_shutdown());
        assert_eq!(step.required_text(), None);

        let greeting = Step::new("greeting", Expect::Reply(ReplyCode::SERVICE_READY))
            .contains(" ESMTP ");
        assert_eq!(greeting.payload(), None);
        assert_eq!(greeting.required_text(), Some(" ESMTP "));
        assert!(!greeting.expects_shutdown());
    }

    #[test]
    fn test_script_keeps_order() {
        let banner = Step::new("greeting", Expect::Reply(ReplyCode::SERVICE_READY));
        let quit = Step::command(&Command::Quit, Expect::Reply(ReplyCode::CLOSING));
        let script = ProtocolScript::new("demo")
            .step(banner)
            .step(Step::command(&Command::Noop, Expect::Reply(ReplyCode::OK)))
            .step(quit);

        assert_eq!(script.name(), "demo");
        assert_eq!(script.len(), 3);
        assert!(!script.is_empty());
        let labels: Vec<&str> = script.steps().iter().map(Step::label).collect();
        assert_eq!(labels, ["greeting", "NOOP", "QUIT"]);
        assert!(ProtocolScript::new("empty").is_empty());
    }
}
