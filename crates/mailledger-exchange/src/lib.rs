//! # mailledger-exchange
//!
//! Scripted command/response exchanges over a
//! [`mailledger_transport`] session, with the framing rules of SMTP and IMAP.
//!
//! ## Features
//!
//! - **Framing**: SMTP multi-line replies (`250-` continues, `250 ` ends) and
//!   IMAP tagged completions
//! - **Validated steps**: byte-exact writes, complete reads, live session,
//!   expected status token, required text, confirmed shutdown
//! - **Scripts**: named, ordered, immutable step lists
//! - **Dialogues**: SMTP (HELO/EHLO, MAIL/RCPT/DATA, AUTH PLAIN/LOGIN,
//!   STARTTLS, QUIT) and IMAP (LOGIN, SELECT, SEARCH, FETCH, LOGOUT)
//! - **Scenarios**: end-to-end conformance checks reported as data
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailledger_exchange::smtp::SmtpExchange;
//! use mailledger_transport::Config;
//!
//! #[tokio::main]
//! async fn main() -> mailledger_exchange::Result<()> {
//!     let config = Config::builder("localhost").port(25).build();
//!     let mut smtp = SmtpExchange::connect(&config).await?;
//!
//!     smtp.greeting().await?;
//!     smtp.ehlo("localhost").await?;
//!     smtp.mail_rcpt_data("", "princess@example.com").await?;
//!     smtp.message("Subject: hi\r\n\r\nhello\r\n.\r\n").await?;
//!     smtp.quit().await?;
//!
//!     smtp.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
mod error;
pub mod exchange;
pub mod framing;
pub mod imap;
pub mod reply;
pub mod sasl;
pub mod scenario;
pub mod script;
pub mod smtp;

pub use command::Command;
pub use error::{Error, Result};
pub use exchange::{Exchange, ExchangeResult};
pub use framing::{Framing, is_final_reply_line, is_tagged_completion};
pub use imap::{ImapExchange, TagGenerator};
pub use reply::{Completion, ReplyCode};
pub use scenario::{Fixture, Mechanism, Scenario, ScenarioReport};
pub use script::{Expect, ProtocolScript, Step};
pub use smtp::SmtpExchange;
