//! # mailledger-transport
//!
//! Client transport sessions for line-oriented, status-coded mail protocols
//! (SMTP, IMAP) over plain TCP and TLS.
//!
//! ## Features
//!
//! - **Multi-candidate connect**: every resolved address is tried in resolver
//!   order, first success wins
//! - **TLS via rustls**: upgrade an established session in place
//! - **Unified status**: one cached status, refined by advisory TCP/TLS
//!   liveness probes
//! - **Fixed read buffer**: 8 KiB per session, one CRLF line per read
//! - **Ordered release**: TLS state, socket, buffer; idempotent close
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailledger_transport::{Status, connect};
//!
//! #[tokio::main]
//! async fn main() -> mailledger_transport::Result<()> {
//!     let mut session = connect("localhost", 25).await?;
//!     session.read_line().await?;
//!     assert_eq!(session.status(), Status::Connected);
//!
//!     session.write(b"QUIT\r\n").await?.complete()?;
//!     session.read_line().await?;
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`buffer`]: fixed-capacity line buffer
//! - [`config`]: host, port, security and timeout configuration
//! - [`connector`]: address resolution and connection establishment
//! - [`session`]: the transport session
//! - [`status`]: status machine and liveness probe results
//! - [`stream`]: plain/TLS stream and TLS connector

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod config;
pub mod connector;
mod error;
pub mod session;
pub mod status;
pub mod stream;

pub use buffer::{BUFFER_CAPACITY, LineBuffer};
pub use config::{Config, ConfigBuilder, DEFAULT_IO_TIMEOUT, Security, TlsVerification};
pub use connector::{connect, connect_with, resolve};
pub use error::{Error, Result};
pub use session::{Transfer, TransportSession};
pub use status::{Liveness, Status};
pub use stream::{TransportStream, create_tls_connector};
