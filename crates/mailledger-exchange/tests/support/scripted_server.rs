//! Scripted loopback server.
//!
//! The server accepts one connection and plays a fixed list of turns:
//! sending canned replies, checking the exact lines the client writes,
//! upgrading to TLS, and finally closing or holding the connection.
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc
)]

use std::sync::Arc;

use mailledger_transport::{Config, DEFAULT_IO_TIMEOUT, TlsVerification};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// One server action.
#[derive(Debug, Clone, Copy)]
pub enum Turn {
    /// Write these bytes.
    Send(&'static str),
    /// Read one line and check it matches exactly.
    Recv(&'static str),
    /// Read lines up to and including a lone `.` line.
    Message,
    /// Accept a TLS handshake and continue over TLS.
    StartTls,
    /// Shut the connection down.
    Close,
    /// Keep the connection open until the client goes away.
    Hold,
}

/// A server running one script on a loopback port.
pub struct ScriptedServer {
    /// Port the server listens on.
    pub port: u16,
    handle: JoinHandle<Vec<String>>,
}

impl ScriptedServer {
    /// Starts a server that plays `turns` for the first client.
    pub async fn start(turns: Vec<Turn>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut stream = BufReader::new(socket);
            let rest = play(&mut stream, &turns, &mut received).await;

            if let Some(rest) = rest {
                let tls = tls_acceptor().accept(stream.into_inner()).await.unwrap();
                let mut stream = BufReader::new(tls);
                play(&mut stream, rest, &mut received).await;
            }
            received
        });

        Self { port, handle }
    }

    /// Plain-TCP client configuration for this server.
    #[must_use]
    pub fn config(&self) -> Config {
        Config::builder("127.0.0.1")
            .port(self.port)
            .verification(TlsVerification::Insecure)
            .io_timeout(Some(DEFAULT_IO_TIMEOUT))
            .build()
    }

    /// Waits for the script to finish and returns every line received.
    pub async fn finish(self) -> Vec<String> {
        self.handle.await.unwrap()
    }
}

/// Plays turns until the script ends or asks for TLS; returns the turns
/// left after a TLS request.
async fn play<'a, S>(
    stream: &mut BufReader<S>,
    turns: &'a [Turn],
    received: &mut Vec<String>,
) -> Option<&'a [Turn]>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for (i, turn) in turns.iter().enumerate() {
        match *turn {
            Turn::Send(reply) => {
                stream.get_mut().write_all(reply.as_bytes()).await.unwrap();
                stream.get_mut().flush().await.unwrap();
            }
            Turn::Recv(expected) => {
                let line = read_line(stream).await;
                assert_eq!(line, expected);
                received.push(line);
            }
            Turn::Message => loop {
                let line = read_line(stream).await;
                let done = line == ".\r\n";
                received.push(line);
                if done {
                    break;
                }
            },
            Turn::StartTls => return Some(&turns[i + 1..]),
            Turn::Close => {
                let _ = stream.get_mut().shutdown().await;
                return None;
            }
            Turn::Hold => {
                let mut rest = Vec::new();
                let _ = stream.read_to_end(&mut rest).await;
                return None;
            }
        }
    }
    None
}

async fn read_line<S: AsyncRead + Unpin>(stream: &mut BufReader<S>) -> String {
    let mut line = String::new();
    let n = stream.read_line(&mut line).await.unwrap();
    assert!(n > 0, "client closed the connection early");
    line
}

fn tls_acceptor() -> TlsAcceptor {
    let certs = rustls_pemfile::certs(
        &mut &include_bytes!("../../../mailledger-transport/tests/fixtures/cert.pem")[..],
    )
    .collect::<Result<Vec<_>, _>>()
    .unwrap();
    let key = rustls_pemfile::private_key(
        &mut &include_bytes!("../../../mailledger-transport/tests/fixtures/key.pem")[..],
    )
    .unwrap()
    .expect("fixture key");
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}
