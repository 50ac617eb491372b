//! Integration tests for transport sessions.
//!
//! Each test runs a small scripted server on a loopback listener.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use mailledger_transport::{Config, Error, Security, Status, TlsVerification, connect, connect_with};

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn tls_acceptor() -> TlsAcceptor {
    let certs = rustls_pemfile::certs(&mut &include_bytes!("fixtures/cert.pem")[..])
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    let key = rustls_pemfile::private_key(&mut &include_bytes!("fixtures/key.pem")[..])
        .unwrap()
        .expect("fixture key");
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// Accepts one connection, writes `reply`, then holds the connection until
/// the client goes away.
fn serve_once(listener: TcpListener, reply: &'static [u8]) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let _ = socket.write_all(reply).await;
        let mut rest = Vec::new();
        let _ = socket.read_to_end(&mut rest).await;
    })
}

/// Accepts one connection, writes `reply`, then shuts down.
fn serve_and_close(listener: TcpListener, reply: &'static [u8]) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let _ = socket.write_all(reply).await;
        let _ = socket.shutdown().await;
    })
}

#[tokio::test]
async fn test_connect_reports_connected() {
    let (listener, port) = listener().await;
    let server = serve_once(listener, b"220 localhost ESMTP ready\r\n");

    let mut session = connect("127.0.0.1", port).await.unwrap();
    assert_eq!(session.status(), Status::Connected);
    assert_eq!(session.peer_ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert!(session.is_open());
    assert!(!session.is_secure());

    assert_eq!(session.read_line().await.unwrap(), 27);
    assert_eq!(session.line(), b"220 localhost ESMTP ready\r\n");
    assert_eq!(session.status(), Status::Connected);

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_multiline_then_orderly_shutdown() {
    let (listener, port) = listener().await;
    let server = serve_and_close(listener, b"250-First\r\n250-Second\r\n250 Third\r\n");

    let mut session = connect("127.0.0.1", port).await.unwrap();
    let mut lines = Vec::new();
    while session.read_line().await.unwrap() > 0 {
        lines.push(session.line_lossy().into_owned());
    }

    assert_eq!(lines, ["250-First\r\n", "250-Second\r\n", "250 Third\r\n"]);
    assert_eq!(session.status(), Status::ShutdownGraceful);

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (listener, port) = listener().await;
    let server = serve_once(listener, b"");

    let mut session = connect("127.0.0.1", port).await.unwrap();
    session.close().await;
    assert_eq!(session.status(), Status::Error);
    assert!(!session.is_open());

    session.close().await;
    assert_eq!(session.status(), Status::Error);

    assert!(matches!(session.read_line().await, Err(Error::Closed)));
    assert!(matches!(
        session.write(b"NOOP\r\n").await,
        Err(Error::Closed)
    ));
    assert!(matches!(session.secure().await, Err(Error::Closed)));
    assert_eq!(session.status(), Status::Error);

    drop(session);
    server.await.unwrap();
}

#[tokio::test]
async fn test_resolution_failure() {
    let err = connect("nonexistent.invalid", 25).await.unwrap_err();
    assert!(matches!(err, Error::Resolution { port: 25, .. }), "{err}");
}

#[tokio::test]
async fn test_unreachable() {
    let (listener, port) = listener().await;
    drop(listener);

    let err = connect("127.0.0.1", port).await.unwrap_err();
    assert!(
        matches!(err, Error::Unreachable { attempts: 1, .. }),
        "{err}"
    );
}

#[tokio::test]
async fn test_write_and_print() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(socket);
        let mut first = String::new();
        let mut second = String::new();
        reader.read_line(&mut first).await.unwrap();
        reader.read_line(&mut second).await.unwrap();
        (first, second)
    });

    let mut session = connect("127.0.0.1", port).await.unwrap();
    let transfer = session.write(b"HELO localhost\r\n").await.unwrap();
    assert_eq!(transfer.complete().unwrap(), 16);

    let transfer = session
        .print(format_args!("RCPT TO: <{}>\r\n", "princess@example.com"))
        .await
        .unwrap();
    assert_eq!(transfer.expected, 33);
    assert!(transfer.is_complete());

    let (first, second) = server.await.unwrap();
    assert_eq!(first, "HELO localhost\r\n");
    assert_eq!(second, "RCPT TO: <princess@example.com>\r\n");
    session.close().await;
}

#[tokio::test]
async fn test_read_timeout_forces_error() {
    let (listener, port) = listener().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1];
        // Hold the connection open until the client goes away.
        let _ = socket.read(&mut buf).await;
    });

    let mut session = connect("127.0.0.1", port).await.unwrap();
    session.set_timeouts(Some(Duration::from_millis(100)), None);

    let err = session.read_line().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err}");
    assert_eq!(session.status(), Status::Error);
    assert_eq!(session.status(), Status::Error);

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_implicit_tls_session() {
    let (listener, port) = listener().await;
    let acceptor = tls_acceptor();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut tls = acceptor.accept(socket).await.unwrap();
        tls.write_all(b"* OK IMAP ready\r\n").await.unwrap();
        tls.flush().await.unwrap();
        let mut rest = Vec::new();
        tls.read_to_end(&mut rest).await.unwrap();
        rest
    });

    let config = Config::builder("127.0.0.1")
        .port(port)
        .security(Security::Implicit)
        .verification(TlsVerification::Insecure)
        .io_timeout(Some(Duration::from_secs(5)))
        .build();

    let mut session = connect_with(&config).await.unwrap();
    assert!(session.is_secure());
    assert_eq!(session.status(), Status::Connected);

    session.read_line().await.unwrap();
    assert_eq!(session.line(), b"* OK IMAP ready\r\n");

    // Already secure: no-op success.
    session.secure().await.unwrap();
    assert!(session.is_secure());
    assert_eq!(session.status(), Status::Connected);

    session
        .write(b"A0000 LOGOUT\r\n")
        .await
        .unwrap()
        .complete()
        .unwrap();
    session.close().await;
    assert_eq!(session.status(), Status::Error);

    let received = server.await.unwrap();
    assert_eq!(received, b"A0000 LOGOUT\r\n");
}

#[tokio::test]
async fn test_failed_upgrade_leaves_no_tls_state() {
    let (listener, port) = listener().await;
    let server = serve_and_close(listener, b"220 this is not a TLS server\r\n");

    let mut session = connect("127.0.0.1", port).await.unwrap();
    session.set_verification(TlsVerification::Insecure);
    session.set_timeouts(Some(Duration::from_secs(5)), Some(Duration::from_secs(5)));

    assert!(session.secure().await.is_err());
    assert!(!session.is_secure());
    assert!(!session.is_open());
    assert_eq!(session.status(), Status::Error);

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_secure_refused_after_error() {
    let (listener, port) = listener().await;
    let server = serve_once(listener, b"");

    let mut session = connect("127.0.0.1", port).await.unwrap();
    session.set_verification(TlsVerification::Insecure);
    session.set_timeouts(Some(Duration::from_millis(100)), None);

    let err = session.read_line().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err}");
    assert!(session.is_open());

    let err = session.secure().await.unwrap_err();
    assert!(matches!(err, Error::SecureUpgrade(_)), "{err}");
    assert!(!session.is_secure());
    assert_eq!(session.status(), Status::Error);

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_secure_refused_with_buffered_plaintext() {
    let (listener, port) = listener().await;
    let server = serve_once(listener, b"220 Ready to start TLS\r\n250 injected\r\n");

    let mut session = connect("127.0.0.1", port).await.unwrap();
    session.set_verification(TlsVerification::Insecure);
    session.set_timeouts(Some(Duration::from_secs(5)), Some(Duration::from_secs(5)));

    session.read_line().await.unwrap();
    assert_eq!(session.line(), b"220 Ready to start TLS\r\n");

    let err = session.secure().await.unwrap_err();
    assert!(matches!(err, Error::SecureUpgrade(_)), "{err}");
    assert!(!session.is_secure());
    assert_eq!(session.status(), Status::Error);

    // The buffered line never surfaces as if it had arrived over TLS.
    session.close().await;
    assert!(matches!(session.read_line().await, Err(Error::Closed)));
    server.await.unwrap();
}
