//! SMTP exchanges against scripted loopback servers.

#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod support;

use std::time::Duration;

use mailledger_exchange::scenario::{self, Fixture, Mechanism};
use mailledger_exchange::{Error, Exchange, ReplyCode, SmtpExchange};
use mailledger_transport::{Error as TransportError, Status};
use support::scripted_server::{ScriptedServer, Turn};

const BANNER: &str = "220 localhost ESMTP ready\r\n";

#[tokio::test]
async fn test_multiline_reply_ends_at_space_line() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("EHLO localhost\r\n"),
        Turn::Send("250-First\r\n250-Second\r\n250 Third\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    let banner = smtp.greeting().await.unwrap();
    assert_eq!(banner.token_str(), "220");

    let reply = smtp.ehlo("localhost").await.unwrap();
    assert_eq!(reply.line_lossy(), "250 Third\r\n");
    assert_eq!(reply.token_str(), "250");
    assert!(reply.terminal);

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_single_line_reply_ends_immediately() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("EHLO localhost\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("NOOP\r\n"),
        Turn::Send("250 still here\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    let reply = smtp.ehlo("localhost").await.unwrap();
    assert_eq!(reply.line_lossy(), "250 OK\r\n");

    // The next reply is read fresh, not left over from EHLO.
    let reply = smtp.noop().await.unwrap();
    assert_eq!(reply.line_lossy(), "250 still here\r\n");

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_continuation_then_close_is_a_failure() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("EHLO localhost\r\n"),
        Turn::Send("250-First\r\n250-Second\r\n"),
        Turn::Close,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    let err = smtp.ehlo("localhost").await.unwrap_err();
    assert!(
        matches!(err, Error::ShortRead { ref step } if step == "EHLO"),
        "{err}"
    );

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_banner_must_advertise_esmtp() {
    let server = ScriptedServer::start(vec![
        Turn::Send("220 localhost SMTP ready\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    let err = smtp.greeting().await.unwrap_err();
    assert!(
        matches!(err, Error::MissingText { ref needle, .. } if needle == " ESMTP "),
        "{err}"
    );

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_unexpected_status_is_reported() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("HELO localhost\r\n"),
        Turn::Send("502 not today\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    let err = smtp.helo("localhost").await.unwrap_err();
    assert_eq!(
        err.to_string(),
        r#"HELO: expected 250, got "502 not today\r\n""#
    );

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_auth_login_accepted() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("AUTH LOGIN\r\n"),
        Turn::Send("334 VXNlcm5hbWU6\r\n"),
        Turn::Recv("bWFnbWE=\r\n"),
        Turn::Send("334 UGFzc3dvcmQ6\r\n"),
        Turn::Recv("cGFzc3dvcmQ=\r\n"),
        Turn::Send("235 2.7.0 Authentication successful\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    let reply = smtp.auth_login("bWFnbWE=", "cGFzc3dvcmQ=").await.unwrap();
    assert_eq!(reply.token_str(), "235");

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_auth_login_rejected() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("AUTH LOGIN\r\n"),
        Turn::Send("334 VXNlcm5hbWU6\r\n"),
        Turn::Recv("bWFnbWE=\r\n"),
        Turn::Send("334 UGFzc3dvcmQ6\r\n"),
        Turn::Recv("aW52YWxpZHBhc3N3b3Jk\r\n"),
        Turn::Send("535 5.7.8 Authentication credentials invalid\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    let err = smtp
        .auth_login("bWFnbWE=", "aW52YWxpZHBhc3N3b3Jk")
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::UnexpectedStatus { ref step, ref line, .. }
            if step == "AUTH LOGIN password"
                && ReplyCode::AUTH_FAILED.leads(line.as_bytes())),
        "{err}"
    );
    // The session survives a refused step.
    assert!(smtp.exchange_mut().session().is_open());

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_quit_requires_shutdown() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("QUIT\r\n"),
        Turn::Send("221 bye\r\n250 but wait\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    let err = smtp.quit().await.unwrap_err();
    assert!(matches!(err, Error::PrematureClose { .. }), "{err}");

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_quit_without_close_is_premature() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("QUIT\r\n"),
        Turn::Send("221 bye\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut config = server.config();
    config.read_timeout = Some(Duration::from_millis(300));

    let mut smtp = SmtpExchange::connect(&config).await.unwrap();
    smtp.greeting().await.unwrap();
    let err = smtp.quit().await.unwrap_err();
    assert!(
        matches!(err, Error::PrematureClose { ref step } if step == "QUIT"),
        "{err}"
    );

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_starttls_refuses_buffered_plaintext() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("STARTTLS\r\n"),
        Turn::Send("220 2.0.0 Ready to start TLS\r\n250 injected\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    let err = smtp.starttls().await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::Transport { ref step, source: TransportError::SecureUpgrade(_) }
                if step == "STARTTLS"
        ),
        "{err}"
    );
    assert!(!smtp.exchange_mut().session().is_secure());
    assert_eq!(smtp.exchange_mut().session_mut().status(), Status::Error);

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_rset_abandons_transaction() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("MAIL FROM: <magma@lavabit.com>\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("RSET\r\n"),
        Turn::Send("250 2.0.0 Reset state\r\n"),
        Turn::Recv("RCPT TO: <princess@example.com>\r\n"),
        Turn::Send("503 5.5.1 Error: need MAIL command\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    smtp.mail_from("magma@lavabit.com").await.unwrap();
    let reply = smtp.rset().await.unwrap();
    assert_eq!(reply.token_str(), "250");

    let err = smtp.rcpt_to("princess@example.com").await.unwrap_err();
    assert_eq!(err.step(), "RCPT");

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_script_stops_at_first_failure() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("HELO localhost\r\n"),
        Turn::Send("421 shutting down\r\n"),
        Turn::Hold,
    ])
    .await;

    let script = scenario::smtp_basic_script(&Fixture::default());
    let mut exchange = Exchange::connect(&server.config()).await.unwrap();
    let err = exchange.run(&script).await.unwrap_err();
    assert_eq!(err.step(), "HELO");

    exchange.close().await;
    let received = server.finish().await;
    assert_eq!(received, ["HELO localhost\r\n"]);
}

#[tokio::test]
async fn test_starttls_upgrades_session() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("STARTTLS\r\n"),
        Turn::Send("220 2.0.0 Ready to start TLS\r\n"),
        Turn::StartTls,
        Turn::Recv("EHLO localhost\r\n"),
        Turn::Send("250-localhost\r\n250 AUTH PLAIN LOGIN\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    smtp.starttls().await.unwrap();
    assert!(smtp.exchange_mut().session().is_secure());

    let reply = smtp.ehlo("localhost").await.unwrap();
    assert_eq!(reply.line_lossy(), "250 AUTH PLAIN LOGIN\r\n");

    smtp.close().await;
    server.finish().await;
}

#[tokio::test]
async fn test_basic_scenario_passes() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("HELO localhost\r\n"),
        Turn::Send("250 localhost\r\n"),
        Turn::Recv("EHLO localhost\r\n"),
        Turn::Send("250-localhost\r\n250-8BITMIME\r\n250 PIPELINING\r\n"),
        Turn::Recv("MAIL FROM: <>\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("RCPT TO: <princess@example.com>\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("DATA\r\n"),
        Turn::Send("354 Start mail input\r\n"),
        Turn::Message,
        Turn::Send("250 OK queued\r\n"),
        Turn::Recv("QUIT\r\n"),
        Turn::Send("221 bye\r\n"),
        Turn::Close,
    ])
    .await;

    let (config, fixture) = (server.config(), Fixture::default());
    let report = scenario::smtp_basic(&config, &fixture).await;
    assert!(report.passed, "{report}");
    assert_eq!(report.name, "smtp-basic");

    let received = server.finish().await;
    assert!(received.contains(&"Subject: Unit Tests\r\n".to_string()));
    assert_eq!(received.last().map(String::as_str), Some("QUIT\r\n"));
}

fn auth_turns(mechanism: Mechanism, relay_reply: &'static str) -> Vec<Turn> {
    let mut turns = vec![
        Turn::Send(BANNER),
        Turn::Recv("EHLO localhost\r\n"),
        Turn::Send("250-localhost\r\n250 AUTH PLAIN LOGIN\r\n"),
    ];

    match mechanism {
        Mechanism::Plain => turns.extend([
            Turn::Recv("AUTH PLAIN bWFnbWEAbWFnbWEAaW52YWxpZHBhc3N3b3Jk\r\n"),
            Turn::Send("535 5.7.8 Authentication credentials invalid\r\n"),
            Turn::Recv("AUTH PLAIN bWFnbWEAbWFnbWEAcGFzc3dvcmQ=\r\n"),
            Turn::Send("235 2.7.0 Authentication successful\r\n"),
        ]),
        Mechanism::Login => turns.extend([
            Turn::Recv("AUTH LOGIN\r\n"),
            Turn::Send("334 VXNlcm5hbWU6\r\n"),
            Turn::Recv("bWFnbWE=\r\n"),
            Turn::Send("334 UGFzc3dvcmQ6\r\n"),
            Turn::Recv("aW52YWxpZHBhc3N3b3Jk\r\n"),
            Turn::Send("535 5.7.8 Authentication credentials invalid\r\n"),
            Turn::Recv("AUTH LOGIN\r\n"),
            Turn::Send("334 VXNlcm5hbWU6\r\n"),
            Turn::Recv("bWFnbWE=\r\n"),
            Turn::Send("334 UGFzc3dvcmQ6\r\n"),
            Turn::Recv("cGFzc3dvcmQ=\r\n"),
            Turn::Send("235 2.7.0 Authentication successful\r\n"),
        ]),
    }

    turns.extend([
        Turn::Recv("MAIL FROM: <ladar@lavabit.com>\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("RCPT TO: <princess@example.com>\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("DATA\r\n"),
        Turn::Send("354 Start mail input\r\n"),
        Turn::Recv(".\r\n"),
        Turn::Send(relay_reply),
    ]);

    turns
}

fn authenticated_send_turns() -> [Turn; 10] {
    [
        Turn::Recv("MAIL FROM: <magma@lavabit.com>\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("RCPT TO: <princess@example.com>\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("DATA\r\n"),
        Turn::Send("354 Start mail input\r\n"),
        Turn::Recv(".\r\n"),
        Turn::Send("250 OK queued\r\n"),
        Turn::Recv("QUIT\r\n"),
        Turn::Send("221 bye\r\n"),
    ]
}

#[tokio::test]
async fn test_auth_plain_scenario_passes() {
    let mut turns = auth_turns(Mechanism::Plain, "550 5.7.1 Sender not owned\r\n");
    turns.extend(authenticated_send_turns());
    turns.push(Turn::Close);
    let server = ScriptedServer::start(turns).await;

    let (config, fixture) = (server.config(), Fixture::default());
    let report = scenario::smtp_auth(&config, &fixture, Mechanism::Plain).await;
    assert!(report.passed, "{report}");
    assert_eq!(report.name, "smtp-auth-plain");
    server.finish().await;
}

#[tokio::test]
async fn test_auth_login_scenario_passes() {
    let mut turns = auth_turns(Mechanism::Login, "550 5.7.1 Sender not owned\r\n");
    turns.extend(authenticated_send_turns());
    turns.push(Turn::Close);
    let server = ScriptedServer::start(turns).await;

    let (config, fixture) = (server.config(), Fixture::default());
    let report = scenario::smtp_auth(&config, &fixture, Mechanism::Login).await;
    assert!(report.passed, "{report}");
    server.finish().await;
}

#[tokio::test]
async fn test_open_relay_fails_scenario() {
    let mut turns = auth_turns(Mechanism::Plain, "250 OK queued\r\n");
    turns.push(Turn::Hold);
    let server = ScriptedServer::start(turns).await;

    let (config, fixture) = (server.config(), Fixture::default());
    let report = scenario::smtp_auth(&config, &fixture, Mechanism::Plain).await;
    assert!(!report.passed);
    let message = report.message.unwrap();
    assert!(
        message.starts_with("end of data: expected 550"),
        "{message}"
    );
    server.finish().await;
}

#[tokio::test]
async fn test_invalid_credentials_accepted_fails_scenario() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("EHLO localhost\r\n"),
        Turn::Send("250 localhost\r\n"),
        Turn::Recv("AUTH PLAIN bWFnbWEAbWFnbWEAaW52YWxpZHBhc3N3b3Jk\r\n"),
        Turn::Send("235 2.7.0 Authentication successful\r\n"),
        Turn::Hold,
    ])
    .await;

    let (config, fixture) = (server.config(), Fixture::default());
    let report = scenario::smtp_auth(&config, &fixture, Mechanism::Plain).await;
    assert!(!report.passed);
    let message = report.message.unwrap();
    assert_eq!(
        message,
        "AUTH PLAIN: server accepted a request it should have refused"
    );
    server.finish().await;
}

#[tokio::test]
async fn test_relay_reply_codes() {
    let server = ScriptedServer::start(vec![
        Turn::Send(BANNER),
        Turn::Recv("MAIL FROM: <ladar@lavabit.com>\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("RCPT TO: <princess@example.com>\r\n"),
        Turn::Send("250 OK\r\n"),
        Turn::Recv("DATA\r\n"),
        Turn::Send("354 Start mail input\r\n"),
        Turn::Recv(".\r\n"),
        Turn::Send("550 5.7.1 Sender not owned\r\n"),
        Turn::Hold,
    ])
    .await;

    let mut smtp = SmtpExchange::connect(&server.config()).await.unwrap();
    smtp.greeting().await.unwrap();
    let reply = smtp
        .mail_rcpt_data("ladar@lavabit.com", "princess@example.com")
        .await
        .unwrap();
    assert_eq!(reply.token_str(), "354");
    let reply = smtp.end_data(ReplyCode::MAILBOX_UNAVAILABLE).await.unwrap();
    assert_eq!(reply.token_str(), "550");

    smtp.close().await;
    server.finish().await;
}
