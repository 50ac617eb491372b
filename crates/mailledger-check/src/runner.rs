//! Concurrent scenario execution.

use std::sync::Arc;

use mailledger_exchange::{Fixture, Scenario, ScenarioReport};
use mailledger_transport::Config;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Runs `sessions` independent copies of each planned scenario.
///
/// Copies of one scenario run concurrently on separate tasks, each with its
/// own session; scenarios themselves run one after another. Reports come
/// back in plan order.
pub async fn run(
    plan: Vec<(Scenario, Config)>,
    fixture: Fixture,
    sessions: u32,
) -> Vec<ScenarioReport> {
    let fixture = Arc::new(fixture);
    let mut reports = Vec::new();

    for (scenario, config) in plan {
        let config = Arc::new(config);
        debug!(%scenario, host = %config.host, port = config.port, sessions, "starting");

        let handles: Vec<JoinHandle<ScenarioReport>> = (0..sessions)
            .map(|_| {
                let config = Arc::clone(&config);
                let fixture = Arc::clone(&fixture);
                tokio::spawn(async move { scenario.run(&config, &fixture).await })
            })
            .collect();

        for handle in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    error!(%scenario, error = %e, "scenario task failed");
                    ScenarioReport {
                        name: scenario.name().to_string(),
                        passed: false,
                        message: Some(format!("task failed: {e}")),
                        elapsed_ms: 0,
                    }
                }
            };
            reports.push(report);
        }
    }

    reports
}

/// Counts passed and failed reports.
pub fn tally(reports: &[ScenarioReport]) -> (usize, usize) {
    let passed = reports.iter().filter(|r| r.passed).count();
    (passed, reports.len() - passed)
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
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_each_session_reports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::builder("127.0.0.1").port(port).build();
        let plan = vec![
            (Scenario::SmtpBasic, config.clone()),
            (Scenario::ImapBasic, config),
        ];
        let reports = run(plan, Fixture::default(), 3).await;

        assert_eq!(reports.len(), 6);
        assert!(reports[..3].iter().all(|r| r.name == "smtp-basic"));
        assert!(reports[3..].iter().all(|r| r.name == "imap-basic"));
        assert_eq!(tally(&reports), (0, 6));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Every connection gets a banner without the ESMTP marker.
        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let (mut socket, _) = listener.accept().await.unwrap();
                let _ = socket.write_all(b"220 plain SMTP\r\n").await;
                let _ = socket.shutdown().await;
            }
        });

        let config = Config::builder("127.0.0.1").port(port).build();
        let plan = vec![(Scenario::SmtpBasic, config)];
        let reports = run(plan, Fixture::default(), 2).await;
        server.await.unwrap();

        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert!(!report.passed);
            assert!(report.message.as_deref().unwrap().starts_with("greeting: "));
        }
    }

    #[test]
    fn test_tally() {
        let report = |passed| ScenarioReport {
            name: "smtp-basic".to_string(),
            passed,
            message: None,
            elapsed_ms: 1,
        };
        assert_eq!(tally(&[report(true), report(false), report(true)]), (2, 1));
        assert_eq!(tally(&[]), (0, 0));
    }
}
