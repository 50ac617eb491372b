//! Address resolution and connection establishment.

use std::io;
use std::net::{IpAddr, SocketAddr};

use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, warn};

use crate::config::Config;
use crate::session::TransportSession;
use crate::{Error, Result};

/// Resolves `host:port` to candidate stream addresses, in resolver order.
///
/// Both address families are accepted. The port is always numeric, so no
/// service-name lookup takes place.
///
/// # Errors
///
/// Returns [`Error::Resolution`] if the lookup fails or yields nothing.
pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let candidates: Vec<SocketAddr> = match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => addrs.collect(),
        Err(source) => {
            debug!(host, port, error = %source, "unable to resolve host");
            return Err(Error::Resolution {
                host: host.to_string(),
                port,
                source,
            });
        }
    };

    if candidates.is_empty() {
        debug!(host, port, "resolver returned no stream addresses");
        return Err(Error::Resolution {
            host: host.to_string(),
            port,
            source: io::Error::new(io::ErrorKind::NotFound, "no stream addresses"),
        });
    }

    Ok(candidates)
}

/// Connects to `host:port` and returns a session in the connected state.
///
/// Candidates are tried in resolver order and the first one that accepts
/// wins. A socket whose connect fails is closed before the next candidate is
/// tried. No read/write timeouts are applied; see [`connect_with`].
///
/// # Errors
///
/// Returns [`Error::Resolution`] if the host cannot be resolved,
/// [`Error::Unreachable`] if no candidate accepts the connection, and
/// [`Error::Allocation`] if the session buffer cannot be allocated (the
/// connected socket is closed on that path).
pub async fn connect(host: &str, port: u16) -> Result<TransportSession> {
    let candidates = resolve(host, port).await?;
    let (tcp, peer_ip) = dial(host, port, &candidates).await?;
    TransportSession::from_connected(host, tcp, peer_ip)
}

/// Connects using a [`Config`]: applies its timeouts and verification policy,
/// and establishes TLS right away for implicit-TLS configurations.
///
/// # Errors
///
/// Returns any error from [`connect`] or [`TransportSession::secure`].
pub async fn connect_with(config: &Config) -> Result<TransportSession> {
    let mut session = connect(&config.host, config.port).await?;
    session.set_timeouts(config.read_timeout, config.write_timeout);
    session.set_verification(config.verification);

    if config.security.is_tls() {
        session.secure().await?;
    }

    Ok(session)
}

/// Tries each candidate in order until one connects.
async fn dial(host: &str, port: u16, candidates: &[SocketAddr]) -> Result<(TcpStream, IpAddr)> {
    for addr in candidates {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        };
        let socket = match socket {
            Ok(socket) => socket,
            Err(e) => {
                warn!(host, port, error = %e, "unable to create a socket");
                return Err(Error::Io(e));
            }
        };

        debug!(%addr, "connecting");
        match socket.connect(*addr).await {
            Ok(stream) => {
                debug!(host, peer = %addr.ip(), "connected");
                return Ok((stream, addr.ip()));
            }
            Err(e) => debug!(%addr, error = %e, "connect attempt failed"),
        }
    }

    warn!(host, port, attempts = candidates.len(), "unable to connect");
    Err(Error::Unreachable {
        host: host.to_string(),
        port,
        attempts: candidates.len(),
    })
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
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_resolve_numeric_host() {
        let addrs = resolve("127.0.0.1", 2525).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:2525".parse::<SocketAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_resolve_ipv6_literal() {
        let addrs = resolve("::1", 143).await.unwrap();
        assert_eq!(addrs.len(), 1);
        assert!(addrs[0].is_ipv6());
    }

    #[tokio::test]
    async fn test_first_reachable_candidate_wins() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = closed.local_addr().unwrap();
        drop(closed);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = listener.local_addr().unwrap();

        let (stream, ip) = dial("localhost", live.port(), &[dead, live]).await.unwrap();
        assert_eq!(ip, live.ip());
        assert_eq!(stream.peer_addr().unwrap(), live);
    }

    #[tokio::test]
    async fn test_all_candidates_refused() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = closed.local_addr().unwrap();
        drop(closed);

        let err = dial("localhost", dead.port(), &[dead, dead]).await.unwrap_err();
        assert!(matches!(err, Error::Unreachable { attempts: 2, .. }));
    }
}
