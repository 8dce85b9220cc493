use crate::proxy::{ProxyError, ProxyResult};
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tokio::net::TcpStream;

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_ATTEMPTS: usize = 200;

/// Returns true if something accepts connections on `address:port`
pub async fn port_in_use(address: &str, port: u16) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((address, port))).await,
        Ok(Ok(_))
    )
}

/// Picks a random port in `start..=end` that refuses a connection
///
/// Ports in `taken` are never returned, so two calls can reserve distinct
/// ports before either is bound.
pub async fn find_free_port(
    address: &str,
    start: u16,
    end: u16,
    taken: &HashSet<u16>,
) -> ProxyResult<u16> {
    for _ in 0..MAX_ATTEMPTS {
        let candidate = rand::thread_rng().gen_range(start..=end);
        if taken.contains(&candidate) {
            continue;
        }
        if port_in_use(address, candidate).await {
            tracing::trace!("Port {} is busy", candidate);
            continue;
        }
        return Ok(candidate);
    }

    Err(ProxyError::NoFreePort {
        start,
        end,
        attempts: MAX_ATTEMPTS,
    })
}
