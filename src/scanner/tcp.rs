use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::trace;

/// Check TCP reachability of one (host, port) pair.
///
/// Returns `true` only when the connect completes inside `limit`. Refused,
/// unreachable and timed-out attempts all report `false`. The stream is
/// dropped, and so closed, before this returns.
pub async fn probe_port(target: IpAddr, port: u16, limit: Duration) -> bool {
    let addr = SocketAddr::new(target, port);

    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            trace!(%addr, "connect failed: {}", e);
            false
        }
        Err(_) => {
            trace!(%addr, "connect timed out");
            false
        }
    }
}
