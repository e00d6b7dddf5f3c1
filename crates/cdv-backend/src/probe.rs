//! Liveness probe for the local completion endpoint.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// How long a single connect attempt may take.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Returns true if something accepts TCP connections at `host:port`.
///
/// Hosts that fail to resolve count as not listening.
pub fn is_listening(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::debug!(host, port, error = %e, "probe: address did not resolve");
            return false;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return true,
            Err(e) => tracing::debug!(%addr, error = %e, "probe: connect failed"),
        }
    }
    false
}
