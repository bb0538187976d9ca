//! Free-port search for the engine's REST endpoint.

use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

/// Outcome of probing a single port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortProbe {
	/// Something accepted the connection.
	Listening,
	/// The connection was refused, so the port is free.
	Refused,
	/// The probe failed in some other way.
	Failed(String),
}

/// Returns the first port `>= start` on `host` that refuses connections.
///
/// `host` may carry a scheme (`http://localhost`). An unexpected probe failure
/// is logged and `start` is returned unchanged.
pub fn find_open_port(host: &str, start: u16) -> Result<u16> {
	let host = strip_scheme(host);
	find_open_port_with(start, |port| probe_port(host, port))
}

/// Port search with a caller-supplied probe.
pub fn find_open_port_with<F>(start: u16, mut probe: F) -> Result<u16>
where
	F: FnMut(u16) -> PortProbe,
{
	for port in start..=u16::MAX {
		match probe(port) {
			PortProbe::Refused => {
				debug!(target: "ep.runtime", port, "port is free");
				return Ok(port);
			}
			PortProbe::Listening => {
				debug!(target: "ep.runtime", port, "port is in use");
			}
			PortProbe::Failed(reason) => {
				warn!(
					target: "ep.runtime",
					port,
					%reason,
					"port probe failed; keeping requested port {start}"
				);
				return Ok(start);
			}
		}
	}

	Err(Error::NoOpenPort { start })
}

/// Attempts one TCP connection to `host:port`.
pub fn probe_port(host: &str, port: u16) -> PortProbe {
	let addrs = match (host, port).to_socket_addrs() {
		Ok(addrs) => addrs,
		Err(e) => return PortProbe::Failed(e.to_string()),
	};

	let mut last_failure = None;
	for addr in addrs {
		match TcpStream::connect_timeout(&addr, PROBE_TIMEOUT) {
			Ok(_) => return PortProbe::Listening,
			Err(e) if e.kind() == ErrorKind::ConnectionRefused => {}
			Err(e) => last_failure = Some(e.to_string()),
		}
	}

	match last_failure {
		Some(reason) => PortProbe::Failed(reason),
		None => PortProbe::Refused,
	}
}

fn strip_scheme(host: &str) -> &str {
	let host = host.split_once("://").map_or(host, |(_, rest)| rest);
	host.trim_end_matches('/')
}
