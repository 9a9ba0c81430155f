//! Listener binding
//!
//! Prefixes that resolve to the same socket address share one listener.
//! Sockets are created through `socket2` so the backlog is configurable.

use super::prefix::ListenerPrefix;
use crate::error::StartupError;
use crate::logger;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// A bound socket together with the prefixes it serves
#[derive(Debug)]
pub struct BoundListener {
    pub listener: TcpListener,
    pub local_addr: SocketAddr,
    pub prefixes: Vec<ListenerPrefix>,
}

/// Create a `TcpListener` with `SO_REUSEADDR` enabled.
///
/// `SO_REUSEADDR` lets a restarted server bind a port still in `TIME_WAIT`;
/// it does not allow two live listeners on the same port.
///
/// # Arguments
///
/// * `addr` - The socket address to bind to
/// * `backlog` - Length of the kernel accept queue
///
/// # Returns
///
/// * `Ok(TcpListener)` - Successfully created and bound listener
/// * `Err(std::io::Error)` - Failed to create or bind socket
pub fn create_reusable_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Bind one listener per distinct socket address.
///
/// Must run inside a tokio runtime. A prefix with port 0 is rewritten to the
/// port the OS picked.
pub fn bind_prefixes(
    prefixes: &[ListenerPrefix],
    backlog: i32,
) -> Result<Vec<BoundListener>, StartupError> {
    if prefixes.is_empty() {
        return Err(StartupError::NoPrefixes);
    }

    let mut groups: Vec<(SocketAddr, Vec<ListenerPrefix>)> = Vec::new();
    for prefix in prefixes {
        let addr = listener_addr(prefix, prefixes);
        match groups.iter_mut().find(|(a, _)| *a == addr) {
            Some((_, members)) => members.push(prefix.clone()),
            None => groups.push((addr, vec![prefix.clone()])),
        }
    }

    groups
        .into_iter()
        .map(|(addr, members)| {
            let listener = create_reusable_listener(addr, backlog)
                .map_err(|e| bind_error(addr, &members[0], e))?;
            let local_addr = listener
                .local_addr()
                .map_err(|source| StartupError::Bind { addr, source })?;
            let prefixes = members
                .into_iter()
                .map(|p| {
                    if p.port() == 0 {
                        p.with_port(local_addr.port())
                    } else {
                        p
                    }
                })
                .collect::<Vec<_>>();

            logger::log_listener_bound(&local_addr, &prefixes);
            Ok(BoundListener {
                listener,
                local_addr,
                prefixes,
            })
        })
        .collect()
}

/// Address of the listener that serves `prefix`.
///
/// A port bound on the unspecified address already receives connections
/// for every host, so host-specific prefixes on that port join it instead
/// of binding their own socket.
fn listener_addr(prefix: &ListenerPrefix, all: &[ListenerPrefix]) -> SocketAddr {
    all.iter()
        .map(ListenerPrefix::socket_addr)
        .find(|addr| addr.port() == prefix.port() && addr.ip().is_unspecified())
        .unwrap_or_else(|| prefix.socket_addr())
}

fn bind_error(addr: SocketAddr, prefix: &ListenerPrefix, source: io::Error) -> StartupError {
    if source.kind() == io::ErrorKind::PermissionDenied {
        StartupError::Permission {
            prefix: prefix.to_string(),
            command: remediation_command(prefix),
        }
    } else {
        StartupError::Bind { addr, source }
    }
}

/// Privileged command that lets this process bind `prefix`
#[cfg(not(windows))]
fn remediation_command(_prefix: &ListenerPrefix) -> String {
    let exe = std::env::current_exe()
        .map_or_else(|_| "<executable>".to_string(), |p| p.display().to_string());
    format!("sudo setcap 'cap_net_bind_service=+ep' {exe}")
}

#[cfg(windows)]
fn remediation_command(prefix: &ListenerPrefix) -> String {
    let user = std::env::var("USERNAME").unwrap_or_else(|_| "Everyone".to_string());
    format!("netsh http add urlacl url={prefix} user={user}")
}
