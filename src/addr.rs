// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Address resolution and normalization
//!
//! Endpoint addresses use the `scheme://host:port` form with scheme one of
//! `tcp`, `ipc`, `inproc`. For `tcp`, the host may be a hostname (resolved
//! to an IP here, so the transport never sees unresolved names), a literal
//! IP, or a wildcard (`*`, empty, `0.0.0.0`). A port of `0` or a missing
//! port requests an ephemeral port probed from the OS.

use std::net::{IpAddr, TcpListener, ToSocketAddrs};

use crate::common::{SocketError, SocketResult};

/// Transport scheme of a parsed address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Ipc,
    Inproc,
}

/// A decomposed endpoint address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub scheme: Scheme,
    /// Hostname, literal IP or wildcard for `tcp`; path/name for `ipc`/`inproc`
    pub host: String,
    /// Only meaningful for `tcp`; `None` or `Some(0)` requests an ephemeral port
    pub port: Option<u16>,
}

/// Split an address string into scheme, host and port.
pub fn parse_address(address: &str) -> SocketResult<ParsedAddress> {
    let (scheme, rest) = address
        .split_once("://")
        .ok_or_else(|| invalid(address, "missing scheme separator"))?;

    let scheme = match scheme {
        "tcp" => Scheme::Tcp,
        "ipc" => Scheme::Ipc,
        "inproc" => Scheme::Inproc,
        other => return Err(invalid(address, &format!("unsupported scheme '{other}'"))),
    };

    if scheme != Scheme::Tcp {
        if rest.is_empty() {
            return Err(invalid(address, "empty endpoint name"));
        }
        return Ok(ParsedAddress {
            scheme,
            host: rest.to_string(),
            port: None,
        });
    }

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, "")) => (host, None),
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| invalid(address, &format!("invalid port '{port}'")))?;
            (host, Some(port))
        }
        None => (rest, None),
    };

    Ok(ParsedAddress {
        scheme,
        host: host.to_string(),
        port,
    })
}

/// Resolve a hostname to an IP address string.
///
/// Literal IPs and wildcards pass through untouched; a name that cannot be
/// resolved is returned as-is and left for the transport to reject.
pub fn resolve_hostname(host: &str) -> String {
    if host.is_empty() || host == "*" || host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }

    match (host, 0u16).to_socket_addrs() {
        Ok(addrs) => {
            let addrs: Vec<_> = addrs.collect();
            addrs
                .iter()
                .find(|a| a.is_ipv4())
                .or_else(|| addrs.first())
                .map(|a| a.ip().to_string())
                .unwrap_or_else(|| host.to_string())
        }
        Err(_) => host.to_string(),
    }
}

/// Rewrite the host of a `tcp://` address to its resolved IP.
///
/// Non-tcp and unparseable addresses are returned unchanged.
pub fn fix_tcp_address(address: &str) -> String {
    match parse_address(address) {
        Ok(parsed) if parsed.scheme == Scheme::Tcp => {
            let host = resolve_hostname(&parsed.host);
            match parsed.port {
                Some(port) => format!("tcp://{host}:{port}"),
                None => format!("tcp://{host}"),
            }
        }
        _ => address.to_string(),
    }
}

/// Extract the host part of a `tcp://` address, if there is one.
pub fn extract_tcp_host(address: &str) -> Option<String> {
    match parse_address(address) {
        Ok(parsed) if parsed.scheme == Scheme::Tcp && !parsed.host.is_empty() => Some(parsed.host),
        _ => None,
    }
}

/// Probe the OS for a TCP port that is currently free.
///
/// The port is discovered by binding a throwaway listener, never by
/// counting in memory, so concurrent callers in one process cannot hand
/// out the same port from a stale counter.
pub fn get_free_tcp_port() -> SocketResult<u16> {
    let listener = TcpListener::bind(("0.0.0.0", 0))?;
    let port = listener.local_addr()?.port();
    Ok(port)
}

/// A wildcard bind address on a freshly probed ephemeral port.
pub fn get_default_bind_address() -> SocketResult<String> {
    Ok(format!("tcp://0.0.0.0:{}", get_free_tcp_port()?))
}

/// Normalize an address for binding.
///
/// Returns the concrete address handed to the transport plus whether an
/// ephemeral port was synthesized for it (which permits exactly one bind
/// retry with a fresh port).
pub(crate) fn prepare_bind_address(address: &str) -> SocketResult<(String, bool)> {
    let parsed = parse_address(address)?;

    if parsed.scheme != Scheme::Tcp {
        return Ok((address.to_string(), false));
    }

    let host = if parsed.host.is_empty() || parsed.host == "*" {
        "0.0.0.0".to_string()
    } else {
        resolve_hostname(&parsed.host)
    };

    match parsed.port {
        Some(port) if port != 0 => Ok((format!("tcp://{host}:{port}"), false)),
        _ => {
            let port = get_free_tcp_port()?;
            Ok((format!("tcp://{host}:{port}"), true))
        }
    }
}

/// Whether an address asks for an ephemeral port (tcp with port `0` or
/// no port at all).
pub(crate) fn is_ephemeral_request(address: &str) -> bool {
    matches!(
        parse_address(address),
        Ok(ParsedAddress {
            scheme: Scheme::Tcp,
            port: None | Some(0),
            ..
        })
    )
}

/// Normalize an address for connecting.
pub(crate) fn prepare_connect_address(address: &str) -> SocketResult<String> {
    let parsed = parse_address(address)?;

    if parsed.scheme != Scheme::Tcp {
        return Ok(address.to_string());
    }

    if parsed.host.is_empty() || parsed.host == "*" {
        return Err(invalid(address, "cannot connect to a wildcard host"));
    }

    let host = resolve_hostname(&parsed.host);
    match parsed.port {
        Some(port) if port != 0 => Ok(format!("tcp://{host}:{port}")),
        _ => Err(invalid(address, "tcp connect requires an explicit port")),
    }
}

fn invalid(address: &str, reason: &str) -> SocketError {
    SocketError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    }
}
