//! Listener prefixes and the endpoint allow-list
//!
//! A prefix names where the server listens: `http://<host>[:<port>][/<path>]`.
//! The host may be `*` or `+` (every interface), `localhost`, an IP literal,
//! or a DNS name, which is served on every interface.
//!
//! "Every interface" means every IPv4 interface: wildcard and DNS-name hosts
//! bind `0.0.0.0`. IPv6 clients are reached with an explicit `[::]` (or other
//! IPv6 literal) prefix. Prefixes with a specific host on a port that also
//! has an unspecified-address prefix share that listener and still filter by
//! path.

use crate::error::StartupError;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

const DEFAULT_PORT: u16 = 80;

/// Host part of a listener prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    /// `*` or `+`
    Wildcard(char),
    Localhost,
    Ip(IpAddr),
    Name(String),
}

impl HostPattern {
    /// Address to bind for this host. Wildcards and names map to IPv4 `0.0.0.0`.
    fn bind_ip(&self) -> IpAddr {
        match self {
            Self::Wildcard(_) | Self::Name(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Self::Localhost => IpAddr::V4(Ipv4Addr::LOCALHOST),
            Self::Ip(ip) => *ip,
        }
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard(c) => write!(f, "{c}"),
            Self::Localhost => f.write_str("localhost"),
            Self::Ip(IpAddr::V6(ip)) => write!(f, "[{ip}]"),
            Self::Ip(ip) => write!(f, "{ip}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// A parsed, normalised listener prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerPrefix {
    host: HostPattern,
    port: u16,
    path: String,
}

impl ListenerPrefix {
    /// Parse a prefix string.
    ///
    /// ```
    /// use tinyserve::server::ListenerPrefix;
    ///
    /// let prefix = ListenerPrefix::parse("http://*:8080/media").unwrap();
    /// assert_eq!(prefix.to_string(), "http://*:8080/media/");
    /// assert_eq!(prefix.socket_addr().to_string(), "0.0.0.0:8080");
    /// ```
    pub fn parse(input: &str) -> Result<Self, StartupError> {
        let invalid = |reason: &str| StartupError::InvalidPrefix {
            prefix: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("https://") {
            return Err(invalid("https is not supported"));
        }
        if !lower.starts_with("http://") {
            return Err(invalid("scheme must be http://"));
        }
        let rest = &trimmed["http://".len()..];

        let (authority, path) = rest
            .find('/')
            .map_or((rest, ""), |idx| (&rest[..idx], &rest[idx..]));

        let (host, port) =
            split_authority(authority).ok_or_else(|| invalid("malformed host or port"))?;
        let host = parse_host(host).ok_or_else(|| invalid("malformed host"))?;
        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid("malformed port"))?,
            None => DEFAULT_PORT,
        };

        if path.contains(['?', '#']) {
            return Err(invalid("query and fragment are not allowed"));
        }

        Ok(Self {
            host,
            port,
            path: normalize_path(path),
        })
    }

    pub const fn host(&self) -> &HostPattern {
        &self.host
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Always starts and ends with `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Address the listener for this prefix binds to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host.bind_ip(), self.port)
    }

    /// Same prefix with a different port, used when binding port 0
    #[must_use]
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    /// Whether a request path falls under this prefix
    pub fn matches_path(&self, request_path: &str) -> bool {
        request_path.starts_with(&self.path)
            || request_path.len() + 1 == self.path.len() && self.path.starts_with(request_path)
    }
}

impl FromStr for ListenerPrefix {
    type Err = StartupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ListenerPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.path)
    }
}

/// Split `host[:port]`, honouring bracketed IPv6 literals
fn split_authority(authority: &str) -> Option<(&str, Option<&str>)> {
    if authority.is_empty() {
        return None;
    }
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        return match after {
            "" => Some((host, None)),
            _ => after.strip_prefix(':').map(|port| (host, Some(port))),
        };
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => Some((host, Some(port))),
        Some(_) => None,
        None => Some((authority, None)),
    }
}

fn parse_host(host: &str) -> Option<HostPattern> {
    match host {
        "" => None,
        "*" => Some(HostPattern::Wildcard('*')),
        "+" => Some(HostPattern::Wildcard('+')),
        h if h.eq_ignore_ascii_case("localhost") => Some(HostPattern::Localhost),
        h => {
            if let Ok(ip) = h.parse::<IpAddr>() {
                return Some(HostPattern::Ip(ip));
            }
            let valid = h.split('.').all(|label| {
                !label.is_empty()
                    && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
            });
            valid.then(|| HostPattern::Name(h.to_ascii_lowercase()))
        }
    }
}

fn normalize_path(path: &str) -> String {
    let inner = path.trim_matches('/');
    if inner.is_empty() {
        "/".to_string()
    } else {
        format!("/{inner}/")
    }
}

/// One allow-list entry: an address, optionally pinned to a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRule {
    Ip(IpAddr),
    Socket(SocketAddr),
}

impl EndpointRule {
    pub fn parse(input: &str) -> Result<Self, StartupError> {
        let input = input.trim();
        if let Ok(addr) = input.parse::<SocketAddr>() {
            return Ok(Self::Socket(addr));
        }
        input
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(Self::Ip)
            .map_err(|_| StartupError::InvalidEndpoint(input.to_string()))
    }

    pub fn matches(&self, local: SocketAddr) -> bool {
        match self {
            Self::Ip(ip) => *ip == local.ip(),
            Self::Socket(addr) => *addr == local,
        }
    }
}

/// Local endpoints allowed to reach the handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointFilter {
    rules: Vec<EndpointRule>,
}

impl EndpointFilter {
    /// Parse every entry. An empty list yields `None`: nothing is filtered.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Option<Self>, StartupError> {
        if entries.is_empty() {
            return Ok(None);
        }
        let rules = entries
            .iter()
            .map(|entry| EndpointRule::parse(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Self { rules }))
    }

    pub fn allows(&self, local: SocketAddr) -> bool {
        self.rules.iter().any(|rule| rule.matches(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix(s: &str) -> ListenerPrefix {
        ListenerPrefix::parse(s).unwrap()
    }

    #[test]
    fn test_parse_wildcards() {
        let p = prefix("http://*:8080/");
        assert_eq!(p.host(), &HostPattern::Wildcard('*'));
        assert_eq!(p.socket_addr(), "0.0.0.0:8080".parse().unwrap());

        let p = prefix("http://+:9000");
        assert_eq!(p.path(), "/");
        assert_eq!(p.to_string(), "http://+:9000/");
    }

    #[test]
    fn test_wildcard_binds_ipv4_only() {
        assert!(prefix("http://*:8080/").socket_addr().is_ipv4());
        assert!(prefix("http://media.example.com:8080/").socket_addr().is_ipv4());

        let v6 = prefix("http://[::]:8080/");
        assert_eq!(v6.socket_addr(), "[::]:8080".parse().unwrap());
        assert!(v6.socket_addr().ip().is_unspecified());
    }

    #[test]
    fn test_parse_hosts() {
        assert_eq!(
            prefix("http://localhost:3000/").socket_addr(),
            "127.0.0.1:3000".parse().unwrap()
        );
        assert_eq!(prefix("http://LocalHost/").port(), 80);
        assert_eq!(prefix("http://10.0.0.5:81/").socket_addr(), "10.0.0.5:81".parse().unwrap());
        assert_eq!(prefix("http://[::1]:8080/").socket_addr(), "[::1]:8080".parse().unwrap());
        assert_eq!(prefix("http://[::1]:8080/").to_string(), "http://[::1]:8080/");
        assert_eq!(
            prefix("http://media.example.com:8080/").socket_addr(),
            "0.0.0.0:8080".parse().unwrap()
        );
    }

    #[test]
    fn test_path_normalised() {
        assert_eq!(prefix("http://*:80/media").path(), "/media/");
        assert_eq!(prefix("http://*:80/media/").path(), "/media/");
        assert_eq!(prefix("http://*:80//a/b//").path(), "/a/b/");
    }

    #[test]
    fn test_invalid_prefixes() {
        for bad in [
            "https://*:443/",
            "ftp://*:21/",
            "*:8080",
            "http://",
            "http://:8080/",
            "http://*:http/",
            "http://*:70000/",
            "http://bad host:80/",
            "http://[::1/",
            "http://*:80/a?b",
        ] {
            assert!(
                matches!(ListenerPrefix::parse(bad), Err(StartupError::InvalidPrefix { .. })),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_matches_path() {
        let root = prefix("http://*:80/");
        assert!(root.matches_path("/"));
        assert!(root.matches_path("/anything/else"));

        let media = prefix("http://*:80/media/");
        assert!(media.matches_path("/media/"));
        assert!(media.matches_path("/media"));
        assert!(media.matches_path("/media/clip.mp4"));
        assert!(!media.matches_path("/mediafile"));
        assert!(!media.matches_path("/other/"));
    }

    #[test]
    fn test_endpoint_filter() {
        let filter = EndpointFilter::parse(&["127.0.0.1:8080", "::1"]).unwrap().unwrap();
        assert!(filter.allows("127.0.0.1:8080".parse().unwrap()));
        assert!(!filter.allows("127.0.0.1:8081".parse().unwrap()));
        assert!(filter.allows("[::1]:1234".parse().unwrap()));
        assert!(!filter.allows("10.0.0.1:8080".parse().unwrap()));
    }

    #[test]
    fn test_endpoint_filter_empty_and_invalid() {
        assert_eq!(EndpointFilter::parse::<&str>(&[]).unwrap(), None);
        assert!(matches!(
            EndpointFilter::parse(&["not-an-ip"]),
            Err(StartupError::InvalidEndpoint(_))
        ));
    }
}
