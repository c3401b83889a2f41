//! Transport addresses
//!
//! An [`Endpoint`] is one end of a message socket: a host and a port.
//! Configuration strings accept `host:port`, `host/port` (the `/` form is
//! required for unbracketed IPv6 literals) and `[v6]:port`. Resolution
//! normalizes the host to a canonical numeric form: plain dotted-quad for
//! IPv4, bracketed for IPv6.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize, de};
use tokio::net::lookup_host;

use crate::error::{Error, Result};

/// A transport address identifying one end of a message socket.
///
/// Immutable once resolved. The `Display` form is the canonical wire form:
/// `host:port` with IPv6 hosts bracketed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint string without resolving the host.
    ///
    /// A `/` separates host and port when present; otherwise a single `:` is
    /// accepted for hostnames and IPv4 literals, and `[v6]:port` for
    /// bracketed IPv6 literals.
    pub fn parse(s: &str) -> Result<Self> {
        let (host, port) = split_host_port(s)?;

        let port: u16 = port
            .parse()
            .map_err(|_| Error::Transport(format!("invalid port in endpoint: {s}")))?;

        Ok(Self {
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
        })
    }

    /// Parse and resolve an endpoint string to its canonical numeric form.
    pub async fn resolve(s: &str) -> Result<Self> {
        let endpoint = Self::parse(s)?;

        // lookup_host needs a well-formed host:port pair; rebracket IPv6
        let query = format!("{endpoint}");

        let mut addrs = lookup_host(query)
            .await
            .map_err(|e| Error::Transport(format!("unable to resolve address for {s}: {e}")))?;

        match addrs.next() {
            Some(addr) => Ok(Self::from(addr)),
            None => Err(Error::Transport(format!(
                "unable to resolve address for {s}: no addresses"
            ))),
        }
    }

    /// Resolve this endpoint's host to its canonical numeric form.
    ///
    /// Already-numeric hosts pass through untouched, so resolution is safe
    /// to apply to every configured endpoint.
    pub async fn resolved(&self) -> Result<Self> {
        if self.ip().is_some() {
            return Ok(self.clone());
        }

        Self::resolve(&self.to_string()).await
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection target as `(host, port)` suitable for `TcpStream::connect`.
    pub fn connect_pair(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

fn split_host_port(s: &str) -> Result<(&str, &str)> {
    if let Some(stripped) = s.strip_prefix('[') {
        // bracketed IPv6: [addr]:port
        if let Some(pos) = stripped.find("]:") {
            return Ok((&stripped[..pos], &stripped[pos + 2..]));
        }

        return Err(Error::Transport(format!("invalid endpoint format: {s}")));
    }

    if let Some(pos) = s.rfind('/') {
        return Ok((&s[..pos], &s[pos + 1..]));
    }

    if s.chars().filter(|c| *c == ':').count() == 1 {
        let pos = s.rfind(':').unwrap();
        return Ok((&s[..pos], &s[pos + 1..]));
    }

    Err(Error::Transport(format!("invalid endpoint format: {s}")))
}

impl std::str::FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Serialize for Endpoint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Endpoint::parse(&s).map_err(de::Error::custom)
    }
}

impl Endpoint {
    /// Host IP if the host is already numeric.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_ipv4_colon_form() {
        let ep = Endpoint::parse("127.0.0.1:9001").unwrap();
        assert_eq!(ep.host(), "127.0.0.1");
        assert_eq!(ep.port(), 9001);
        assert_eq!(ep.to_string(), "127.0.0.1:9001");
    }

    #[test]
    fn parses_slash_form_for_ipv6() {
        let ep = Endpoint::parse("fe80::1/8001").unwrap();
        assert_eq!(ep.host(), "fe80::1");
        assert_eq!(ep.to_string(), "[fe80::1]:8001");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let ep = Endpoint::parse("[::1]:8001").unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.port(), 8001);
        assert_eq!(ep.to_string(), "[::1]:8001");
    }

    #[test]
    fn rejects_missing_port() {
        assert_matches!(Endpoint::parse("localhost"), Err(Error::Transport(_)));
        // two colons without slash or brackets is ambiguous
        assert_matches!(Endpoint::parse("fe80::1:8001"), Err(Error::Transport(_)));
    }

    #[test]
    fn rejects_bad_port() {
        assert_matches!(Endpoint::parse("host:notaport"), Err(Error::Transport(_)));
        assert_matches!(Endpoint::parse("host:70000"), Err(Error::Transport(_)));
    }

    #[test]
    fn serde_round_trips_as_string() {
        let ep = Endpoint::parse("127.0.0.1:4455").unwrap();
        let json = serde_json::to_string(&ep).unwrap();
        assert_eq!(json, "\"127.0.0.1:4455\"");
        let back: Endpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ep);
    }

    #[tokio::test]
    async fn resolves_localhost() {
        let ep = Endpoint::resolve("localhost:5000").await.unwrap();
        assert!(ep.ip().is_some());
        assert_eq!(ep.port(), 5000);
    }

    #[tokio::test]
    async fn resolved_normalizes_hostnames_and_keeps_numeric_hosts() {
        let ep = Endpoint::new("localhost", 5000).resolved().await.unwrap();
        assert!(ep.ip().is_some());
        assert_eq!(ep.port(), 5000);

        let numeric = Endpoint::new("127.0.0.1", 5000);
        assert_eq!(numeric.resolved().await.unwrap(), numeric);
    }
}
