//! Remote database addresses.

use crate::error::{ReplError, ReplResult};
use std::fmt;

/// A parsed remote URL (`scheme://host[:port]/path`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// Lowercase scheme (`ws`, `wss`, `http`, `https`).
    pub scheme: String,
    /// Lowercase host name.
    pub hostname: String,
    /// Port; the scheme's default when the URL omits it.
    pub port: u16,
    /// Path, always starting with `/`.
    pub path: String,
}

impl Address {
    /// Parses a URL.
    ///
    /// # Errors
    ///
    /// Returns [`ReplError::InvalidInput`] for an unknown scheme, an empty
    /// host or a bad port.
    pub fn parse(url: &str) -> ReplResult<Self> {
        let invalid = |why: &str| ReplError::InvalidInput(format!("{}: {:?}", why, url));

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let scheme = scheme.to_ascii_lowercase();
        let default_port = match scheme.as_str() {
            "ws" | "http" => 80,
            "wss" | "https" => 443,
            _ => return Err(invalid("unsupported scheme")),
        };

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>().map_err(|_| invalid("bad port"))?,
            ),
            None => (authority, default_port),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        Ok(Self {
            scheme,
            hostname: host.to_ascii_lowercase(),
            port,
            path: path.to_string(),
        })
    }

    /// Returns true for TLS schemes.
    pub fn is_secure(&self) -> bool {
        matches!(self.scheme.as_str(), "wss" | "https")
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.scheme, self.hostname, self.port, self.path)
    }
}
