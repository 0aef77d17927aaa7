//! HTTP session cookies and the persisted cookie jar.
//!
//! The transport layer consults [`CookieStore::cookies_for_request`] before
//! each request and feeds `Set-Cookie` headers back through
//! [`CookieStore::set_cookie`]. The owner persists the jar with
//! [`CookieStore::encode`] whenever [`CookieStore::changed`] is set.

use crate::address::Address;
use crate::error::{ReplError, ReplResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Pre-RFC 6265 `Expires` format (`Wed, 09-Jun-2021 10:18:14 GMT`).
const NETSCAPE_DATE_FORMAT: &str = "%a, %d-%b-%Y %H:%M:%S GMT";

fn now() -> i64 {
    Utc::now().timestamp()
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn parse_expires(value: &str) -> Option<i64> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.timestamp());
    }
    NaiveDateTime::parse_from_str(value, NETSCAPE_DATE_FORMAT)
        .ok()
        .map(|date| date.and_utc().timestamp())
}

/// One HTTP cookie. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Cookie {
    /// Cookie name; empty means invalid.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie applies to (and its subdomains).
    pub domain: String,
    /// Path prefix the cookie applies to; empty matches every path.
    pub path: String,
    /// When the cookie was received.
    pub created: i64,
    /// Expiration time; 0 for a session cookie.
    pub expires: i64,
    /// Only send over TLS.
    pub secure: bool,
}

impl Cookie {
    /// Parses a `Set-Cookie` header received from `from_host`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplError::InvalidInput`] if the header has no name, a
    /// malformed attribute, or a `Domain` the host may not set.
    pub fn parse(header: &str, from_host: &str) -> ReplResult<Self> {
        Self::parse_at(header, from_host, now())
    }

    /// Like [`Cookie::parse`], with an explicit current time.
    pub fn parse_at(header: &str, from_host: &str, now: i64) -> ReplResult<Self> {
        let invalid = |why: &str| ReplError::InvalidInput(format!("{} in cookie {:?}", why, header));

        let mut parts = header.split(';');
        let (name, value) = parts
            .next()
            .and_then(|pair| pair.split_once('='))
            .ok_or_else(|| invalid("missing name=value"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("empty name"));
        }

        let host = from_host.to_ascii_lowercase();
        let mut cookie = Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            domain: host.clone(),
            path: String::new(),
            created: now,
            expires: 0,
            secure: false,
        };
        let mut max_age = None;

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((key, val)) => (key.trim(), val.trim()),
                None => (attr.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" => {
                    let domain = val.trim_start_matches('.').to_ascii_lowercase();
                    if domain.is_empty() || !domain_matches(&host, &domain) {
                        return Err(invalid("illegal domain"));
                    }
                    cookie.domain = domain;
                }
                "path" => cookie.path = val.to_string(),
                "expires" => {
                    // Zero would mean a session cookie; dates at or before
                    // the epoch still mean "expired".
                    cookie.expires = parse_expires(val)
                        .ok_or_else(|| invalid("bad expires"))?
                        .max(1);
                }
                "max-age" => {
                    max_age = Some(val.parse::<i64>().map_err(|_| invalid("bad max-age"))?);
                }
                "secure" => cookie.secure = true,
                _ => {}
            }
        }

        if let Some(max_age) = max_age {
            cookie.expires = if max_age <= 0 {
                // Any positive time in the past.
                now.saturating_sub(1).max(1)
            } else {
                now.saturating_add(max_age)
            };
        }
        Ok(cookie)
    }

    /// A cookie with an empty name is never stored or sent.
    pub fn valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// Returns true if the cookie outlives the session.
    pub fn persistent(&self) -> bool {
        self.expires > 0
    }

    /// Returns true if the cookie has expired.
    pub fn expired(&self) -> bool {
        self.expired_at(now())
    }

    /// Returns true if the cookie had expired at `now`.
    pub fn expired_at(&self, now: i64) -> bool {
        self.expires > 0 && self.expires < now
    }

    /// Returns true if both cookies have the same identity.
    pub fn matches(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    /// Returns true if the cookie should be sent to `address`.
    pub fn matches_request(&self, address: &Address) -> bool {
        domain_matches(&address.hostname, &self.domain)
            && (self.path.is_empty() || address.path.starts_with(&self.path))
            && (!self.secure || address.is_secure())
    }

    /// Returns true if both cookies carry the same value and attributes.
    pub fn same_value_as(&self, other: &Cookie) -> bool {
        self.value == other.value && self.expires == other.expires && self.secure == other.secure
    }
}

#[derive(Debug, Default)]
struct Jar {
    cookies: Vec<Cookie>,
    changed: bool,
}

impl Jar {
    fn add(&mut self, cookie: Cookie, now: i64) {
        if !cookie.valid() {
            return;
        }
        let existing = self.cookies.iter().position(|c| c.matches(&cookie));
        match existing {
            Some(i) if cookie.expired_at(now) => {
                self.cookies.remove(i);
                self.changed = true;
            }
            Some(i) => {
                if !self.cookies[i].same_value_as(&cookie) {
                    self.changed = true;
                }
                self.cookies[i] = cookie;
            }
            None if cookie.expired_at(now) => {}
            None => {
                self.cookies.push(cookie);
                self.changed = true;
            }
        }
    }

    fn purge_expired(&mut self, now: i64) {
        let before = self.cookies.len();
        self.cookies.retain(|c| !c.expired_at(now));
        if self.cookies.len() != before {
            self.changed = true;
        }
    }
}

fn decode_cookies(data: &[u8]) -> ReplResult<Vec<Cookie>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    ciborium::de::from_reader(data)
        .map_err(|e| ReplError::InvalidInput(format!("malformed cookie data: {}", e)))
}

/// A thread-safe, persistable cookie jar.
///
/// Cookies keep their arrival order and no two share a name, domain and
/// path. The store is shared through an `Arc` between the worker and the
/// transport; every method takes the internal lock once.
///
/// # Example
///
/// ```rust
/// use revdb_replicator::{Address, CookieStore};
///
/// let store = CookieStore::new();
/// assert!(store.set_cookie("session=abc123; Path=/db", "sync.example.com"));
///
/// let addr = Address::parse("wss://sync.example.com/db/_blipsync").unwrap();
/// assert_eq!(store.cookies_for_request(&addr), "session=abc123");
/// ```
#[derive(Debug, Default)]
pub struct CookieStore {
    jar: Mutex<Jar>,
}

impl CookieStore {
    /// Creates an empty cookie store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a store from [`CookieStore::encode`] output.
    ///
    /// Invalid and expired cookies are dropped. Unknown fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ReplError::InvalidInput`] if the data is malformed.
    pub fn decode(data: &[u8]) -> ReplResult<Self> {
        let now = now();
        let mut jar = Jar::default();
        for cookie in decode_cookies(data)? {
            jar.add(cookie, now);
        }
        jar.changed = false;
        Ok(Self {
            jar: Mutex::new(jar),
        })
    }

    /// Serializes all unexpired cookies, session cookies included.
    ///
    /// # Errors
    ///
    /// Returns [`ReplError::Codec`] if serialization fails.
    pub fn encode(&self) -> ReplResult<Vec<u8>> {
        let now = now();
        let cookies: Vec<Cookie> = self
            .jar
            .lock()
            .cookies
            .iter()
            .filter(|c| !c.expired_at(now))
            .cloned()
            .collect();
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&cookies, &mut buf)
            .map_err(|e| ReplError::Codec(e.to_string()))?;
        Ok(buf)
    }

    /// Returns a snapshot of all stored cookies.
    pub fn cookies(&self) -> Vec<Cookie> {
        self.jar.lock().cookies.clone()
    }

    /// Builds the `Cookie` request header for `address`.
    ///
    /// Expired cookies are purged along the way. Returns an empty string if
    /// no cookie applies.
    pub fn cookies_for_request(&self, address: &Address) -> String {
        let mut jar = self.jar.lock();
        jar.purge_expired(now());
        jar.cookies
            .iter()
            .filter(|c| c.matches_request(address))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Parses and stores a `Set-Cookie` header received from `from_host`.
    ///
    /// Returns false (and stores nothing) if the header is malformed.
    pub fn set_cookie(&self, header: &str, from_host: &str) -> bool {
        match Cookie::parse(header, from_host) {
            Ok(cookie) => {
                debug!(name = %cookie.name, domain = %cookie.domain, "cookie set");
                self.add_cookie(cookie);
                true
            }
            Err(e) => {
                warn!(host = from_host, error = %e, "rejected cookie");
                false
            }
        }
    }

    /// Adds or replaces a cookie. An expired cookie removes its match.
    pub fn add_cookie(&self, cookie: Cookie) {
        self.jar.lock().add(cookie, now());
    }

    /// Removes all cookies.
    pub fn clear_cookies(&self) {
        let mut jar = self.jar.lock();
        if !jar.cookies.is_empty() {
            jar.cookies.clear();
            jar.changed = true;
        }
    }

    /// Merges cookies from [`CookieStore::encode`] output into this store.
    ///
    /// # Errors
    ///
    /// Returns [`ReplError::InvalidInput`] if the data is malformed; the store
    /// is left untouched.
    pub fn merge(&self, data: &[u8]) -> ReplResult<()> {
        let cookies = decode_cookies(data)?;
        let now = now();
        let mut jar = self.jar.lock();
        for cookie in cookies {
            jar.add(cookie, now);
        }
        Ok(())
    }

    /// Returns true if the store changed since the last
    /// [`CookieStore::clear_changed`].
    pub fn changed(&self) -> bool {
        self.jar.lock().changed
    }

    /// Marks the current contents as persisted.
    pub fn clear_changed(&self) {
        self.jar.lock().changed = false;
    }
}
