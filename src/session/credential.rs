use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A time-bounded authentication credential for the public platform
///
/// Produced by the login collaborator and read-shared by every fetch worker
/// during a crawl. Nothing in the crawl path mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Access token passed as a query parameter on every API call
    pub token: String,

    /// Session cookies, sent as a single `Cookie` header
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    /// Extra headers attached to every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// When the login that produced this credential completed
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    /// Creates a credential issued now
    pub fn new(token: impl Into<String>, cookies: BTreeMap<String, String>) -> Self {
        Self {
            token: token.into(),
            cookies,
            headers: BTreeMap::new(),
            issued_at: Utc::now(),
        }
    }

    /// Builds the credential from a raw `Cookie` header value (`k=v; k2=v2`)
    pub fn from_cookie_header(token: impl Into<String>, cookie_header: &str) -> Self {
        Self::new(token, parse_cookie_header(cookie_header))
    }

    /// Adds a header sent with every request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Serializes the cookie jar into a `Cookie` header value
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Returns true while `now - issued_at < ttl` and the token is present
    pub fn is_valid_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        !self.token.trim().is_empty() && now - self.issued_at < ttl
    }

    /// Age of the credential at `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.issued_at
    }
}

/// Parses `k=v; k2=v2` into a map, ignoring malformed pairs
pub fn parse_cookie_header(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header_roundtrip() {
        let credential = Credential::from_cookie_header("tok", "slave_sid=abc; data_ticket=x=y;  bad ; =nope");

        assert_eq!(credential.cookies.len(), 2);
        assert_eq!(credential.cookies.get("slave_sid").map(String::as_str), Some("abc"));
        // Only the first '=' separates name from value
        assert_eq!(credential.cookies.get("data_ticket").map(String::as_str), Some("x=y"));
        assert_eq!(credential.cookie_header(), "data_ticket=x=y; slave_sid=abc");
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let ttl = Duration::hours(96);

        let mut credential = Credential::new("tok", BTreeMap::new());
        credential.issued_at = now - Duration::hours(95);
        assert!(credential.is_valid_at(ttl, now));

        credential.issued_at = now - Duration::hours(96);
        assert!(!credential.is_valid_at(ttl, now));

        credential.issued_at = now - Duration::hours(200);
        assert!(!credential.is_valid_at(ttl, now));
    }

    #[test]
    fn test_empty_token_is_invalid() {
        let credential = Credential::new("  ", BTreeMap::new());
        assert!(!credential.is_valid_at(Duration::hours(1), Utc::now()));
    }
}
