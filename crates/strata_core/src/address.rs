//! Peer identities and network locations.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Stable ledger identity of a participant.
///
/// Addresses compare case-insensitively, so they are normalised to lower case
/// on construction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `host:port` a peer's HTTP server is reachable at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build an absolute URL for `path` on this endpoint.
    pub fn url(&self, path: &str) -> String {
        let base = self.0.trim_end_matches('/');
        let base = if base.starts_with("http://") || base.starts_with("https://") {
            base.to_string()
        } else {
            format!("http://{base}")
        };
        format!("{base}/{}", path.trim_start_matches('/'))
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_case_insensitive() {
        assert_eq!(Address::new("0xABCdef"), Address::new("0xabcdef"));
        assert_eq!(Address::new(" 0xAB ").as_str(), "0xab");
    }

    #[test]
    fn endpoint_builds_urls() {
        let endpoint = Endpoint::new("10.0.0.1:9379");
        assert_eq!(endpoint.url("/files"), "http://10.0.0.1:9379/files");

        let endpoint = Endpoint::new("https://host.example/");
        assert_eq!(endpoint.url("files/abc"), "https://host.example/files/abc");
    }
}
