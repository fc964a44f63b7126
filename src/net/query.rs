use std::collections::HashMap;
use url::Url;

/// Query key naming the decryption context.
pub const TARGET_KEY: &str = "target";
/// Query key marking a resource as encrypted.
pub const SECRET_KEY: &str = "secret";

/// Flags carried in the query string of a resource URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFlags {
    /// Opaque identifier handed to the decrypt service.
    pub target: Option<String>,
    pub secret: bool,
}

impl QueryFlags {
    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query())
    }

    pub fn from_query(query: Option<&str>) -> Self {
        let mut map = parse_query_map(query);
        Self {
            target: map.remove(TARGET_KEY).filter(|t| !t.is_empty()),
            secret: map.get(SECRET_KEY).is_some_and(|v| v.eq_ignore_ascii_case("true")),
        }
    }

    /// The target to decrypt with, but only when the resource is marked secret.
    pub fn secret_target(&self) -> Option<&str> {
        match (&self.target, self.secret) {
            (Some(target), true) => Some(target.as_str()),
            _ => None,
        }
    }
}

/// Splits a raw query string into `key=value` pairs.
///
/// Pairs that do not consist of exactly one `=` followed by a non-empty value
/// are dropped. Values are taken verbatim (no percent-decoding) and the last
/// occurrence of a key wins.
pub fn parse_query_map(query: Option<&str>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return map;
    };

    for param in query.split('&') {
        let mut kv = param.split('=');
        if let (Some(name), Some(value), None) = (kv.next(), kv.next(), kv.next()) {
            if !value.is_empty() {
                map.insert(name.to_string(), value.to_string());
            }
        }
    }
    map
}
