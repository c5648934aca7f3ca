use crate::error::{WatchError, WatchResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-f]{40}$").expect("address pattern is valid"));

static BARE_HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("bare hex pattern is valid"));

/// Canonical form of an account identifier: trimmed, lowercase, `0x`-prefixed.
///
/// Idempotent. Does not validate; use [`WatchAddress::parse`] for that.
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"));

    match body {
        Some(rest) => format!("0x{}", rest.to_lowercase()),
        None if BARE_HEX_RE.is_match(trimmed) => format!("0x{}", trimmed.to_lowercase()),
        None => trimmed.to_lowercase(),
    }
}

/// A validated, normalized account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchAddress(String);

impl WatchAddress {
    pub fn parse(raw: &str) -> WatchResult<Self> {
        let normalized = normalize_address(raw);
        if !ADDRESS_RE.is_match(&normalized) {
            return Err(WatchError::InvalidAddress(raw.trim().to_string()));
        }
        Ok(WatchAddress(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatchAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk shape of the watchlist: `{"addresses": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchlistDocument {
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// On-disk shape of the watch cursor: `{"last_block": 123}` or `{"last_block": null}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchStateDocument {
    #[serde(default)]
    pub last_block: Option<u64>,
}
