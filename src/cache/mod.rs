// Key/value cache with TTL
//
// Memoizes repository listings and definitive plugin detections. Values are
// derived facts that can always be recomputed, so stores are last-write-wins
// with no transactional guarantees.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use crate::error::CacheError;
use serde_json::Value;
use std::time::Duration;

/// Prefix of cached repository listings
pub const REPOSITORIES_PREFIX: &str = "repositories_";

/// Prefix of cached plugin detections
pub const DETECTION_PREFIX: &str = "plugin_check_";

/// Process-external key/value store with per-entry TTL
pub trait CacheStore: Send + Sync {
    /// Fetch a live value, `None` on miss or expiry
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every entry whose key starts with `prefix`, returning the count
    fn delete_by_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}

/// Normalize a key fragment: lowercase ASCII alphanumerics, `_` and `-` only
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            (c.is_ascii_alphanumeric() || c == '_' || c == '-').then_some(c)
        })
        .collect()
}

/// Cache key of an organization's repository listing
pub fn repositories_key(org: &str) -> String {
    format!("{}{}", REPOSITORIES_PREFIX, sanitize_key(org))
}

/// Cache key of a repository's detection result
pub fn detection_key(org: &str, repo: &str) -> String {
    format!("{}{}", detection_org_prefix(org), sanitize_key(repo))
}

/// Prefix covering every detection key of one organization
///
/// The sanitized org is preceded by its length, so `acme` never prefixes
/// the keys of `acme_tools`.
pub fn detection_org_prefix(org: &str) -> String {
    let org = sanitize_key(org);
    format!("{}{}_{}_", DETECTION_PREFIX, org.len(), org)
}
