// crates/server/src/jobs/key.rs
//! Deterministic keys for jobs and cached results.
//!
//! A computation's key is derived from every parameter that affects its
//! output, so equivalent requests collapse onto one job and one cache slot.

/// Build the canonical key for a computation.
///
/// Values are trimmed and lowercased so `scope=REG` and `scope=reg `
/// resolve to the same job.
pub fn computation_key(kind: &str, params: &[(&str, &str)]) -> String {
    let mut key = String::from(kind);
    for (name, value) in params {
        key.push(':');
        key.push_str(name);
        key.push('=');
        key.push_str(&value.trim().to_ascii_lowercase());
    }
    key
}

/// Key for a forced refresh.
///
/// The uniqueness suffix guarantees a `get_by_key` miss, so the request
/// always gets a fresh job instead of reusing a stale one.
pub fn refresh_key(base: &str) -> String {
    format!("{base}:refresh={}", uuid::Uuid::new_v4())
}
