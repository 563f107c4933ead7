//! Content-addressed keys for cached optimization results.

use super::hashing::sha256_hex_prefix;
use super::optimizer::OptimizeParams;

/// Hex characters kept from the digest (16 bytes).
pub const REQUEST_HASH_LEN: usize = 32;

/// Fixed-order canonical form of an optimize request. Preference fields
/// that are empty are left out; lists and maps are sorted so equivalent
/// requests collide.
#[must_use]
pub fn canonical_request(user_id: i64, params: &OptimizeParams) -> String {
    let prefs = &params.preferences;
    let mut segments = vec![
        format!("user:{user_id}"),
        format!("cat:{}", params.category.as_str()),
    ];
    if !prefs.priority_attributes.is_empty() {
        let mut names = prefs.priority_attributes.clone();
        names.sort();
        segments.push(format!("priority:{}", names.join(",")));
    }
    if !prefs.desired_levels.is_empty() {
        let levels: Vec<String> = prefs
            .desired_levels
            .iter()
            .map(|(name, level)| format!("{name}={level}"))
            .collect();
        segments.push(format!("levels:{}", levels.join(",")));
    }
    if !prefs.excluded_attributes.is_empty() {
        let mut names = prefs.excluded_attributes.clone();
        names.sort();
        segments.push(format!("excluded:{}", names.join(",")));
    }
    segments.push(format!("max:{}", params.max_solutions));
    segments.push(format!("sort:{}", params.sort_mode.as_str()));
    segments.join("|")
}

/// First 32 hex characters of the SHA-256 of [`canonical_request`].
#[must_use]
pub fn request_hash(user_id: i64, params: &OptimizeParams) -> String {
    sha256_hex_prefix(canonical_request(user_id, params).as_bytes(), REQUEST_HASH_LEN)
}
