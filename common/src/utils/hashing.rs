use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Short, deterministic per-user identifier derived from the e-mail address.
///
/// Case-insensitive: the address is lowercased before hashing, so the same
/// mailbox always maps to the same 16-hex-character prefix used in file names.
pub fn user_hash(email: &str) -> String {
    let digest = sha256_hex(email.to_lowercase().as_bytes());
    digest.chars().take(16).collect()
}

/// Deterministic 32-hex feedback identifier for items that arrived without one.
///
/// Keyed on `interactionId` plus `created_at` (or the array index when the
/// timestamp is absent) so repeated sync runs produce the same id and the
/// cloud store can deduplicate safely.
pub fn derive_feedback_id(interaction_id: &str, created_at: &str, idx: usize) -> String {
    let salt = if created_at.is_empty() {
        idx.to_string()
    } else {
        created_at.to_string()
    };
    let digest = sha256_hex(format!("{interaction_id}:{salt}").as_bytes());
    digest.chars().take(32).collect()
}
