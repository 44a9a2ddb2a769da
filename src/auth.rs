use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

// Keys are minted by the gen_staff_key binary; only hash(key) is configured
// on the server.

/// SHA-256 hex of a presented token.
pub fn hash_access_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let out = hasher.finalize();
    hex::encode(out)
}

/// Equality that does not short-circuit on the first differing byte.
/// Inputs of different length compare unequal.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Checks a presented staff key against the configured hash.
pub fn verify_staff_key(token: &str, expected_hash: &str) -> bool {
    constant_time_eq(&hash_access_token(token), expected_hash)
}
