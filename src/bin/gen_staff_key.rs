use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};

// Same hashing the server applies to presented keys.
#[allow(dead_code)]
#[path = "../auth.rs"]
mod auth;

/// Prints a fresh staff key and the STAFF_KEY_HASH line to configure.
/// Hashes an existing key instead when one is passed as the first argument.
fn main() {
    let key = std::env::args().nth(1).unwrap_or_else(|| {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    });
    let hash = auth::hash_access_token(&key);

    println!("staff key (give to the dashboard): {key}");
    println!("STAFF_KEY_HASH={hash}");
}
