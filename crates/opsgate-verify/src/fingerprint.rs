//! Content fingerprints for the integrity guard.

use sha2::{Digest, Sha256};

/// SHA-256 of `content` as lowercase hex.
pub fn sha256_hex(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
