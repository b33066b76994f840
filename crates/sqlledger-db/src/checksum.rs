use md5::{Digest, Md5};

/// Checksum recorded in the ledger for a migration: hex MD5 over
/// `id ++ up ++ down` with no separators.
pub fn checksum(id: &str, up: &str, down: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(id.as_bytes());
    hasher.update(up.as_bytes());
    hasher.update(down.as_bytes());
    hex::encode(hasher.finalize())
}
