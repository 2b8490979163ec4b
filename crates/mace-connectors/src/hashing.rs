//! Content hashing for file-artifact registration (spec §5 idempotency
//! rule (b): re-registering a file with an identical hash is a no-op).

use mace_core::error::MaceResult;
use sha2::{Digest, Sha256};
use std::path::Path;

pub async fn hash_file(path: &Path) -> MaceResult<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hash_bytes(&bytes))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_hash_identically() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }
}
