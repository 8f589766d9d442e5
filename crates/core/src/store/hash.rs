//! Content-addressed file names for fallback store entries.

use sha2::{Digest, Sha256};

/// Extension of fallback store entry files.
pub const ENTRY_EXTENSION: &str = "cache";

/// File name for a fallback store key.
///
/// Keys may contain path separators or characters that are not valid in
/// file names, so entries are named by the SHA-256 digest of the key.
pub fn entry_file_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{}.{ENTRY_EXTENSION}", hex::encode(hasher.finalize()))
}
