/// Length of the short digest used in emitted filenames and module ids.
pub const SHORT_HASH_LEN: usize = 8;

/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Short form of [`content_hash`], suitable for `<name>.<hash>.<ext>` filenames.
#[must_use]
pub fn short_hash(data: &[u8]) -> String {
    content_hash(data)[..SHORT_HASH_LEN].to_string()
}

/// Hash several byte strings as one keyed record.
///
/// Each part is length-prefixed so `["ab", "c"]` and `["a", "bc"]` hash
/// differently. Used for composite cache keys.
#[must_use]
pub fn composite_hash(parts: &[&[u8]]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.finalize().to_hex().to_string()
}
