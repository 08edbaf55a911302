//! Fingerprint hashing.

/// Digest of an acoustic fingerprint, used as the dedupe key for songs.
/// Lowercase hex MD5 of the raw fingerprint string.
pub fn fingerprint_hash(fingerprint: &str) -> String {
    format!("{:x}", md5::compute(fingerprint.as_bytes()))
}
