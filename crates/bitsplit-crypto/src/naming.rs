//! Content-derived key file names
//!
//! The name of a stored key is SHA-256 over the key followed by the plaintext
//! of every file in the locked directory, in walk order. The name is therefore
//! unguessable without the key and changes whenever the content does.

use sha2::{Digest, Sha256};

/// Incremental hasher producing a key file name.
#[derive(Clone)]
pub struct ContentNamer {
    hasher: Sha256,
    files: u64,
}

impl ContentNamer {
    /// Start a name seeded with the key bytes.
    pub fn new(key: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key);
        Self { hasher, files: 0 }
    }

    /// Feed one file's contents.
    pub fn update(&mut self, contents: &[u8]) {
        self.hasher.update(contents);
        self.files += 1;
    }

    /// Number of files fed so far.
    pub fn files(&self) -> u64 {
        self.files
    }

    /// Lowercase hex digest (64 chars).
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// One-shot form of [`ContentNamer`].
pub fn derive_name<I, C>(key: &[u8], contents: I) -> String
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut namer = ContentNamer::new(key);
    for c in contents {
        namer.update(c.as_ref());
    }
    namer.finish()
}

/// True if `name` could be a digest produced here: non-empty hex only, so it
/// can never name a path outside the key store.
pub fn is_key_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let key = [0x55u8; 32];
        let a = derive_name(&key, [b"one".as_slice(), b"two".as_slice()]);
        let b = derive_name(&key, [b"one".as_slice(), b"two".as_slice()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(is_key_name(&a));
    }

    #[test]
    fn test_key_changes_name() {
        let files = [b"same content".as_slice()];
        let a = derive_name(&[0x11u8; 32], files);
        let b = derive_name(&[0x22u8; 32], files);
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_changes_name() {
        let key = [0x11u8; 32];
        let a = derive_name(&key, [b"v1".as_slice()]);
        let b = derive_name(&key, [b"v2".as_slice()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_matches_plain_sha256() {
        let key = b"k";
        let expected = hex::encode(Sha256::digest(b"kabc"));
        assert_eq!(derive_name(key, [b"a".as_slice(), b"bc".as_slice()]), expected);
    }

    #[test]
    fn test_incremental_counts_files() {
        let mut namer = ContentNamer::new(&[0u8; 16]);
        namer.update(b"x");
        namer.update(b"");
        assert_eq!(namer.files(), 2);
    }

    #[test]
    fn test_is_key_name() {
        assert!(is_key_name("deadBEEF01"));
        assert!(!is_key_name(""));
        assert!(!is_key_name("../etc/passwd"));
        assert!(!is_key_name("abc def"));
    }
}
