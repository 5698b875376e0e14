//! Directory keys: generation, validation, raw and hex encodings

use bitsplit_core::config::SUPPORTED_KEY_SIZES;
use bitsplit_core::{BitsplitError, BitsplitResult};
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, Zeroizing};

/// A symmetric key protecting one locked directory. Zeroized on drop.
#[derive(Clone)]
pub struct LockKey {
    bytes: Vec<u8>,
}

impl LockKey {
    /// Wrap raw key bytes; the length must be an AES key size.
    pub fn from_bytes(bytes: Vec<u8>) -> BitsplitResult<Self> {
        let key = Self { bytes };
        check_key_size(key.bytes.len())?;
        Ok(key)
    }

    /// Parse a hex-encoded key, ignoring surrounding whitespace.
    pub fn from_hex(text: &str) -> BitsplitResult<Self> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| BitsplitError::InvalidKey(format!("invalid hex key: {e}")))?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.bytes))
    }
}

impl Drop for LockKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockKey")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

pub(crate) fn check_key_size(len: usize) -> BitsplitResult<()> {
    if !SUPPORTED_KEY_SIZES.contains(&len) {
        return Err(BitsplitError::InvalidKey(format!(
            "key must be one of {SUPPORTED_KEY_SIZES:?} bytes, got {len}"
        )));
    }
    Ok(())
}

/// Generate a random key of `size` bytes.
pub fn generate_key<R>(size: usize, rng: &mut R) -> BitsplitResult<LockKey>
where
    R: RngCore + CryptoRng + ?Sized,
{
    check_key_size(size)?;
    let mut bytes = vec![0u8; size];
    rng.fill_bytes(&mut bytes);
    LockKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitsplit_core::ErrorKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_key_generation() {
        let mut rng = StdRng::seed_from_u64(11);
        let k1 = generate_key(32, &mut rng).unwrap();
        let k2 = generate_key(32, &mut rng).unwrap();
        assert_eq!(k1.len(), 32);
        assert_ne!(k1.as_bytes(), k2.as_bytes(), "random keys must differ");
    }

    #[test]
    fn test_generate_rejects_bad_size() {
        let mut rng = StdRng::seed_from_u64(11);
        let err = generate_key(20, &mut rng).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn test_hex_roundtrip() {
        let key = LockKey::from_bytes(vec![0xAB; 16]).unwrap();
        let hex = key.to_hex();
        assert_eq!(hex.as_str(), "ab".repeat(16));

        let parsed = LockKey::from_hex(&format!("  {}\n", hex.as_str())).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        let err = LockKey::from_hex("not hex").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);

        let err = LockKey::from_hex("abcd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey, "2-byte key is too short");
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = LockKey::from_bytes(vec![7u8; 32]).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
