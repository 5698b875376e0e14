//! Whole-buffer AES-GCM encryption/decryption
//!
//! Encrypted format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The key size selects AES-128, AES-192 or AES-256. The whole buffer is
//! processed in memory; there is no streaming mode.

use aes_gcm::{
    aead::{consts::U12, Aead, KeyInit, Nonce},
    aes::Aes192,
    Aes128Gcm, Aes256Gcm, AesGcm,
};
use bitsplit_core::{BitsplitError, BitsplitResult};
use rand::{CryptoRng, RngCore};

use crate::keys::check_key_size;
use crate::NONCE_SIZE;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Encrypt `plaintext` under `key` with a fresh nonce drawn from `rng`.
///
/// Returns: `[12-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt<R>(plaintext: &[u8], key: &[u8], rng: &mut R) -> BitsplitResult<Vec<u8>>
where
    R: RngCore + CryptoRng + ?Sized,
{
    check_key_size(key.len())?;

    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce);

    let sealed = match key.len() {
        16 => seal::<Aes128Gcm>(key, &nonce, plaintext),
        24 => seal::<Aes192Gcm>(key, &nonce, plaintext),
        _ => seal::<Aes256Gcm>(key, &nonce, plaintext),
    }?;

    let mut result = Vec::with_capacity(NONCE_SIZE + sealed.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&sealed);
    Ok(result)
}

/// Decrypt the output of [`encrypt`].
///
/// Fails with `MalformedInput` when `blob` cannot even hold a nonce and with
/// `AuthenticationFailure` when the tag does not verify.
pub fn decrypt(blob: &[u8], key: &[u8]) -> BitsplitResult<Vec<u8>> {
    check_key_size(key.len())?;

    if blob.len() < NONCE_SIZE {
        return Err(BitsplitError::MalformedInput(format!(
            "encrypted data too short: {} bytes (nonce alone is {NONCE_SIZE})",
            blob.len()
        )));
    }

    let (nonce, sealed) = blob.split_at(NONCE_SIZE);
    match key.len() {
        16 => open::<Aes128Gcm>(key, nonce, sealed),
        24 => open::<Aes192Gcm>(key, nonce, sealed),
        _ => open::<Aes256Gcm>(key, nonce, sealed),
    }
}

fn seal<C: KeyInit + Aead>(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> BitsplitResult<Vec<u8>> {
    let cipher = C::new_from_slice(key)
        .map_err(|_| BitsplitError::InvalidKey(format!("unusable key length {}", key.len())))?;
    cipher
        .encrypt(Nonce::<C>::from_slice(nonce), plaintext)
        .map_err(|_| BitsplitError::MalformedInput("plaintext too large for AES-GCM".into()))
}

fn open<C: KeyInit + Aead>(key: &[u8], nonce: &[u8], sealed: &[u8]) -> BitsplitResult<Vec<u8>> {
    let cipher = C::new_from_slice(key)
        .map_err(|_| BitsplitError::InvalidKey(format!("unusable key length {}", key.len())))?;
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce), sealed)
        .map_err(|_| BitsplitError::AuthenticationFailure)
}
