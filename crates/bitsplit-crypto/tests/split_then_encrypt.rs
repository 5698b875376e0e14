//! Composition of the primitives the way callers are expected to use them:
//! encrypt first, split the ciphertext, join it back, decrypt.

use bitsplit_core::ErrorKind;
use bitsplit_crypto::{decrypt, encrypt, generate_key, join, split, SplitScheme};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn encrypted_payload_survives_split_and_join() {
    let mut rng = StdRng::seed_from_u64(42);
    let key = generate_key(32, &mut rng).unwrap();
    let plaintext = b"only confidential once it has been through the cipher";

    let ciphertext = encrypt(plaintext, key.as_bytes(), &mut rng).unwrap();
    let shares = split(&ciphertext, 4, SplitScheme::WholeBuffer, &mut rng).unwrap();
    let joined = join(&shares).unwrap();

    assert_eq!(joined, ciphertext);
    assert_eq!(decrypt(&joined, key.as_bytes()).unwrap(), plaintext);
}

#[test]
fn missing_share_is_caught_by_authentication() {
    let mut rng = StdRng::seed_from_u64(43);
    let key = generate_key(32, &mut rng).unwrap();
    let ciphertext = encrypt(b"all shares or nothing", key.as_bytes(), &mut rng).unwrap();

    let shares = split(&ciphertext, 3, SplitScheme::PerByte, &mut rng).unwrap();
    let partial = join(&shares[..2]).unwrap();

    let err = decrypt(&partial, key.as_bytes()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

#[test]
fn truncated_share_is_caught_by_authentication() {
    let mut rng = StdRng::seed_from_u64(44);
    let key = generate_key(16, &mut rng).unwrap();
    let ciphertext = encrypt(b"truncated share files", key.as_bytes(), &mut rng).unwrap();

    let shares = split(&ciphertext, 2, SplitScheme::PerByte, &mut rng).unwrap();
    let mut bytes: Vec<Vec<u8>> = shares.into_iter().map(|s| s.into_bytes()).collect();
    let keep = bytes[1].len() - 3;
    bytes[1].truncate(keep);

    let joined = join(&bytes).unwrap();
    assert_eq!(joined.len(), ciphertext.len());
    let err = decrypt(&joined, key.as_bytes()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}
