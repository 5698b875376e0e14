//! CSPRNG construction
//!
//! The generator handed to key, share and nonce generation is a `StdRng`
//! seeded from the operating system. When the remote booster is enabled,
//! numbers fetched from a public randomness service are hashed together with
//! the OS seed. The booster can only add entropy: an unreachable or hostile
//! service leaves the OS seed in charge, and failures are logged and ignored.

use bitsplit_core::config::EntropyConfig;
use bitsplit_core::{BitsplitError, BitsplitResult};
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Build the process RNG from OS entropy, optionally boosted.
pub fn seeded_rng(config: &EntropyConfig) -> BitsplitResult<StdRng> {
    let mut seed = Zeroizing::new([0u8; 32]);
    OsRng.try_fill_bytes(&mut seed[..]).map_err(|e| {
        BitsplitError::Io(std::io::Error::other(format!(
            "operating system entropy unavailable: {e}"
        )))
    })?;

    if config.remote_booster {
        match fetch_remote(config) {
            Ok(extra) => {
                debug!(bytes = extra.len(), "mixing remote entropy into seed");
                *seed = mix_seed(&seed, &extra);
            }
            Err(e) => warn!(
                url = %config.remote_url,
                error = %e,
                "remote entropy unavailable, using OS entropy only"
            ),
        }
    }

    Ok(StdRng::from_seed(*seed))
}

/// SHA-256(os_seed || extra)
fn mix_seed(os_seed: &[u8; 32], extra: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(os_seed);
    hasher.update(extra);
    hasher.finalize().into()
}

/// Parse the plain-text integer list returned by the randomness service:
/// four numbers in `0..=65535`, one per line.
#[cfg(any(feature = "remote-entropy", test))]
fn parse_numbers(body: &str) -> Result<Vec<u8>, String> {
    let numbers: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if numbers.len() < 4 {
        return Err(format!("expected 4 numbers, got {}", numbers.len()));
    }
    let mut bytes = Vec::with_capacity(8);
    for n in &numbers[..4] {
        let value: u16 = n
            .parse()
            .map_err(|e| format!("cannot parse {n:?} as a 16-bit number: {e}"))?;
        bytes.extend_from_slice(&value.to_be_bytes());
    }
    Ok(bytes)
}

#[cfg(feature = "remote-entropy")]
fn fetch_remote(config: &EntropyConfig) -> Result<Vec<u8>, String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| format!("building HTTP client: {e}"))?;
    let body = client
        .get(&config.remote_url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .map_err(|e| format!("no response from {}: {e}", config.remote_url))?;
    parse_numbers(&body)
}

#[cfg(not(feature = "remote-entropy"))]
fn fetch_remote(_config: &EntropyConfig) -> Result<Vec<u8>, String> {
    Err("built without the remote-entropy feature".into())
}
