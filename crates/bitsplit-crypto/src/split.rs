//! Additive k-of-k secret splitting
//!
//! A secret is split into `n` shares whose byte-wise sum (mod 256) is the
//! secret. All `n` shares are needed; any `n - 1` of them are uniformly random
//! noise when the generator is a CSPRNG. This is not threshold sharing and
//! offers no protection beyond that: encrypt first if real confidentiality is
//! required.

use std::io::{Read, Write};

use bitsplit_core::{BitsplitError, BitsplitResult};
use rand::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Minimum number of shares a secret can be split into.
pub const MIN_SHARES: usize = 2;

/// How random material is drawn while splitting. Both schemes join the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SplitScheme {
    /// Draw `n - 1` random bytes per secret byte.
    #[default]
    PerByte,
    /// Draw `n - 1` random buffers the size of the whole secret.
    WholeBuffer,
}

/// One share of a split secret. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    bytes: Vec<u8>,
}

impl Share {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
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

    pub fn into_bytes(mut self) -> Vec<u8> {
        std::mem::take(&mut self.bytes)
    }
}

impl AsRef<[u8]> for Share {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

fn check_share_count(n: usize) -> BitsplitResult<()> {
    if n < MIN_SHARES {
        return Err(BitsplitError::InvalidArgument(format!(
            "at least {MIN_SHARES} shares are required, got {n}"
        )));
    }
    Ok(())
}

/// Split `secret` into `n` shares.
///
/// Share order matters only for reproducing a split from a known random
/// stream; joining is order-independent.
pub fn split<R>(
    secret: &[u8],
    n: usize,
    scheme: SplitScheme,
    rng: &mut R,
) -> BitsplitResult<Vec<Share>>
where
    R: RngCore + CryptoRng + ?Sized,
{
    check_share_count(n)?;
    let shares = match scheme {
        SplitScheme::PerByte => split_per_byte(secret, n, rng),
        SplitScheme::WholeBuffer => split_whole_buffer(secret, n, rng),
    };
    Ok(shares)
}

fn split_per_byte<R>(secret: &[u8], n: usize, rng: &mut R) -> Vec<Share>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut outputs: Vec<Vec<u8>> = (0..n).map(|_| Vec::with_capacity(secret.len())).collect();
    let mut rands = Zeroizing::new(vec![0u8; n - 1]);

    for &b in secret {
        rng.fill_bytes(&mut rands);
        let sum = rands.iter().fold(0u8, |acc, r| acc.wrapping_add(*r));
        outputs[0].push(b.wrapping_sub(sum));
        for (out, r) in outputs[1..].iter_mut().zip(rands.iter()) {
            out.push(*r);
        }
    }

    outputs.into_iter().map(Share::from_bytes).collect()
}

fn split_whole_buffer<R>(secret: &[u8], n: usize, rng: &mut R) -> Vec<Share>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut first = secret.to_vec();
    let mut rest = Vec::with_capacity(n - 1);

    for _ in 1..n {
        let mut buf = vec![0u8; secret.len()];
        rng.fill_bytes(&mut buf);
        for (acc, r) in first.iter_mut().zip(buf.iter()) {
            *acc = acc.wrapping_add(*r);
        }
        for b in buf.iter_mut() {
            *b = b.wrapping_neg();
        }
        rest.push(Share::from_bytes(buf));
    }

    let mut shares = Vec::with_capacity(n);
    shares.push(Share::from_bytes(first));
    shares.extend(rest);
    shares
}

/// Recombine shares by byte-wise modular sum.
///
/// Shares of different lengths are accepted: a share contributes zero past
/// its own end. That keeps truncated share files readable but says nothing
/// about whether the result is the original secret.
pub fn join<S: AsRef<[u8]>>(shares: &[S]) -> BitsplitResult<Vec<u8>> {
    check_share_count(shares.len())?;

    let max_len = shares.iter().map(|s| s.as_ref().len()).max().unwrap_or(0);
    let mut secret = vec![0u8; max_len];
    for share in shares {
        for (acc, b) in secret.iter_mut().zip(share.as_ref()) {
            *acc = acc.wrapping_add(*b);
        }
    }
    Ok(secret)
}

/// Read all of `input` and write one share to each of `outputs`.
pub fn split_into<I, W, R>(
    mut input: I,
    outputs: &mut [W],
    scheme: SplitScheme,
    rng: &mut R,
) -> BitsplitResult<()>
where
    I: Read,
    W: Write,
    R: RngCore + CryptoRng + ?Sized,
{
    check_share_count(outputs.len())?;

    let mut secret = Zeroizing::new(Vec::new());
    input.read_to_end(&mut secret).map_err(|e| {
        BitsplitError::Io(std::io::Error::new(
            e.kind(),
            format!("while reading secret: {e}"),
        ))
    })?;

    let shares = split(&secret, outputs.len(), scheme, rng)?;
    for (i, (share, out)) in shares.iter().zip(outputs.iter_mut()).enumerate() {
        out.write_all(share.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| {
                BitsplitError::Io(std::io::Error::new(
                    e.kind(),
                    format!("while writing share {i}: {e}"),
                ))
            })?;
    }
    Ok(())
}

/// Read every share from `inputs` and write the recombined secret to `output`.
pub fn join_from<R, W>(inputs: &mut [R], mut output: W) -> BitsplitResult<()>
where
    R: Read,
    W: Write,
{
    check_share_count(inputs.len())?;

    let mut shares = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter_mut().enumerate() {
        let mut buf = Vec::new();
        input.read_to_end(&mut buf).map_err(|e| {
            BitsplitError::Io(std::io::Error::new(
                e.kind(),
                format!("while reading share {i}: {e}"),
            ))
        })?;
        shares.push(Share::from_bytes(buf));
    }

    let secret = Zeroizing::new(join(&shares)?);
    output
        .write_all(&secret)
        .and_then(|_| output.flush())
        .map_err(|e| {
            BitsplitError::Io(std::io::Error::new(
                e.kind(),
                format!("while writing result: {e}"),
            ))
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitsplit_core::ErrorKind;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{RngCore, SeedableRng};
    use std::io::Cursor;

    /// Replays a fixed byte sequence, cycling when exhausted.
    struct FixedRng {
        seq: Vec<u8>,
        pos: usize,
    }

    impl FixedRng {
        fn new(seq: &[u8]) -> Self {
            Self {
                seq: seq.to_vec(),
                pos: 0,
            }
        }
    }

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            let mut buf = [0u8; 4];
            self.fill_bytes(&mut buf);
            u32::from_le_bytes(buf)
        }

        fn next_u64(&mut self) -> u64 {
            let mut buf = [0u8; 8];
            self.fill_bytes(&mut buf);
            u64::from_le_bytes(buf)
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest.iter_mut() {
                *b = self.seq[self.pos % self.seq.len()];
                self.pos += 1;
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    // Test-only: lets a fixed stream stand in for a CSPRNG.
    impl CryptoRng for FixedRng {}

    #[test]
    fn test_per_byte_known_vector() {
        let mut rng = FixedRng::new(&[5, 5, 5]);
        let shares = split(&[10, 20, 30], 2, SplitScheme::PerByte, &mut rng).unwrap();

        assert_eq!(shares[1].as_bytes(), &[5, 5, 5]);
        assert_eq!(shares[0].as_bytes(), &[5, 15, 25]);
        assert_eq!(join(&shares).unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_per_byte_wraps_modulo_256() {
        let mut rng = FixedRng::new(&[200]);
        let shares = split(&[10], 2, SplitScheme::PerByte, &mut rng).unwrap();

        assert_eq!(shares[0].as_bytes(), &[66]);
        assert_eq!(shares[1].as_bytes(), &[200]);
        assert_eq!(join(&shares).unwrap(), vec![10]);
    }

    #[test]
    fn test_whole_buffer_known_vector() {
        let mut rng = FixedRng::new(&[5, 6, 7]);
        let shares = split(&[10, 20, 30], 2, SplitScheme::WholeBuffer, &mut rng).unwrap();

        assert_eq!(shares[0].as_bytes(), &[15, 26, 37]);
        assert_eq!(shares[1].as_bytes(), &[251, 250, 249]);
        assert_eq!(join(&shares).unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_split_rejects_fewer_than_two_shares() {
        let mut rng = StdRng::seed_from_u64(1);
        for n in [0, 1] {
            let err = split(b"secret", n, SplitScheme::PerByte, &mut rng).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn test_join_rejects_single_share() {
        let err = join(&[Share::from_bytes(vec![1, 2, 3])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_join_tolerates_unequal_lengths() {
        let shares: Vec<&[u8]> = vec![&[1u8, 2, 3, 4][..], &[1u8, 1][..], &[][..]];
        assert_eq!(join(&shares).unwrap(), vec![2, 3, 3, 4]);
    }

    #[test]
    fn test_empty_secret() {
        let mut rng = StdRng::seed_from_u64(2);
        let shares = split(b"", 3, SplitScheme::WholeBuffer, &mut rng).unwrap();
        assert_eq!(shares.len(), 3);
        assert!(shares.iter().all(Share::is_empty));
        assert!(join(&shares).unwrap().is_empty());
    }

    #[test]
    fn test_share_debug_is_redacted() {
        let share = Share::from_bytes(vec![0xAA; 4]);
        let debug = format!("{share:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("170"));
    }

    #[test]
    fn test_shares_look_uniform() {
        // Chi-square over 256 buckets (255 dof); 400 is far beyond the 99.99th percentile.
        let secret = vec![0u8; 64 * 1024];
        for scheme in [SplitScheme::PerByte, SplitScheme::WholeBuffer] {
            let mut rng = StdRng::seed_from_u64(7);
            let shares = split(&secret, 3, scheme, &mut rng).unwrap();
            for share in &shares {
                let mut counts = [0u64; 256];
                for &b in share.as_bytes() {
                    counts[b as usize] += 1;
                }
                let expected = secret.len() as f64 / 256.0;
                let chi: f64 = counts
                    .iter()
                    .map(|&c| (c as f64 - expected).powi(2) / expected)
                    .sum();
                assert!(chi < 400.0, "{scheme:?} share not uniform: chi2={chi}");
            }
        }
    }

    #[test]
    fn test_split_into_join_from_streams() {
        let mut rng = StdRng::seed_from_u64(3);
        let secret = b"the launch codes are 0000".to_vec();

        let mut outputs = vec![Vec::new(), Vec::new(), Vec::new()];
        split_into(Cursor::new(&secret), &mut outputs, SplitScheme::PerByte, &mut rng).unwrap();
        assert!(outputs.iter().all(|o| o.len() == secret.len()));

        let mut inputs: Vec<Cursor<Vec<u8>>> = outputs.into_iter().map(Cursor::new).collect();
        let mut joined = Vec::new();
        join_from(&mut inputs, &mut joined).unwrap();
        assert_eq!(joined, secret);
    }

    #[test]
    fn test_split_into_single_output_fails() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut outputs = vec![Vec::new()];
        let err = split_into(Cursor::new(b"x"), &mut outputs, SplitScheme::PerByte, &mut rng)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(outputs[0].is_empty());
    }

    proptest! {
        #[test]
        fn prop_roundtrip_per_byte(
            secret in proptest::collection::vec(any::<u8>(), 0..512),
            n in 2usize..8,
            seed: u64
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let shares = split(&secret, n, SplitScheme::PerByte, &mut rng).unwrap();
            prop_assert_eq!(shares.len(), n);
            prop_assert_eq!(join(&shares).unwrap(), secret);
        }

        #[test]
        fn prop_roundtrip_whole_buffer(
            secret in proptest::collection::vec(any::<u8>(), 0..512),
            n in 2usize..8,
            seed: u64
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let shares = split(&secret, n, SplitScheme::WholeBuffer, &mut rng).unwrap();
            prop_assert_eq!(shares.len(), n);
            prop_assert_eq!(join(&shares).unwrap(), secret);
        }

        #[test]
        fn prop_join_is_order_independent(
            secret in proptest::collection::vec(any::<u8>(), 1..128),
            seed: u64
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut shares = split(&secret, 4, SplitScheme::PerByte, &mut rng).unwrap();
            shares.reverse();
            prop_assert_eq!(join(&shares).unwrap(), secret);
        }
    }
}
