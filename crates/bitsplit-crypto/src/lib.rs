//! bitsplit-crypto: primitives behind directory locking
//!
//! - `split`: additive k-of-k secret splitting (every share is required)
//! - `cipher`: AES-GCM with a random nonce prepended to each ciphertext
//! - `keys`: directory keys, zeroized on drop, raw or hex encoded
//! - `naming`: SHA-256 over key + directory content, used as the key file name
//! - `entropy`: seeding a CSPRNG from the OS, optionally boosted remotely
//!
//! Ciphertext layout:
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! Every function that needs randomness takes an `RngCore + CryptoRng`
//! argument; nothing here reaches for a global generator.

pub mod cipher;
pub mod entropy;
pub mod keys;
pub mod naming;
pub mod split;

pub use cipher::{decrypt, encrypt};
pub use entropy::seeded_rng;
pub use keys::{generate_key, LockKey};
pub use naming::{derive_name, ContentNamer};
pub use split::{join, join_from, split, split_into, Share, SplitScheme};

/// Default size of a directory key in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;
