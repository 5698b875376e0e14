//! Lock and unlock a directory against a key store
//!
//! Locking encrypts every file under a fresh key, stores the key in the key
//! store under a name derived from the key and the plaintext, and leaves a
//! `.lock` marker holding that name. Unlocking reverses it and deletes the key.
//! Both run inside a [`DirectoryTransaction`], so a failure part way through
//! leaves the directory as it was.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bitsplit_core::config::LockConfig;
use bitsplit_core::{BitsplitError, BitsplitResult};
use bitsplit_crypto::naming::is_key_name;
use bitsplit_crypto::{decrypt, encrypt, generate_key, ContentNamer, LockKey};
use rand::{CryptoRng, RngCore};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::fsutil::{self, FileIo, StdFileIo};
use crate::lease::Lease;
use crate::prompt::Confirm;
use crate::transaction::{guard_target, require_dir, transform_files, DirectoryTransaction};

/// Name of the marker file at the root of a locked directory.
pub const MARKER_NAME: &str = ".lock";

/// Prefix of a marker preserved by re-locking: `.lock-<digest>`.
pub const NESTED_MARKER_PREFIX: &str = ".lock-";

/// Tunables for [`Locker`], usually taken from the `[lock]` config section.
#[derive(Debug, Clone)]
pub struct LockOptions {
    pub key_size: usize,
    pub snapshot_prefix: String,
    pub hide_files: bool,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from(&LockConfig::default())
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            key_size: config.key_size,
            snapshot_prefix: config.snapshot_prefix.clone(),
            hide_files: config.hide_files,
        }
    }
}

#[derive(Debug)]
pub struct LockOutcome {
    /// Key file name, also the marker content.
    pub digest: String,
    pub key_path: PathBuf,
    pub files: u64,
    pub leftover_snapshot: Option<PathBuf>,
}

#[derive(Debug)]
pub struct UnlockOutcome {
    pub digest: String,
    /// Key store the key was found in.
    pub key_store: PathBuf,
    pub files: u64,
    /// The decrypted tree hashes to the marker digest again. False means files
    /// were added, removed or renamed while the directory was locked.
    pub content_verified: bool,
    /// An inner `.lock-<digest>` marker was put back as `.lock`.
    pub restored_nested_marker: bool,
    /// Set when the key file could not be deleted after unlocking.
    pub leftover_key: Option<PathBuf>,
    pub leftover_snapshot: Option<PathBuf>,
}

/// Lock/unlock engine with injected randomness, confirmation and file access.
pub struct Locker<R, C, F = StdFileIo> {
    rng: R,
    confirm: C,
    io: F,
    options: LockOptions,
}

impl<R, C> Locker<R, C, StdFileIo>
where
    R: RngCore + CryptoRng,
    C: Confirm,
{
    pub fn new(rng: R, confirm: C, options: LockOptions) -> Self {
        Self {
            rng,
            confirm,
            io: StdFileIo,
            options,
        }
    }
}

impl<R, C, F> Locker<R, C, F>
where
    R: RngCore + CryptoRng,
    C: Confirm,
    F: FileIo,
{
    /// Replace per-file access, e.g. with one that fails on purpose.
    pub fn with_io<G: FileIo>(self, io: G) -> Locker<R, C, G> {
        Locker {
            rng: self.rng,
            confirm: self.confirm,
            io,
            options: self.options,
        }
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Encrypt `target` in place and store its key in `key_store`.
    pub fn lock(&mut self, target: &Path, key_store: &Path) -> BitsplitResult<LockOutcome> {
        let target = require_dir(target)?;
        let key_store = require_dir(key_store)?;
        guard_target(&target, &mut self.confirm)?;
        if key_store.starts_with(&target) {
            return Err(BitsplitError::Refused(format!(
                "key store {} is inside {}, the key would be encrypted with the rest",
                key_store.display(),
                target.display()
            )));
        }

        let _lease = Lease::acquire(&target)?;

        let marker = target.join(MARKER_NAME);
        let previous = if marker.is_file() {
            let question = format!(
                "{} already has a lock marker and may already be locked. Lock it again?",
                target.display()
            );
            if !self.confirm.confirm(&question) {
                return Err(BitsplitError::Refused(format!(
                    "{} is already locked",
                    target.display()
                )));
            }
            Some(read_marker(&marker)?)
        } else {
            None
        };

        let key = generate_key(self.options.key_size, &mut self.rng)?;
        info!(target = %target.display(), key_store = %key_store.display(), "locking directory");

        let rng = &mut self.rng;
        let io = &mut self.io;
        let hide = self.options.hide_files;

        let committed = DirectoryTransaction::begin(&target, &self.options.snapshot_prefix)?.run(
            |root| {
                if let Some(previous) = &previous {
                    let nested = root.join(format!("{NESTED_MARKER_PREFIX}{previous}"));
                    fs::rename(root.join(MARKER_NAME), &nested).map_err(|e| {
                        BitsplitError::transform("preserve marker", &nested, e.into())
                    })?;
                    debug!(marker = %nested.display(), "kept previous lock marker");
                }

                let mut namer = ContentNamer::new(key.as_bytes());
                let files = transform_files(root, io, "encrypt", |_, contents| {
                    let contents = Zeroizing::new(contents);
                    namer.update(&contents);
                    encrypt(&contents, key.as_bytes(), rng)
                })?;
                Ok((namer.finish(), files))
            },
            |root, (digest, files)| {
                let key_path = key_store.join(&digest);
                write_key(&key_path, &key)?;
                if hide {
                    hide_best_effort(&key_path);
                }

                let marker = root.join(MARKER_NAME);
                if let Err(e) = fs::write(&marker, &digest) {
                    if let Err(cleanup) = fs::remove_file(&key_path) {
                        warn!(
                            key = %key_path.display(),
                            error = %cleanup,
                            "could not remove key file after failed commit"
                        );
                    }
                    return Err(BitsplitError::transform("write marker", &marker, e.into()));
                }
                if hide {
                    hide_best_effort(&marker);
                }
                Ok((digest, key_path, files))
            },
        )?;

        let (digest, key_path, files) = committed.value;
        info!(target = %target.display(), digest = %digest, files, "directory locked");
        Ok(LockOutcome {
            digest,
            key_path,
            files,
            leftover_snapshot: committed.leftover_snapshot,
        })
    }

    /// Decrypt `target` with the key named by its marker in `key_store`.
    ///
    /// `KeyNotFound` leaves the target untouched so another key store can be
    /// tried.
    pub fn unlock(&mut self, target: &Path, key_store: &Path) -> BitsplitResult<UnlockOutcome> {
        let target = require_dir(target)?;
        let key_store = require_dir(key_store)?;
        guard_target(&target, &mut self.confirm)?;

        let _lease = Lease::acquire(&target)?;

        let digest = read_marker(&target.join(MARKER_NAME))?;
        let key_path = key_store.join(&digest);
        let key = read_key(&key_path)?;
        info!(target = %target.display(), key = %key_path.display(), "unlocking directory");

        let io = &mut self.io;
        let committed = DirectoryTransaction::begin(&target, &self.options.snapshot_prefix)?.run(
            |root| {
                let marker = root.join(MARKER_NAME);
                fs::remove_file(&marker)
                    .map_err(|e| BitsplitError::transform("remove marker", &marker, e.into()))?;

                let mut namer = ContentNamer::new(key.as_bytes());
                let files = transform_files(root, io, "decrypt", |_, contents| {
                    let plaintext = decrypt(&contents, key.as_bytes())?;
                    namer.update(&plaintext);
                    Ok(plaintext)
                })?;
                Ok((namer.finish(), files))
            },
            |root, (recomputed, files)| {
                let restored = restore_nested_marker(root)?;
                Ok((recomputed, files, restored))
            },
        )?;

        let (recomputed, files, restored_nested_marker) = committed.value;
        let content_verified = recomputed.eq_ignore_ascii_case(&digest);
        if !content_verified {
            warn!(
                target = %target.display(),
                expected = %digest,
                actual = %recomputed,
                "unlocked tree doesn't match its lock digest; files changed while locked"
            );
        }

        let leftover_key = match fs::remove_file(&key_path) {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    key = %key_path.display(),
                    error = %e,
                    "unlocked, but the key file could not be removed"
                );
                Some(key_path)
            }
        };

        info!(target = %target.display(), digest = %digest, files, "directory unlocked");
        Ok(UnlockOutcome {
            digest,
            key_store,
            files,
            content_verified,
            restored_nested_marker,
            leftover_key,
            leftover_snapshot: committed.leftover_snapshot,
        })
    }

    /// Try [`unlock`](Self::unlock) against each candidate key store in order.
    ///
    /// Candidates that don't exist or don't hold the key are skipped; any other
    /// error stops the search.
    pub fn unlock_any(
        &mut self,
        target: &Path,
        candidates: &[PathBuf],
    ) -> BitsplitResult<UnlockOutcome> {
        let target = require_dir(target)?;
        let digest = read_marker(&target.join(MARKER_NAME))?;

        let mut searched = Vec::new();
        for candidate in candidates {
            if fsutil::existing_dir(candidate).is_none() {
                debug!(candidate = %candidate.display(), "key store not present, skipping");
                continue;
            }
            searched.push(candidate.clone());
            match self.unlock(&target, candidate) {
                Err(e) if e.is_recoverable() => {
                    debug!(candidate = %candidate.display(), error = %e, "key not in this store");
                }
                result => return result,
            }
        }
        Err(BitsplitError::KeyNotFoundAnywhere { digest, searched })
    }
}

/// Read and validate a lock marker.
pub fn read_marker(marker: &Path) -> BitsplitResult<String> {
    let content = match fs::read(marker) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let dir = marker.parent().unwrap_or(marker);
            return Err(BitsplitError::NotLocked(dir.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    let digest = std::str::from_utf8(&content)
        .map(str::trim)
        .unwrap_or_default();
    if !is_key_name(digest) {
        return Err(BitsplitError::MalformedInput(format!(
            "lock marker {} doesn't hold a hex digest",
            marker.display()
        )));
    }
    Ok(digest.to_string())
}

fn read_key(key_path: &Path) -> BitsplitResult<LockKey> {
    let bytes = match fs::read(key_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BitsplitError::KeyNotFound(key_path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let len = bytes.len();
    LockKey::from_bytes(bytes).map_err(|_| {
        BitsplitError::InvalidKey(format!(
            "key file {} holds {len} bytes, not a valid key",
            key_path.display()
        ))
    })
}

/// Write a key file, never replacing an existing one.
fn write_key(key_path: &Path, key: &LockKey) -> BitsplitResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(key_path)
        .map_err(|e| BitsplitError::transform("write key", key_path, e.into()))?;
    if let Err(e) = file.write_all(key.as_bytes()).and_then(|()| file.sync_all()) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(key_path) {
            warn!(key = %key_path.display(), error = %cleanup, "could not remove partial key file");
        }
        return Err(BitsplitError::transform("write key", key_path, e.into()));
    }
    Ok(())
}

fn hide_best_effort(path: &Path) {
    if let Err(e) = fsutil::hide_file(path) {
        warn!(path = %path.display(), error = %e, "could not hide file");
    }
}

/// Put an inner marker back after unlocking a re-locked directory.
fn restore_nested_marker(root: &Path) -> BitsplitResult<bool> {
    let marker = root.join(MARKER_NAME);
    if marker.exists() {
        return Ok(false);
    }

    let mut names: Vec<String> = fs::read_dir(root)?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(NESTED_MARKER_PREFIX))
        .collect();
    names.sort();

    for name in names {
        let digest = &name[NESTED_MARKER_PREFIX.len()..];
        if !is_key_name(digest) {
            continue;
        }
        let nested = root.join(&name);
        let content = match fs::read(&nested) {
            Ok(content) => content,
            Err(_) => continue,
        };
        if content == digest.as_bytes() {
            fs::rename(&nested, &marker)
                .map_err(|e| BitsplitError::transform("restore marker", &nested, e.into()))?;
            info!(
                marker = %marker.display(),
                digest,
                "directory is still locked by an earlier lock"
            );
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitsplit_core::ErrorKind;

    #[test]
    fn test_read_marker_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join(MARKER_NAME);
        fs::write(&marker, "  abc123\n").unwrap();
        assert_eq!(read_marker(&marker).unwrap(), "abc123");
    }

    #[test]
    fn test_read_marker_missing_is_not_locked() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_marker(&dir.path().join(MARKER_NAME)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotLocked);
    }

    #[test]
    fn test_read_marker_rejects_non_hex() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join(MARKER_NAME);
        for bad in ["", "   ", "../../etc/passwd", "not-hex", "\u{fffd}"] {
            fs::write(&marker, bad).unwrap();
            let err = read_marker(&marker).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedInput, "content {bad:?}");
        }
        fs::write(&marker, [0xffu8, 0xfe]).unwrap();
        assert_eq!(read_marker(&marker).unwrap_err().kind(), ErrorKind::MalformedInput);
    }

    #[test]
    fn test_read_key_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("abc");
        assert_eq!(read_key(&missing).unwrap_err().kind(), ErrorKind::KeyNotFound);

        fs::write(&missing, [1u8; 7]).unwrap();
        assert_eq!(read_key(&missing).unwrap_err().kind(), ErrorKind::InvalidKey);

        fs::write(&missing, [1u8; 24]).unwrap();
        assert_eq!(read_key(&missing).unwrap().len(), 24);
    }

    #[test]
    fn test_write_key_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc");
        let key = LockKey::from_bytes(vec![3u8; 16]).unwrap();

        write_key(&path, &key).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![3u8; 16]);

        let err = write_key(&path, &key).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransformFailure);
    }

    #[test]
    fn test_restore_nested_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".lock-abc"), "abc").unwrap();
        fs::write(dir.path().join(".lock-def"), "something else").unwrap();

        assert!(restore_nested_marker(dir.path()).unwrap());
        assert_eq!(fs::read_to_string(dir.path().join(MARKER_NAME)).unwrap(), "abc");
        assert!(!dir.path().join(".lock-abc").exists());
        assert!(dir.path().join(".lock-def").exists());

        // a marker is already in place
        assert!(!restore_nested_marker(dir.path()).unwrap());
    }

    #[test]
    fn test_restore_nested_marker_ignores_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".lock-abc"), "abd").unwrap();
        fs::write(dir.path().join(".lock-xyz"), "xyz").unwrap();
        assert!(!restore_nested_marker(dir.path()).unwrap());
        assert!(!dir.path().join(MARKER_NAME).exists());
    }

    #[test]
    fn test_options_from_config() {
        let config = LockConfig {
            key_size: 16,
            snapshot_prefix: "snap-".into(),
            hide_files: false,
        };
        let options = LockOptions::from(&config);
        assert_eq!(options.key_size, 16);
        assert_eq!(options.snapshot_prefix, "snap-");
        assert!(!options.hide_files);
        assert_eq!(LockOptions::default().key_size, 32);
    }
}
