//! Per-directory exclusive lease
//!
//! Two lock/unlock operations on the same directory must not interleave.
//! The lock marker alone can't guarantee that (it is written at the end of
//! the transaction), so each operation takes an advisory OS lock on a lease
//! file in the temporary directory, named after the target's canonical path.
//! The lease lives outside the target so it is never encrypted or snapshotted.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use bitsplit_core::BitsplitResult;
use fs4::fs_std::FileExt;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Held for the duration of one operation; released on drop.
#[derive(Debug)]
pub struct Lease {
    _file: File,
    path: PathBuf,
}

impl Lease {
    /// Block until no other process holds the lease for `target`.
    ///
    /// `target` should already be canonical so every spelling of the same
    /// directory maps to one lease file.
    pub fn acquire(target: &Path) -> BitsplitResult<Self> {
        let path = lease_path(target);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        debug!(lease = %path.display(), target = %target.display(), "acquiring directory lease");
        file.lock_exclusive()?;
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lease_path(target: &Path) -> PathBuf {
    let digest = Sha256::digest(target.as_os_str().as_encoded_bytes());
    let name = format!("bitsplit-{}.lease", &hex::encode(digest)[..16]);
    std::env::temp_dir().join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_path_is_stable_and_distinct() {
        let a = lease_path(Path::new("/data/one"));
        let b = lease_path(Path::new("/data/two"));
        assert_eq!(a, lease_path(Path::new("/data/one")));
        assert_ne!(a, b);
        assert!(a.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn test_lease_can_be_reacquired_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().canonicalize().unwrap();

        let first = Lease::acquire(&target).unwrap();
        assert!(first.path().exists());
        drop(first);

        let second = Lease::acquire(&target).unwrap();
        assert_eq!(second.path(), lease_path(&target));
    }
}
