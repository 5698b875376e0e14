//! Snapshot-guarded, all-or-nothing rewrite of a directory tree
//!
//! ```text
//! START → SNAPSHOT → TRANSFORMING → COMMITTING   → DONE
//!                         │              │
//!                         └──────────────┴→ ROLLING_BACK → DONE
//! ```
//!
//! The snapshot is a full copy of the target in a fresh temporary directory.
//! Its path is logged before any file is touched so that an interrupted run
//! can always be restored by hand.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bitsplit_core::{BitsplitError, BitsplitResult};
use tracing::{debug, error, info, warn};

use crate::fsutil::{self, FileIo};
use crate::prompt::Confirm;

/// Where a transaction currently is. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Start,
    Snapshot,
    Transforming,
    Committing,
    RollingBack,
    Done,
}

/// Result of a committed transaction.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    /// Set when the snapshot couldn't be deleted after a successful commit.
    pub leftover_snapshot: Option<PathBuf>,
}

/// Canonicalize `path` and require it to be a directory.
pub fn require_dir(path: &Path) -> BitsplitResult<PathBuf> {
    fsutil::existing_dir(path).ok_or_else(|| BitsplitError::DirectoryNotFound(path.to_path_buf()))
}

/// Refuse targets that must never be rewritten wholesale.
///
/// `target` must be canonical. Locking a directory that contains the running
/// binary is allowed only after confirmation.
pub fn guard_target(target: &Path, confirm: &mut dyn Confirm) -> BitsplitResult<()> {
    let temp = std::env::temp_dir();
    let temp = temp.canonicalize().unwrap_or(temp);
    if temp.starts_with(target) {
        return Err(BitsplitError::Refused(format!(
            "{} is or contains the temporary directory used for snapshots",
            target.display()
        )));
    }

    let exe_dir = std::env::current_exe()
        .and_then(|p| p.canonicalize())
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    if let Some(exe_dir) = exe_dir {
        if exe_dir.starts_with(target) {
            let question = format!(
                "{} contains this program ({}); its files will be rewritten too. Continue?",
                target.display(),
                exe_dir.display()
            );
            if !confirm.confirm(&question) {
                return Err(BitsplitError::Refused(format!(
                    "{} contains the running program",
                    target.display()
                )));
            }
        }
    }
    Ok(())
}

/// Read, transform and overwrite every regular file below `root`.
///
/// `stage` names the transform in errors. Returns the number of files
/// rewritten.
pub fn transform_files<F, T>(
    root: &Path,
    io: &mut F,
    stage: &'static str,
    mut apply: T,
) -> BitsplitResult<u64>
where
    F: FileIo + ?Sized,
    T: FnMut(&Path, Vec<u8>) -> BitsplitResult<Vec<u8>>,
{
    let mut files = 0u64;
    for entry in fsutil::walk(root) {
        let entry = entry.map_err(|e| BitsplitError::transform("walk", root, e.into()))?;
        if entry.is_dir {
            continue;
        }
        if !entry.is_file {
            debug!(path = %entry.path.display(), "skipping non-regular file");
            continue;
        }

        let contents = io
            .read(&entry.path)
            .map_err(|e| BitsplitError::transform("read", &entry.path, e.into()))?;
        let output = apply(&entry.path, contents)
            .map_err(|e| BitsplitError::transform(stage, &entry.path, e))?;
        io.write(&entry.path, &output)
            .map_err(|e| BitsplitError::transform("write", &entry.path, e.into()))?;
        files += 1;
    }
    Ok(files)
}

/// One snapshot-protected pass over a directory.
#[derive(Debug)]
pub struct DirectoryTransaction {
    target: PathBuf,
    snapshot: PathBuf,
    state: TxnState,
}

impl DirectoryTransaction {
    /// Copy `target` into a fresh snapshot directory.
    ///
    /// On failure the partial snapshot is removed and the target is untouched.
    pub fn begin(target: &Path, snapshot_prefix: &str) -> BitsplitResult<Self> {
        let snapshot_failure = |source: io::Error| BitsplitError::SnapshotFailure {
            target: target.to_path_buf(),
            source,
        };

        let snapshot = tempfile::Builder::new()
            .prefix(snapshot_prefix)
            .tempdir()
            .map_err(snapshot_failure)?
            .keep();

        let mut txn = Self {
            target: target.to_path_buf(),
            snapshot,
            state: TxnState::Start,
        };
        txn.transition(TxnState::Snapshot);
        info!(
            target = %txn.target.display(),
            snapshot = %txn.snapshot.display(),
            "staging snapshot created; restore from it manually if this run is interrupted"
        );

        if let Err(e) = fsutil::copy_dir(&txn.target, &txn.snapshot) {
            if let Err(cleanup) = fs::remove_dir_all(&txn.snapshot) {
                warn!(
                    snapshot = %txn.snapshot.display(),
                    error = %cleanup,
                    "could not remove partial snapshot"
                );
            }
            return Err(snapshot_failure(e));
        }
        Ok(txn)
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn snapshot(&self) -> &Path {
        &self.snapshot
    }

    /// Run `transform`, then `commit` on its result.
    ///
    /// An error from either restores the target from the snapshot and is
    /// returned as-is, unless restoring fails too (`RollbackFailure`).
    pub fn run<T, U>(
        mut self,
        transform: impl FnOnce(&Path) -> BitsplitResult<T>,
        commit: impl FnOnce(&Path, T) -> BitsplitResult<U>,
    ) -> BitsplitResult<Committed<U>> {
        self.transition(TxnState::Transforming);
        let value = match transform(&self.target) {
            Ok(value) => value,
            Err(e) => return Err(self.rollback(e)),
        };

        self.transition(TxnState::Committing);
        let value = match commit(&self.target, value) {
            Ok(value) => value,
            Err(e) => return Err(self.rollback(e)),
        };

        let leftover_snapshot = match fs::remove_dir_all(&self.snapshot) {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    snapshot = %self.snapshot.display(),
                    error = %e,
                    "committed, but the snapshot could not be removed; delete it manually"
                );
                Some(self.snapshot.clone())
            }
        };
        self.transition(TxnState::Done);
        Ok(Committed {
            value,
            leftover_snapshot,
        })
    }

    fn rollback(&mut self, original: BitsplitError) -> BitsplitError {
        self.transition(TxnState::RollingBack);
        error!(
            target = %self.target.display(),
            snapshot = %self.snapshot.display(),
            error = %original,
            "transform failed, restoring from snapshot"
        );

        let restore = fsutil::remove_contents(&self.target)
            .map_err(|e| ("clearing the target", e))
            .and_then(|()| {
                fsutil::copy_dir(&self.snapshot, &self.target)
                    .map_err(|e| ("copying the snapshot back", e))
            });
        if let Err((stage, source)) = restore {
            error!(
                snapshot = %self.snapshot.display(),
                stage,
                error = %source,
                "rollback failed; the snapshot has been kept"
            );
            return BitsplitError::RollbackFailure {
                stage,
                snapshot: self.snapshot.clone(),
                original: Box::new(original),
                source,
            };
        }

        if let Err(e) = fs::remove_dir_all(&self.snapshot) {
            error!(
                snapshot = %self.snapshot.display(),
                error = %e,
                "target restored, but the snapshot could not be removed; delete it manually"
            );
        }
        self.transition(TxnState::Done);
        original
    }

    fn transition(&mut self, next: TxnState) {
        debug!(
            target = %self.target.display(),
            from = ?self.state,
            to = ?next,
            "transaction state"
        );
        self.state = next;
    }
}
