//! bitsplit-lock: transactional directory locking
//!
//! - `fsutil`: walk, copy, clear and hide, plus the `FileIo` seam
//! - `lease`: per-directory exclusive lease in the temp dir
//! - `transaction`: snapshot, transform, commit or roll back
//! - `protocol`: lock/unlock against a key store
//! - `keystore`: where to look for key stores
//! - `prompt`: yes/no confirmation

pub mod fsutil;
pub mod keystore;
pub mod lease;
pub mod prompt;
pub mod protocol;
pub mod transaction;

pub use fsutil::{FileIo, StdFileIo};
pub use keystore::{candidate_locations, removable_volumes};
pub use prompt::{AssumeNo, AssumeYes, Confirm};
pub use protocol::{
    LockOptions, LockOutcome, Locker, UnlockOutcome, MARKER_NAME, NESTED_MARKER_PREFIX,
};
pub use transaction::{Committed, DirectoryTransaction, TxnState};
