//! Key store discovery
//!
//! Keys are meant to live on removable media, away from the data they
//! protect. Candidates come from the configured locations first, then any
//! mounted removable volumes.

use std::fs;
use std::path::{Path, PathBuf};

use bitsplit_core::config::KeystoreConfig;
use tracing::debug;

/// Key store candidates for unlocking, in probe order, without duplicates.
pub fn candidate_locations(config: &KeystoreConfig) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    let removable = if config.probe_removable {
        removable_volumes()
    } else {
        Vec::new()
    };
    for path in config.locations.iter().cloned().chain(removable) {
        if !candidates.contains(&path) {
            candidates.push(path);
        }
    }
    debug!(count = candidates.len(), "key store candidates");
    candidates
}

/// Mounted volumes that could hold a key store, sorted.
#[cfg(windows)]
pub fn removable_volumes() -> Vec<PathBuf> {
    (b'A'..=b'Z')
        .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
        .filter(|drive| drive.is_dir())
        .collect()
}

#[cfg(target_os = "macos")]
pub fn removable_volumes() -> Vec<PathBuf> {
    subdirectories(Path::new("/Volumes"))
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn removable_volumes() -> Vec<PathBuf> {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok();

    let mut roots = Vec::new();
    if let Some(user) = &user {
        roots.push(Path::new("/media").join(user));
        roots.push(Path::new("/run/media").join(user));
    }

    let mut volumes: Vec<PathBuf> = roots.iter().flat_map(|root| subdirectories(root)).collect();
    // Older setups mount straight under /media; skip the per-user directories.
    volumes.extend(
        subdirectories(Path::new("/media"))
            .into_iter()
            .filter(|dir| !roots.contains(dir)),
    );
    volumes.sort();
    volumes.dedup();
    volumes
}

#[cfg(not(any(windows, unix)))]
pub fn removable_volumes() -> Vec<PathBuf> {
    Vec::new()
}

/// Immediate subdirectories of `dir` (symlinks excluded), sorted. A missing
/// or unreadable `dir` yields nothing.
#[cfg_attr(windows, allow(dead_code))]
fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subdirectories_sorted_dirs_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::write(dir.path().join("file.txt"), "").unwrap();

        let found = subdirectories(dir.path());
        assert_eq!(found, vec![dir.path().join("alpha"), dir.path().join("zeta")]);
    }

    #[test]
    fn test_subdirectories_of_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(subdirectories(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn test_candidates_configured_only() {
        let config = KeystoreConfig {
            locations: vec![
                PathBuf::from("/keys/a"),
                PathBuf::from("/keys/b"),
                PathBuf::from("/keys/a"),
            ],
            probe_removable: false,
        };
        assert_eq!(
            candidate_locations(&config),
            vec![PathBuf::from("/keys/a"), PathBuf::from("/keys/b")]
        );
    }

    #[test]
    fn test_candidates_start_with_configured() {
        let config = KeystoreConfig {
            locations: vec![PathBuf::from("/keys/first")],
            probe_removable: true,
        };
        let candidates = candidate_locations(&config);
        assert_eq!(candidates[0], PathBuf::from("/keys/first"));
    }

    #[test]
    fn test_removable_volumes_exist_and_sorted() {
        let volumes = removable_volumes();
        assert!(volumes.iter().all(|v| v.is_dir()));
        let mut sorted = volumes.clone();
        sorted.sort();
        assert_eq!(volumes, sorted);
    }
}
