//! Filesystem collaborator: walking, copying, clearing and hiding

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

/// One entry of a directory walk.
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    /// Regular file (symlinks are never followed, so a link is neither).
    pub is_file: bool,
}

/// Lazily walk everything below `root` (not `root` itself).
///
/// Entries of each directory are visited in file-name order, so two walks of
/// an unchanged tree yield the same sequence.
pub fn walk(root: &Path) -> impl Iterator<Item = io::Result<WalkEntry>> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| match entry {
            Ok(entry) => {
                let file_type = entry.file_type();
                Ok(WalkEntry {
                    is_dir: file_type.is_dir(),
                    is_file: file_type.is_file(),
                    path: entry.into_path(),
                })
            }
            Err(e) => {
                let kind = e.io_error().map(io::Error::kind).unwrap_or(io::ErrorKind::Other);
                let at = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                Err(io::Error::new(kind, format!("walking {at}: {e}")))
            }
        })
}

/// Per-file read/write used by the transform, so tests can inject failures.
pub trait FileIo {
    fn read(&mut self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&mut self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Plain `std::fs` file access.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileIo;

impl FileIo for StdFileIo {
    fn read(&mut self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&mut self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }
}

fn with_path(e: io::Error, action: &str, path: &Path) -> io::Error {
    io::Error::new(e.kind(), format!("{action} {}: {e}", path.display()))
}

/// Recursively copy the contents of `src` into `dst`, creating `dst` if needed.
///
/// Symbolic links are recreated as links on Unix and rejected elsewhere, so a
/// copy never silently drops part of the tree.
pub fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    if !src.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such directory {}", src.display()),
        ));
    }
    fs::create_dir_all(dst).map_err(|e| with_path(e, "creating", dst))?;

    for entry in walk(src) {
        let entry = entry?;
        let rel = entry
            .path
            .strip_prefix(src)
            .map_err(|e| io::Error::other(format!("path mismatch under {}: {e}", src.display())))?;
        let target = dst.join(rel);

        if entry.is_dir {
            fs::create_dir_all(&target).map_err(|e| with_path(e, "creating", &target))?;
        } else if entry.is_file {
            fs::copy(&entry.path, &target).map_err(|e| with_path(e, "copying", &entry.path))?;
        } else {
            copy_link(&entry.path, &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_link(src: &Path, dst: &Path) -> io::Result<()> {
    let link = fs::read_link(src).map_err(|e| with_path(e, "reading link", src))?;
    std::os::unix::fs::symlink(&link, dst).map_err(|e| with_path(e, "creating link", dst))
}

#[cfg(not(unix))]
fn copy_link(src: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("can't copy special file {}", src.display()),
    ))
}

/// Remove everything inside `dir`, keeping `dir` itself.
pub fn remove_contents(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir).map_err(|e| with_path(e, "reading", dir))? {
        let entry = entry?;
        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| with_path(e, "removing", &path))?;
    }
    Ok(())
}

/// Mark a file hidden from casual directory listings.
///
/// Windows sets the hidden attribute; elsewhere this is a no-op (the lock
/// marker is a dotfile already).
#[cfg(windows)]
pub fn hide_file(path: &Path) -> io::Result<()> {
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{
        GetFileAttributesW, SetFileAttributesW, FILE_ATTRIBUTE_HIDDEN, INVALID_FILE_ATTRIBUTES,
    };

    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    // SAFETY: `wide` is a NUL-terminated UTF-16 path that outlives both calls.
    let current = unsafe { GetFileAttributesW(wide.as_ptr()) };
    if current == INVALID_FILE_ATTRIBUTES {
        return Err(with_path(io::Error::last_os_error(), "reading attributes of", path));
    }
    // SAFETY: as above.
    let ok = unsafe { SetFileAttributesW(wide.as_ptr(), current | FILE_ATTRIBUTE_HIDDEN) };
    if ok == 0 {
        return Err(with_path(io::Error::last_os_error(), "hiding", path));
    }
    Ok(())
}

#[cfg(not(windows))]
pub fn hide_file(path: &Path) -> io::Result<()> {
    debug!(path = %path.display(), "no hidden attribute on this platform");
    Ok(())
}

/// Canonical form of an existing directory, or `None` if it isn't one.
pub fn existing_dir(path: &Path) -> Option<PathBuf> {
    let canonical = path.canonicalize().ok()?;
    canonical.is_dir().then_some(canonical)
}
