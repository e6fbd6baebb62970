//! Shared filesystem helpers built on `cap-std` and `camino`.
//!
//! Writers in this crate never expose partially written files: content is
//! staged beside the target and moved into place in one step.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io::{self, ErrorKind};
use std::path::Component;

/// Resolve an ambient directory for the given path and return the directory with the file name.
pub fn open_dir_and_file(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("target should include a file name"))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Ensure the parent directory for `path` exists, handling absolute paths safely for cap-std.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => ensure_dir(parent),
        None => Ok(()),
    }
}

/// Create `dir` and any missing ancestors.
pub fn ensure_dir(dir: &Utf8Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() || dir == Utf8Path::new("/") {
        return Ok(());
    }

    let (base_dir, relative) = base_dir_and_relative(dir)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)?;
    Ok(())
}

/// Open `dir` with ambient authority, creating it first when missing.
pub fn open_or_create_dir(dir: &Utf8Path) -> io::Result<fs_utf8::Dir> {
    ensure_dir(dir)?;
    fs_utf8::Dir::open_ambient_dir(dir, ambient_authority())
}

/// Return whether a path exists and is a regular file using capability-based IO.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = open_dir_and_file(path)?;
    dir.metadata(name.as_str()).map(|meta| meta.is_file())
}

/// Read a file, returning `None` when it (or its directory) does not exist.
pub fn read_if_exists(path: &Utf8Path) -> io::Result<Option<Vec<u8>>> {
    let (dir, name) = match open_dir_and_file(path) {
        Ok(opened) => opened,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    match dir.read(name.as_str()) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Replace the contents of `path` atomically, creating parent directories.
pub fn write_atomic(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    ensure_parent_dir(path)?;
    let (dir, name) = open_dir_and_file(path)?;
    let staging = staging_name(&name);
    dir.write(staging.as_str(), contents)?;
    dir.rename(staging.as_str(), &dir, name.as_str())
        .inspect_err(|_| discard(&dir, &staging))
}

/// Write `path` only if it does not exist yet.
///
/// Returns `Ok(false)` and leaves the existing file untouched when the target
/// is already present.
pub fn write_new_atomic(path: &Utf8Path, contents: &[u8]) -> io::Result<bool> {
    ensure_parent_dir(path)?;
    let (dir, name) = open_dir_and_file(path)?;
    let staging = staging_name(&name);
    dir.write(staging.as_str(), contents)?;
    let linked = match dir.hard_link(staging.as_str(), &dir, name.as_str()) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(err),
    };
    discard(&dir, &staging);
    linked
}

fn staging_name(name: &str) -> String {
    format!(".{name}.{}.partial", std::process::id())
}

fn discard(dir: &fs_utf8::Dir, staging: &str) {
    if let Err(err) = dir.remove_file(staging)
        && err.kind() != ErrorKind::NotFound
    {
        log::warn!("failed to remove staging file {staging}: {err}");
    }
}

/// Split an absolute or relative parent path into an ambient base directory and a relative suffix.
pub fn base_dir_and_relative(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();

    let (base, relative) = match std_parent.components().next() {
        // Windows absolute path with a drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;

            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_parent.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from parent path"))?
                .to_path_buf();
            (base, relative)
        }
        // Unix-style absolute path.
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        // Relative path: resolve from the current directory.
        _ => (Utf8PathBuf::from("."), std_parent.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 parent path"))?;

    Ok((dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn workspace() -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().expect("create temporary directory");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .expect("temporary directory should be UTF-8");
        (dir, root)
    }

    #[rstest]
    fn write_atomic_creates_parents_and_replaces(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let target = root.join("nested/deeper/state.json");
        write_atomic(&target, b"first").expect("first write");
        write_atomic(&target, b"second").expect("second write");
        let contents = read_if_exists(&target).expect("read target");
        assert_eq!(contents.as_deref(), Some(b"second".as_slice()));
    }

    #[rstest]
    fn write_atomic_leaves_no_staging_files(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        write_atomic(&root.join("cache.json"), b"[]").expect("write cache");
        let names: Vec<String> = std::fs::read_dir(root.as_std_path())
            .expect("list directory")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["cache.json".to_owned()]);
    }

    #[rstest]
    fn write_new_atomic_never_overwrites(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let target = root.join("queue/batch.json");
        assert!(write_new_atomic(&target, b"original").expect("first write"));
        assert!(!write_new_atomic(&target, b"replacement").expect("second write"));
        let contents = read_if_exists(&target).expect("read target");
        assert_eq!(contents.as_deref(), Some(b"original".as_slice()));
    }

    #[rstest]
    fn read_if_exists_tolerates_missing_directories(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let missing = root.join("absent/file.json");
        assert_eq!(read_if_exists(&missing).expect("read missing"), None);
    }

    #[rstest]
    fn file_is_file_distinguishes_directories(workspace: (TempDir, Utf8PathBuf)) {
        let (_guard, root) = workspace;
        let file = root.join("present.txt");
        write_atomic(&file, b"x").expect("write file");
        assert!(file_is_file(&file).expect("inspect file"));
        ensure_dir(&root.join("folder")).expect("create folder");
        assert!(!file_is_file(&root.join("folder")).expect("inspect folder"));
    }
}
