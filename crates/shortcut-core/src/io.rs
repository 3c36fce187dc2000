use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// A failed generation never leaves a truncated document behind.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Size in bytes of the file at `path`.
pub fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

/// Remove `path` if it exists. Returns whether a file was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Save Video.shortcut");
        atomic_write(&path, b"bplist00").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"bplist00");
        assert_eq!(file_size(&path).unwrap(), 8);
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/nested/doc.shortcut");
        atomic_write(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.shortcut");
        std::fs::write(&path, b"old contents that are longer").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn remove_if_exists_reports_removal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Save Video (Signed).shortcut");
        std::fs::write(&path, b"AEA1").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
        assert!(!remove_if_exists(&path).unwrap());
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b");
        ensure_dir(&path).unwrap();
        ensure_dir(&path).unwrap();
        assert!(path.is_dir());
    }
}
