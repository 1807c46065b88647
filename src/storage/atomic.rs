use std::fs::{self, File};
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes a file by filling a temp file next to it and renaming it into place
///
/// The temp file lives in the destination directory so the rename never
/// crosses filesystems. Data is synced before the rename; on any error the
/// temp file is removed and the destination is left untouched.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Removes a file, treating "already gone" as success
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_write_atomically_creates_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");

        write_atomically(&path, |f| f.write_all(b"first")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first");

        write_atomically(&path, |f| f.write_all(b"second")).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_failed_write_keeps_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_atomically(&path, |f| f.write_all(b"good")).unwrap();

        let result = write_atomically(&path, |f| {
            f.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "good");

        // Only the destination remains; the temp file was cleaned up
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");

        assert!(remove_if_exists(&path).is_ok());

        fs::write(&path, "x").unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}
