use std::fs::File;
use std::path::Path;

use zip::ZipArchive;

use crate::error::{PackageError, PackageResult};
use crate::fs_util::ensure_dir;

/// Extract a zip archive into `dst`, rejecting entries that escape it.
pub(super) fn unzip(archive_path: &Path, dst: &Path) -> PackageResult<()> {
    let file = File::open(archive_path).map_err(|e| PackageError::io(archive_path, e))?;
    let mut zip = ZipArchive::new(file).map_err(|e| {
        PackageError::cache(format!(
            "invalid zip archive {}: {}",
            archive_path.display(),
            e
        ))
    })?;
    ensure_dir(dst)?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| PackageError::cache(format!("corrupt archive entry {}: {}", i, e)))?;
        let rel = entry.enclosed_name().ok_or_else(|| {
            PackageError::cache(format!(
                "unsafe path in archive entry: {} ({})",
                entry.name(),
                archive_path.display()
            ))
        })?;
        let out = dst.join(rel);
        if entry.is_dir() {
            ensure_dir(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            ensure_dir(parent)?;
        }
        let mut writer = File::create(&out).map_err(|e| PackageError::io(&out, e))?;
        std::io::copy(&mut entry, &mut writer).map_err(|e| PackageError::io(&out, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheRequest, ContentCache, FileCache, LocalFetcher};
    use std::fs;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_unpack_through_cache_is_memoized() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("lib.zip");
        write_zip(&archive, &[("lib/a.css", "a{}"), ("lib/b/c.js", "c()")]);

        let cache = FileCache::with_fetcher(temp.path().join("cache"), Arc::new(LocalFetcher));
        let dir = cache.get_or_create_file(CacheRequest::Unpack(&archive)).unwrap();
        assert_eq!(fs::read_to_string(dir.join("lib/a.css")).unwrap(), "a{}");
        assert_eq!(fs::read_to_string(dir.join("lib/b/c.js")).unwrap(), "c()");

        let again = cache.get_or_create_file(CacheRequest::Unpack(&archive)).unwrap();
        assert_eq!(dir, again);
    }

    #[test]
    fn test_invalid_archive_is_cache_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        fs::write(&archive, "not a zip").unwrap();
        let err = unzip(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, PackageError::Cache { .. }));
    }
}
