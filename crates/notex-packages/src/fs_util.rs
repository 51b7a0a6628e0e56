//! Filesystem helpers shared by the cache, resources and package signatures.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{PackageError, PackageResult};

pub(crate) fn ensure_dir(path: &Path) -> PackageResult<()> {
    fs::create_dir_all(path).map_err(|e| PackageError::io(path, e))
}

/// Write `content` to `path` through a temp file and rename.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> PackageResult<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let temp_path = temp_sibling(path);
    fs::write(&temp_path, content).map_err(|e| PackageError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| PackageError::io(path, e))
}

/// A unique path next to `path` for staging writes before a rename.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

/// Relative paths (with `/` separators) of all files below `dir`, sorted.
pub(crate) fn list_files(dir: &Path) -> PackageResult<Vec<String>> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files).map_err(|e| PackageError::io(dir, e))?;
    files.sort();
    Ok(files)
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() || (file_type.is_symlink() && path.is_dir()) {
            collect_files(base, &path, out)?;
        } else if path.is_file() {
            if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}

/// Make `src` available at `dst`, hard-linking when allowed and possible and
/// copying otherwise. Directories are copied recursively.
///
/// With `exist_ok`, an existing destination is left alone; without it, an
/// existing destination file is replaced.
pub(crate) fn link_or_copy(
    src: &Path,
    dst: &Path,
    allow_linking: bool,
    exist_ok: bool,
) -> PackageResult<()> {
    if dst.exists() {
        if exist_ok {
            return Ok(());
        }
        if dst.is_file() {
            fs::remove_file(dst).map_err(|e| PackageError::io(dst, e))?;
        }
    }
    if let Some(parent) = dst.parent() {
        ensure_dir(parent)?;
    }
    if src.is_dir() {
        return copy_dir(src, dst);
    }
    if allow_linking && fs::hard_link(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst).map_err(|e| PackageError::io(src, e))?;
    Ok(())
}

fn copy_dir(src: &Path, dst: &Path) -> PackageResult<()> {
    ensure_dir(dst)?;
    for rel in list_files(src)? {
        let target = dst.join(&rel);
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        let source = src.join(&rel);
        fs::copy(&source, &target).map_err(|e| PackageError::io(&source, e))?;
    }
    Ok(())
}

/// Whether `dst` exists and is at least as new as `src`.
pub(crate) fn is_up_to_date(src: &Path, dst: &Path) -> PackageResult<bool> {
    let Ok(dst_meta) = fs::metadata(dst) else {
        return Ok(false);
    };
    let src_meta = fs::metadata(src).map_err(|e| PackageError::io(src, e))?;
    match (dst_meta.modified(), src_meta.modified()) {
        (Ok(dst_time), Ok(src_time)) => Ok(dst_time >= src_time),
        _ => Ok(false),
    }
}
