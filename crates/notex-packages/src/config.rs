//! Loader configuration: where packages live, where build temp files and
//! cached downloads go.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{PackageError, PackageResult};

/// Environment variable overriding the package directory.
pub const PACKAGE_DIR_ENV: &str = "NOTEX_PACKAGE_DIR";

/// Environment variable overriding the build temp directory.
pub const TMP_DIR_ENV: &str = "NOTEX_TMP_DIR";

/// Environment variable overriding the content cache directory.
pub const CACHE_DIR_ENV: &str = "NOTEX_CACHE_DIR";

/// Directories used while loading packages and producing resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Root containing `<name>/<version>/` package directories.
    pub packages_dir: PathBuf,

    /// Scratch directory for offline copies and processed (minified) files.
    pub tmp_dir: PathBuf,

    /// Content cache directory (downloads, unpacked archives, derived files).
    pub cache_dir: PathBuf,
}

impl LoaderConfig {
    /// Create config with explicit directories.
    pub fn new(
        packages_dir: impl Into<PathBuf>,
        tmp_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            packages_dir: packages_dir.into(),
            tmp_dir: tmp_dir.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `NOTEX_PACKAGE_DIR` | Installed packages (default: per-user data dir `ntp`) |
    /// | `NOTEX_TMP_DIR` | Build scratch files (default: `<tmp>/notex`) |
    /// | `NOTEX_CACHE_DIR` | Content cache (default: per-user cache dir `notex`) |
    pub fn from_env() -> PackageResult<Self> {
        Ok(Self {
            packages_dir: package_dir()?,
            tmp_dir: std::env::var_os(TMP_DIR_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("notex")),
            cache_dir: match std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
                Some(dir) => PathBuf::from(dir),
                None => default_cache_dir()?,
            },
        })
    }

    /// Set the packages directory.
    pub fn with_packages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.packages_dir = dir.into();
        self
    }

    /// Set the temp directory.
    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = dir.into();
        self
    }

    /// Set the cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }
}

/// Get the directory in which packages are installed.
///
/// Uses `NOTEX_PACKAGE_DIR` if it points at an existing directory; otherwise
/// falls back to the per-user data directory, creating it on first use.
pub fn package_dir() -> PackageResult<PathBuf> {
    if let Some(env_path) = std::env::var_os(PACKAGE_DIR_ENV) {
        let env_path = PathBuf::from(env_path);
        if env_path.is_dir() {
            return Ok(env_path);
        }
    }

    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| PackageError::Io {
            path: PathBuf::from("ntp"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine user data directory",
            ),
        })?;
    let default_path = base.join("ntp");
    ensure_package_dir(&default_path)?;
    Ok(default_path)
}

fn ensure_package_dir(path: &Path) -> PackageResult<()> {
    if path.is_dir() {
        return Ok(());
    }
    warn!(
        path = %path.display(),
        "package path not set in {} and default location does not exist; it will be created \
         (this is normal if you're running for the first time)",
        PACKAGE_DIR_ENV
    );
    std::fs::create_dir_all(path).map_err(|e| PackageError::io(path, e))
}

fn default_cache_dir() -> PackageResult<PathBuf> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| PackageError::cache("could not determine cache directory"))?;
    Ok(base.join("notex"))
}
