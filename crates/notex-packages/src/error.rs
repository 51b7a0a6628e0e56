//! Error types for package resolution and loading.

use std::path::PathBuf;

/// Package errors.
///
/// Every variant aborts the current `load()` or resource operation; soft
/// conditions (missing readme, zero-match globs, unknown licenses) are logged
/// instead of being reported through this type.
#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    /// No directory for the package exists in the packages dir.
    #[error(
        "package {name} not found (checked \"{}\" which contains: [{}])",
        .packages_dir.display(),
        .installed.join(", ")
    )]
    NotInstalled {
        name: String,
        packages_dir: PathBuf,
        installed: Vec<String>,
    },

    /// The package is installed, but no version satisfies the request.
    #[error(
        "package {name} has no installed version that satisfies {request} [it has {}]",
        .available.join(", ")
    )]
    VersionRangeMismatch {
        name: String,
        request: String,
        available: Vec<String>,
    },

    /// The version request could not be parsed.
    #[error("invalid version range \"{request}\": {reason}")]
    InvalidVersionRange { request: String, reason: String },

    /// Package name does not follow the naming rules.
    #[error("invalid package name \"{name}\": {reason}")]
    InvalidName { name: String, reason: String },

    /// Schema violation, identity mismatch or plugin contract violation.
    #[error("invalid package config for {package}: {message}")]
    InvalidConfig { package: String, message: String },

    /// A feature that packages may declare but that is not implemented.
    #[error("{package}: {feature} is not implemented")]
    Unsupported { package: String, feature: String },

    /// Resource options violate the resource invariants.
    #[error("invalid resource {resource}: {reason}")]
    InvalidResource { resource: String, reason: String },

    /// A required asset does not exist.
    #[error("{kind} {resource} does not exist at {}", .path.display())]
    MissingResource {
        kind: String,
        resource: String,
        path: PathBuf,
    },

    /// Content cache failure (download, unpack or derived file).
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Filesystem error.
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PackageError {
    pub(crate) fn invalid_config(package: impl ToString, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            package: package.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Whether the error means the package itself is unusable, as opposed to
    /// an environment problem (missing install, IO, cache).
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::Unsupported { .. }
                | Self::InvalidResource { .. }
                | Self::MissingResource { .. }
                | Self::InvalidName { .. }
        )
    }
}

/// Result type for package operations.
pub type PackageResult<T> = Result<T, PackageError>;
