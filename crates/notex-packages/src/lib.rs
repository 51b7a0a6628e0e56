//! Package resolution, plugin loading and build resources for notex documents.
//!
//! This crate provides:
//!
//! - Version resolution against `packages_dir/<name>/<version>/` directories
//! - `config.json` validation with required, default and functional keys
//! - A plugin registry (package-scoped over global) replacing import paths
//! - Resources (local, remote, archive) with offline copies, minification
//!   and change-detecting copy into build output
//! - Aggregation of several packages with override and `final` semantics
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use notex_packages::{LoadContext, LoaderConfig, Package, PackageList, PackageRequest};
//!
//! # fn example() -> notex_packages::PackageResult<()> {
//! let ctx = Arc::new(LoadContext::from_config(&LoaderConfig::from_env()?));
//!
//! let package = Package::new(PackageRequest::new("demo", ">=1.0, <2.0"), ctx)?;
//! let mut packages = PackageList::new();
//! packages.add_package(package)?;
//!
//! for style in packages.styles(true, true)? {
//!     println!("{}", style.html()?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `NOTEX_PACKAGE_DIR` | Installed packages (default: per-user data dir `ntp`) |
//! | `NOTEX_TMP_DIR` | Offline and minified resource copies (default: `<tmp>/notex`) |
//! | `NOTEX_CACHE_DIR` | Downloads, unpacked archives, derived files (default: user cache dir) |

pub mod cache;
pub mod config;
mod digest;
pub mod error;
mod fs_util;
pub mod license;
pub mod names;
pub mod package;
pub mod packages;
pub mod plugin;
pub mod resource;
pub mod schema;
pub mod version;

// Re-export main types
pub use cache::{CacheMeta, CacheRequest, ContentCache, Fetcher, FileCache, LocalFetcher};
#[cfg(feature = "http")]
pub use cache::HttpFetcher;
pub use config::{package_dir, LoaderConfig};
pub use error::{PackageError, PackageResult};
pub use license::{LicenseTable, UNKNOWN_LICENSE_TEXT};
pub use names::{is_external, unique_package_name};
pub use package::{LoadContext, LoadedPackage, Package, PackageMeta, PackageRequest};
pub use packages::{PackageList, Singleton, TagEntry};
pub use plugin::{
    Compiler, ConfigClass, Configuration, Element, Linker, Node, Parser, PluginContext,
    PluginInstance, PluginKind, PluginLoader, PluginRegistry, PluginSet, Processor,
    Registration, Renderer, Scope, TagHandler,
};
pub use resource::{
    get_resources, CopyStats, CssMinifier, JsMinifier, Minifier, Provenance, Resource,
    ResourceDecl, ResourceEnv, ResourceKind, ResourceOptions, ResourceSet, ResourceSpec,
};
pub use schema::{config_add_defaults, ConfigSchema, FinalSlot, PackageConfig};
pub use version::{SemverMatcher, VersionMatcher, VersionResolver, VersionStore};
