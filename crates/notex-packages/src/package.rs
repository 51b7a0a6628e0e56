//! A single installed package: version choice, config, resources and plugins.
//!
//! # Loading
//!
//! [`Package::new`] only resolves the version. [`Package::load`] reads and
//! validates `config.json`, computes the package signature, reads the text
//! files, builds the resources and instantiates the plugins. The loaded state
//! is stored only when every step succeeded.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{ContentCache, FileCache};
use crate::config::LoaderConfig;
use crate::digest::{sha256_hex_file, sha256_hex_str};
use crate::error::{PackageError, PackageResult};
use crate::fs_util::list_files;
use crate::license::{LicenseTable, UNKNOWN_LICENSE_TEXT};
use crate::names::unique_package_name;
use crate::plugin::{Configuration, Options, PluginLoader, PluginRegistry, PluginSet};
use crate::resource::{get_resources, ResourceDecl, ResourceEnv, ResourceSet};
use crate::schema::PackageConfig;
use crate::version::{VersionResolver, VersionStore};

/// Name of the package configuration file inside a version directory.
pub const CONFIG_FILE: &str = "config.json";

/// License holder used until package index metadata provides one.
pub const UNKNOWN_AUTHOR: &str = "??";

/// Which package and version range a caller wants, plus its options.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRequest {
    pub name: String,
    pub version_request: String,
    pub options: Options,
}

impl PackageRequest {
    pub fn new(name: impl Into<String>, version_request: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_request: version_request.into(),
            options: Options::new(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

/// Shared collaborators for loading packages.
#[derive(Clone)]
pub struct LoadContext {
    resolver: VersionResolver,
    resources: Arc<ResourceEnv>,
    registry: Arc<PluginRegistry>,
    licenses: Arc<LicenseTable>,
}

impl std::fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContext")
            .field("resolver", &self.resolver)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

impl LoadContext {
    pub fn new(
        config: &LoaderConfig,
        cache: Arc<dyn ContentCache>,
        registry: Arc<PluginRegistry>,
        licenses: Arc<LicenseTable>,
    ) -> Self {
        Self {
            resolver: VersionResolver::new(VersionStore::new(&config.packages_dir)),
            resources: Arc::new(ResourceEnv::new(&config.tmp_dir, cache)),
            registry,
            licenses,
        }
    }

    /// Context with a [`FileCache`], an empty registry and the built-in licenses.
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(
            config,
            Arc::new(FileCache::new(&config.cache_dir)),
            Arc::new(PluginRegistry::new()),
            Arc::new(LicenseTable::builtin()),
        )
    }

    pub fn with_registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_licenses(mut self, licenses: Arc<LicenseTable>) -> Self {
        self.licenses = licenses;
        self
    }

    pub fn with_resolver(mut self, resolver: VersionResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_resource_env(mut self, resources: Arc<ResourceEnv>) -> Self {
        self.resources = resources;
        self
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn licenses(&self) -> &Arc<LicenseTable> {
        &self.licenses
    }
}

/// Metadata recorded when a package is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageMeta {
    pub loaded_at: DateTime<Utc>,
    pub author: String,
    /// `sha256:<hex>` over the package's file manifest.
    pub signature: String,
}

/// Everything a successful [`Package::load`] produced.
#[derive(Debug, Clone)]
pub struct LoadedPackage {
    pub config: PackageConfig,
    pub meta: PackageMeta,
    pub readme: Option<String>,
    pub credits: Option<String>,
    pub license_text: String,
    pub resources: ResourceSet,
    pub plugins: PluginSet,
}

/// An installed package with a resolved version.
#[derive(Debug, Clone)]
pub struct Package {
    request: PackageRequest,
    name: String,
    version: String,
    path: PathBuf,
    ctx: Arc<LoadContext>,
    loaded: Option<LoadedPackage>,
}

impl Package {
    /// Check the name and choose an installed version for `request`.
    pub fn new(request: PackageRequest, ctx: Arc<LoadContext>) -> PackageResult<Self> {
        let name = unique_package_name(&request.name)?;
        let version = ctx.resolver.choose(&name, &request.version_request)?;
        let path = ctx.resolver.store().packages_dir().join(&name).join(&version);
        Ok(Self {
            request,
            name,
            version,
            path,
            ctx,
            loaded: None,
        })
    }

    /// Canonical package name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn version_request(&self) -> &str {
        &self.request.version_request
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &Options {
        &self.request.options
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn loaded(&self) -> Option<&LoadedPackage> {
        self.loaded.as_ref()
    }

    pub(crate) fn loaded_mut(&mut self) -> Option<&mut LoadedPackage> {
        self.loaded.as_mut()
    }

    /// Load the package; a no-op returning the existing state if already loaded.
    pub fn load(&mut self) -> PackageResult<&LoadedPackage> {
        let loaded = match self.loaded.take() {
            Some(loaded) => loaded,
            None => self.read()?,
        };
        let loaded: &LoadedPackage = self.loaded.insert(loaded);
        Ok(loaded)
    }

    fn read(&self) -> PackageResult<LoadedPackage> {
        let declared = self.read_declared()?;
        self.check_identity(&declared)?;

        let meta = PackageMeta {
            loaded_at: Utc::now(),
            author: UNKNOWN_AUTHOR.to_string(),
            signature: self.signature()?,
        };
        let config = PackageConfig::from_declared(&self.name, &declared)?;

        let readme = self.read_text_file(&config.readme)?;
        let credits = self.read_text_file(&config.credits)?;
        let license_text = self.license_text(&config.license, &meta);

        let resources = get_resources(
            &self.name,
            &self.path,
            &ResourceDecl {
                template: config.template.as_deref(),
                styles: &config.styles,
                scripts: &config.scripts,
                static_files: &config.static_files,
                note: None,
            },
            &self.ctx.resources,
        )?;

        let mut loader = PluginLoader::new(
            &self.ctx.registry,
            &self.name,
            Configuration::new(self.request.options.clone()),
        );
        let plugins = loader.load(&config)?;

        info!(
            package = %self.name,
            version = %self.version,
            signature = %meta.signature,
            "loaded package"
        );
        Ok(LoadedPackage {
            config,
            meta,
            readme,
            credits,
            license_text,
            resources,
            plugins,
        })
    }

    fn read_declared(&self) -> PackageResult<serde_json::Map<String, Value>> {
        let config_path = self.path.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&config_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PackageError::invalid_config(
                    &self.name,
                    format!("{} was not found in \"{}\"", CONFIG_FILE, self.path.display()),
                ));
            }
            Err(e) => return Err(PackageError::io(&config_path, e)),
        };
        match serde_json::from_str(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(PackageError::invalid_config(
                &self.name,
                format!("{} is not a JSON object", CONFIG_FILE),
            )),
            Err(e) => Err(PackageError::invalid_config(
                &self.name,
                format!("{} is not valid JSON: {}", CONFIG_FILE, e),
            )),
        }
    }

    fn check_identity(&self, declared: &serde_json::Map<String, Value>) -> PackageResult<()> {
        let name = declared.get("name").and_then(Value::as_str);
        let version = declared.get("version").and_then(Value::as_str);
        let name_matches = name
            .and_then(|n| unique_package_name(n).ok())
            .is_some_and(|n| n == self.name);
        if name_matches && version == Some(self.version.as_str()) {
            return Ok(());
        }
        Err(PackageError::invalid_config(
            &self.name,
            format!(
                "config for {} {} contains mismatching name and/or version: {} {}",
                self.name,
                self.version,
                name.unwrap_or("<missing>"),
                version.unwrap_or("<missing>")
            ),
        ))
    }

    fn read_text_file(&self, file_name: &str) -> PackageResult<Option<String>> {
        let path = self.path.join(file_name);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(package = %self.name, file = file_name, "package text file not found");
                Ok(None)
            }
            Err(e) => Err(PackageError::io(&path, e)),
        }
    }

    fn license_text(&self, key: &str, meta: &PackageMeta) -> String {
        match self
            .ctx
            .licenses
            .render(key, &meta.author, meta.loaded_at.year())
        {
            Some(text) => text,
            None => {
                warn!(
                    package = %self.name,
                    license = key,
                    known = %self.ctx.licenses.keys().collect::<Vec<_>>().join(", "),
                    "not an approved package (unrecognized license)"
                );
                UNKNOWN_LICENSE_TEXT.to_string()
            }
        }
    }

    /// sha256 of every file in the package directory, keyed by relative path.
    pub fn file_signatures(&self) -> PackageResult<BTreeMap<String, String>> {
        let mut signatures = BTreeMap::new();
        for rel in list_files(&self.path)? {
            let path = self.path.join(&rel);
            let digest = sha256_hex_file(&path).map_err(|e| PackageError::io(&path, e))?;
            signatures.insert(rel, digest);
        }
        Ok(signatures)
    }

    /// Hash of the `"<path>\t<sha256>"` manifest of all package files.
    pub fn signature(&self) -> PackageResult<String> {
        let manifest = self
            .file_signatures()?
            .iter()
            .map(|(path, digest)| format!("{}\t{}", path, digest))
            .collect::<Vec<_>>()
            .join("\n");
        let signature = format!("sha256:{}", sha256_hex_str(&manifest));
        debug!(package = %self.name, %signature, "computed package signature");
        Ok(signature)
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
