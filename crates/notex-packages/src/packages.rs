//! Ordered aggregation of loaded packages.
//!
//! Later packages override earlier ones for singleton slots (parser,
//! renderer, configuration class, template) unless the earlier choice came
//! from a package that lists the slot as `final`. Sequence slots are
//! concatenated in package order. Tags are kept per name, both bare and
//! prefixed with the package name.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::PackageResult;
use crate::package::{LoadedPackage, Package};
use crate::plugin::{Compiler, ConfigClass, Linker, Parser, Processor, Renderer, TagHandler};
use crate::resource::{CopyStats, Resource, ResourceKind, ResourceSet};
use crate::schema::FinalSlot;

/// Outcome of resolving a singleton slot.
#[derive(Debug, Clone)]
pub struct Singleton<T> {
    /// Chosen value, or the fallback if no package provides one.
    pub value: Option<T>,

    /// Package the value came from (`None` for the fallback).
    pub provided_by: Option<String>,

    /// Packages whose value was rejected because of a `final` lock.
    pub rejected: Vec<String>,
}

/// A tag handler registered under one name.
#[derive(Clone)]
pub struct TagEntry {
    pub package: String,
    /// Tag name as declared by the package.
    pub tag: String,
    pub handler: Arc<dyn TagHandler>,
}

impl std::fmt::Debug for TagEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagEntry")
            .field("package", &self.package)
            .field("tag", &self.tag)
            .field("final_handler", &self.handler.final_handler())
            .finish()
    }
}

/// Packages in precedence order (later overrides earlier).
#[derive(Debug, Clone, Default)]
pub struct PackageList {
    packages: Vec<Package>,
}

impl PackageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> PackageResult<Self> {
        let mut list = Self::new();
        for package in packages {
            list.add_package(package)?;
        }
        Ok(list)
    }

    /// Append a package, loading it first if needed.
    pub fn add_package(&mut self, mut package: Package) -> PackageResult<()> {
        if !package.is_loaded() {
            info!(package = %package, "auto-loading package");
            package.load()?;
        }
        self.packages.push(package);
        Ok(())
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn loaded(&self) -> impl Iterator<Item = (&Package, &LoadedPackage)> {
        self.packages
            .iter()
            .filter_map(|package| package.loaded().map(|loaded| (package, loaded)))
    }

    /// Last package providing a value wins, unless an earlier provider locked `slot`.
    pub fn choose_singleton<'a, T>(
        &'a self,
        slot: FinalSlot,
        get: impl Fn(&'a LoadedPackage) -> Option<T>,
        fallback: Option<T>,
    ) -> Singleton<T> {
        let mut chosen: Option<(T, &str, bool)> = None;
        let mut rejected = Vec::new();

        for (package, loaded) in self.loaded() {
            let Some(value) = get(loaded) else {
                continue;
            };
            if let Some((_, provider, true)) = &chosen {
                warn!(
                    %slot,
                    kept = %provider,
                    rejected = %package.name(),
                    "not overriding {} of a package that declared it final", slot
                );
                rejected.push(package.name().to_string());
                continue;
            }
            if let Some((_, provider, _)) = &chosen {
                debug!(%slot, from = %provider, to = %package.name(), "overriding");
            }
            chosen = Some((value, package.name(), loaded.config.is_final(slot)));
        }

        match chosen {
            Some((value, provider, _)) => Singleton {
                value: Some(value),
                provided_by: Some(provider.to_string()),
                rejected,
            },
            None => Singleton {
                value: fallback,
                provided_by: None,
                rejected,
            },
        }
    }

    pub fn parser(&self, fallback: Option<Arc<dyn Parser>>) -> Singleton<Arc<dyn Parser>> {
        self.choose_singleton(FinalSlot::Parser, |l| l.plugins.parser.clone(), fallback)
    }

    pub fn renderer(&self, fallback: Option<Arc<dyn Renderer>>) -> Singleton<Arc<dyn Renderer>> {
        self.choose_singleton(FinalSlot::Renderer, |l| l.plugins.renderer.clone(), fallback)
    }

    pub fn config_class(
        &self,
        fallback: Option<Arc<dyn ConfigClass>>,
    ) -> Singleton<Arc<dyn ConfigClass>> {
        self.choose_singleton(FinalSlot::Config, |l| l.plugins.config_class.clone(), fallback)
    }

    pub fn template<'a>(&'a self, fallback: Option<&'a Resource>) -> Singleton<&'a Resource> {
        self.choose_singleton(FinalSlot::Template, |l| l.resources.template.as_ref(), fallback)
    }

    pub fn pre_processors(&self) -> Vec<Arc<dyn Processor>> {
        self.loaded()
            .flat_map(|(_, l)| l.plugins.pre_processors.iter().cloned())
            .collect()
    }

    pub fn compilers(&self) -> Vec<Arc<dyn Compiler>> {
        self.loaded()
            .flat_map(|(_, l)| l.plugins.compilers.iter().cloned())
            .collect()
    }

    pub fn linkers(&self) -> Vec<Arc<dyn Linker>> {
        self.loaded()
            .flat_map(|(_, l)| l.plugins.linkers.iter().cloned())
            .collect()
    }

    pub fn post_processors(&self) -> Vec<Arc<dyn Processor>> {
        self.loaded()
            .flat_map(|(_, l)| l.plugins.post_processors.iter().cloned())
            .collect()
    }

    /// Tag handlers by name. Each tag is registered as `tag` and `{package}-{tag}`;
    /// a registration is dropped when the name already has a final handler.
    pub fn tags(&self) -> BTreeMap<String, Vec<TagEntry>> {
        let mut tags: BTreeMap<String, Vec<TagEntry>> = BTreeMap::new();
        for (package, loaded) in self.loaded() {
            for (tag, handler) in &loaded.plugins.tags {
                for name in [tag.clone(), format!("{}-{}", package.name(), tag)] {
                    let entries = tags.entry(name).or_default();
                    if let Some(blocking) = entries.iter().find(|e| e.handler.final_handler()) {
                        info!(
                            tag = %tag,
                            package = %package.name(),
                            final_from = %blocking.package,
                            "tag handler dropped; existing handler is final"
                        );
                        continue;
                    }
                    entries.push(TagEntry {
                        package: package.name().to_string(),
                        tag: tag.clone(),
                        handler: handler.clone(),
                    });
                }
            }
        }
        tags
    }

    fn resources(
        &mut self,
        kind: ResourceKind,
        offline: bool,
        minify: bool,
    ) -> PackageResult<Vec<&Resource>> {
        for package in &mut self.packages {
            let Some(loaded) = package.loaded_mut() else {
                continue;
            };
            for resource in resources_of_mut(&mut loaded.resources, kind) {
                if offline {
                    resource.make_offline()?;
                }
                if minify {
                    resource.minify()?;
                }
            }
        }
        Ok(self
            .loaded()
            .flat_map(|(_, l)| resources_of(&l.resources, kind))
            .collect())
    }

    /// Styles of all packages, optionally made offline and minified.
    pub fn styles(&mut self, offline: bool, minify: bool) -> PackageResult<Vec<&Resource>> {
        self.resources(ResourceKind::Style, offline, minify)
    }

    pub fn scripts(&mut self, offline: bool, minify: bool) -> PackageResult<Vec<&Resource>> {
        self.resources(ResourceKind::Script, offline, minify)
    }

    pub fn static_files(&mut self, offline: bool, minify: bool) -> PackageResult<Vec<&Resource>> {
        self.resources(ResourceKind::Static, offline, minify)
    }

    /// Copy every style, script and static file into `to`.
    pub fn copy_resources(&self, to: &Path) -> PackageResult<CopyStats> {
        let mut stats = CopyStats::default();
        for (_, loaded) in self.loaded() {
            for resource in loaded.resources.linked_and_static() {
                stats += resource.copy(to)?;
            }
        }
        debug!(written = stats.written, skipped = stats.skipped, "copied package resources");
        Ok(stats)
    }
}

fn resources_of(set: &ResourceSet, kind: ResourceKind) -> &[Resource] {
    match kind {
        ResourceKind::Template => set.template.as_slice(),
        ResourceKind::Style => &set.styles,
        ResourceKind::Script => &set.scripts,
        ResourceKind::Static => &set.static_files,
    }
}

fn resources_of_mut(set: &mut ResourceSet, kind: ResourceKind) -> &mut [Resource] {
    match kind {
        ResourceKind::Template => set.template.as_mut_slice(),
        ResourceKind::Style => &mut set.styles,
        ResourceKind::Script => &mut set.scripts,
        ResourceKind::Static => &mut set.static_files,
    }
}
