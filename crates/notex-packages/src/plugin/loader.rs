use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::{
    normalize_import_path, Compiler, ConfigClass, Configuration, Linker, Parser, PluginContext,
    PluginInstance, PluginKind, PluginRegistry, Processor, Registration, Renderer, Scope,
    TagHandler,
};
use crate::error::{PackageError, PackageResult};
use crate::schema::PackageConfig;

/// Plugin instances declared by one package.
#[derive(Clone, Default)]
pub struct PluginSet {
    pub parser: Option<Arc<dyn Parser>>,
    pub renderer: Option<Arc<dyn Renderer>>,
    pub config_class: Option<Arc<dyn ConfigClass>>,
    pub pre_processors: Vec<Arc<dyn Processor>>,
    pub compilers: Vec<Arc<dyn Compiler>>,
    pub linkers: Vec<Arc<dyn Linker>>,
    pub post_processors: Vec<Arc<dyn Processor>>,
    /// Declared tag name -> handler.
    pub tags: BTreeMap<String, Arc<dyn TagHandler>>,
}

impl std::fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSet")
            .field("parser", &self.parser.is_some())
            .field("renderer", &self.renderer.is_some())
            .field("config_class", &self.config_class.is_some())
            .field("pre_processors", &self.pre_processors.len())
            .field("compilers", &self.compilers.len())
            .field("linkers", &self.linkers.len())
            .field("post_processors", &self.post_processors.len())
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolves one package's plugin declarations against a [`PluginRegistry`].
///
/// Tag handlers are interned by (scope, normalized import path): declaring
/// the same path under several tag names yields one shared instance. A
/// factory registered for such a path sees the first declared name.
pub struct PluginLoader<'a> {
    registry: &'a PluginRegistry,
    package: &'a str,
    config: Configuration,
    tag_cache: HashMap<(Scope, String), Arc<dyn TagHandler>>,
}

impl<'a> PluginLoader<'a> {
    pub fn new(registry: &'a PluginRegistry, package: &'a str, config: Configuration) -> Self {
        Self {
            registry,
            package,
            config,
            tag_cache: HashMap::new(),
        }
    }

    /// Find the registration for `path`, package scope first.
    pub fn resolve_import(&self, path: &str) -> PackageResult<(Scope, &'a Registration)> {
        self.registry.lookup(self.package, path).ok_or_else(|| {
            let reason = if self.registry.is_empty() {
                "the plugin registry is empty"
            } else {
                "not registered for this package nor globally"
            };
            PackageError::invalid_config(
                self.package,
                format!("could not import \"{}\" ({})", path, reason),
            )
        })
    }

    /// Produce the plugin for `path` and check that it fills `kind`.
    pub fn instantiate(
        &self,
        kind: PluginKind,
        path: &str,
        name: Option<&str>,
    ) -> PackageResult<PluginInstance> {
        let (scope, registration) = self.resolve_import(path)?;
        let instance = match registration {
            Registration::Constructed(instance) => instance.clone(),
            Registration::Factory(factory) => {
                let normalized = normalize_import_path(path);
                let context = PluginContext {
                    package: self.package,
                    kind,
                    name,
                    path: &normalized,
                    config: &self.config,
                };
                factory(&context).map_err(|e| {
                    PackageError::invalid_config(
                        self.package,
                        format!("failed to instantiate {} \"{}\": {:#}", kind, path, e),
                    )
                })?
            }
        };
        if !instance.fits(kind) {
            return Err(self.contract_error(kind, path));
        }
        debug!(package = self.package, %kind, path, ?scope, "loaded plugin");
        Ok(instance)
    }

    fn contract_error(&self, kind: PluginKind, path: &str) -> PackageError {
        PackageError::invalid_config(
            self.package,
            format!("\"{}\" does not implement the {} contract", path, kind),
        )
    }

    pub fn parser(&self, path: &str) -> PackageResult<Arc<dyn Parser>> {
        match self.instantiate(PluginKind::Parser, path, None)? {
            PluginInstance::Parser(parser) => Ok(parser),
            _ => Err(self.contract_error(PluginKind::Parser, path)),
        }
    }

    pub fn renderer(&self, path: &str) -> PackageResult<Arc<dyn Renderer>> {
        match self.instantiate(PluginKind::Renderer, path, None)? {
            PluginInstance::Renderer(renderer) => Ok(renderer),
            _ => Err(self.contract_error(PluginKind::Renderer, path)),
        }
    }

    pub fn config_class(&self, path: &str) -> PackageResult<Arc<dyn ConfigClass>> {
        match self.instantiate(PluginKind::Config, path, None)? {
            PluginInstance::Config(config) => Ok(config),
            _ => Err(self.contract_error(PluginKind::Config, path)),
        }
    }

    pub fn processors(
        &self,
        kind: PluginKind,
        paths: &[String],
    ) -> PackageResult<Vec<Arc<dyn Processor>>> {
        paths
            .iter()
            .map(|path| match self.instantiate(kind, path, None)? {
                PluginInstance::Processor(processor) => Ok(processor),
                _ => Err(self.contract_error(kind, path)),
            })
            .collect()
    }

    pub fn compilers(&self, paths: &[String]) -> PackageResult<Vec<Arc<dyn Compiler>>> {
        paths
            .iter()
            .map(|path| match self.instantiate(PluginKind::Compiler, path, None)? {
                PluginInstance::Compiler(compiler) => Ok(compiler),
                _ => Err(self.contract_error(PluginKind::Compiler, path)),
            })
            .collect()
    }

    pub fn linkers(&self, paths: &[String]) -> PackageResult<Vec<Arc<dyn Linker>>> {
        paths
            .iter()
            .map(|path| match self.instantiate(PluginKind::Linker, path, None)? {
                PluginInstance::Linker(linker) => Ok(linker),
                _ => Err(self.contract_error(PluginKind::Linker, path)),
            })
            .collect()
    }

    /// Handler for one declared tag, reusing an instance already created for the same path.
    pub fn tag(&mut self, name: &str, path: &str) -> PackageResult<Arc<dyn TagHandler>> {
        let (scope, _) = self.resolve_import(path)?;
        let key = (scope, normalize_import_path(path));
        if let Some(handler) = self.tag_cache.get(&key) {
            return Ok(handler.clone());
        }
        let handler = match self.instantiate(PluginKind::Tag, path, Some(name))? {
            PluginInstance::Tag(handler) => handler,
            _ => return Err(self.contract_error(PluginKind::Tag, path)),
        };
        self.tag_cache.insert(key, handler.clone());
        Ok(handler)
    }

    pub fn tags(
        &mut self,
        declared: &BTreeMap<String, String>,
    ) -> PackageResult<BTreeMap<String, Arc<dyn TagHandler>>> {
        let mut tags = BTreeMap::new();
        for (name, path) in declared {
            tags.insert(name.clone(), self.tag(name, path)?);
        }
        Ok(tags)
    }

    /// Instantiate everything `config` declares.
    pub fn load(&mut self, config: &PackageConfig) -> PackageResult<PluginSet> {
        Ok(PluginSet {
            parser: config.parser.as_deref().map(|p| self.parser(p)).transpose()?,
            renderer: config.renderer.as_deref().map(|p| self.renderer(p)).transpose()?,
            config_class: config.config.as_deref().map(|p| self.config_class(p)).transpose()?,
            pre_processors: self.processors(PluginKind::PreProcessor, &config.pre_processors)?,
            compilers: self.compilers(&config.compilers)?,
            linkers: self.linkers(&config.linkers)?,
            post_processors: self.processors(PluginKind::PostProcessor, &config.post_processors)?,
            tags: self.tags(&config.tags)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_same_path_same_instance() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut registry = PluginRegistry::new();
        registry.register(
            "demo.tags.Note",
            Registration::factory(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(PluginInstance::Tag(Arc::new(Note { final_handler: false })))
            }),
        );
        let mut loader = PluginLoader::new(&registry, "demo", Configuration::default());
        let loaded = loader
            .tags(&tags(&[("note", "demo.tags.Note"), ("aside", "demo::tags::Note ")]))
            .unwrap();
        assert!(Arc::ptr_eq(&loaded["note"], &loaded["aside"]));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_import_is_config_error() {
        let registry = PluginRegistry::new();
        let loader = PluginLoader::new(&registry, "demo", Configuration::default());
        let Err(err) = loader.parser("demo.Missing") else {
            panic!("demo.Missing should not load as a parser");
        };
        assert!(err.to_string().contains("could not import \"demo.Missing\""));
        assert!(err.to_string().contains("the plugin registry is empty"));

        let mut registry = PluginRegistry::new();
        registry.register_scoped("other", "demo.Missing", Registration::parser(TextParser));
        let loader = PluginLoader::new(&registry, "demo", Configuration::default());
        let Err(err) = loader.parser("demo.Missing") else {
            panic!("a registration scoped to another package should not be visible");
        };
        assert!(err.to_string().contains("not registered for this package nor globally"));
    }

    #[test]
    fn test_wrong_kind_violates_contract() {
        let mut registry = PluginRegistry::new();
        registry.register("demo.Upper", Registration::processor(Upper));
        let loader = PluginLoader::new(&registry, "demo", Configuration::default());
        let Err(err) = loader.parser("demo.Upper") else {
            panic!("demo.Upper should not load as a parser");
        };
        assert!(err.to_string().contains("does not implement the parser contract"));
        assert_eq!(
            loader
                .processors(PluginKind::PostProcessor, &["demo.Upper".to_string()])
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_factory_failure_is_wrapped() {
        let mut registry = PluginRegistry::new();
        registry.register(
            "demo.Strict",
            Registration::factory(|ctx| {
                match ctx.config.get("strict").and_then(|v| v.as_bool()) {
                    Some(true) => Ok(PluginInstance::Parser(Arc::new(TextParser))),
                    _ => anyhow::bail!("option \"strict\" must be true"),
                }
            }),
        );
        let loader = PluginLoader::new(&registry, "demo", Configuration::default());
        let Err(err) = loader.parser("demo.Strict") else {
            panic!("demo.Strict should not load as a parser");
        };
        assert!(err.is_config_error());
        assert!(err.to_string().contains("option \"strict\" must be true"));

        let mut options = serde_json::Map::new();
        options.insert("strict".into(), serde_json::Value::Bool(true));
        let loader = PluginLoader::new(&registry, "demo", Configuration::new(options));
        assert!(loader.parser("demo.Strict").is_ok());
    }

    #[test]
    fn test_scope_shadows_global_for_tags() {
        let mut registry = PluginRegistry::new();
        registry
            .register("shared.Note", Registration::tag(Note { final_handler: false }))
            .register_scoped(
                "demo",
                "shared.Note",
                Registration::tag(Note { final_handler: true }),
            );

        let mut demo = PluginLoader::new(&registry, "demo", Configuration::default());
        assert!(demo.tag("note", "shared.Note").unwrap().final_handler());

        let mut other = PluginLoader::new(&registry, "other", Configuration::default());
        assert!(!other.tag("note", "shared.Note").unwrap().final_handler());
    }
}
