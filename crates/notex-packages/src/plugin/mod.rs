//! Plugin contracts and the import-path registry.
//!
//! Packages name their parser, renderer, processors, compilers, linkers, tag
//! handlers and configuration class by import path (`"demo.tags.Note"`).
//! Implementations are registered under those paths at startup, either
//! globally or scoped to one package; package-scoped entries shadow global
//! ones with the same path.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

mod loader;

pub use loader::{PluginLoader, PluginSet};

/// Package options handed to plugins.
pub type Options = Map<String, Value>;

/// Configuration object plugins are constructed with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    options: Options,
}

impl Configuration {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }
}

/// Document node passed between parser, compilers, linkers and renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Element(Element),
}

/// Markup element handled by tag handlers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<Node>,
}

pub trait Parser: Send + Sync {
    fn parse(&self, source: &str) -> anyhow::Result<Vec<Node>>;
}

pub trait Renderer: Send + Sync {
    fn render(&self, nodes: &[Node]) -> anyhow::Result<String>;
}

/// Text-to-text step, used both before parsing and after rendering.
pub trait Processor: Send + Sync {
    fn process(&self, text: &str) -> anyhow::Result<String>;
}

pub trait Compiler: Send + Sync {
    fn compile(&self, nodes: Vec<Node>) -> anyhow::Result<Vec<Node>>;
}

pub trait Linker: Send + Sync {
    fn link(&self, nodes: Vec<Node>) -> anyhow::Result<Vec<Node>>;
}

/// Handler bound to a markup tag.
pub trait TagHandler: Send + Sync {
    /// Whether the tag body may itself contain tags.
    fn can_contain_tags(&self) -> bool {
        false
    }

    fn can_use_substitutions(&self) -> bool {
        true
    }

    /// A final handler blocks later registrations for the same tag name.
    fn final_handler(&self) -> bool {
        false
    }

    fn handle(&self, element: &Element) -> anyhow::Result<Vec<Node>>;
}

/// Package-provided configuration class.
pub trait ConfigClass: Send + Sync {
    /// Extra command-line arguments the package understands.
    fn command_arguments(&self) -> Vec<String> {
        Vec::new()
    }

    /// Turn parsed arguments into options.
    fn parse_command_arguments(&self, args: &[String]) -> anyhow::Result<Options> {
        let _ = args;
        Ok(Options::new())
    }
}

/// Plugin slot a declaration fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PluginKind {
    Parser,
    Renderer,
    Config,
    PreProcessor,
    Compiler,
    Linker,
    PostProcessor,
    Tag,
}

impl PluginKind {
    /// Config key the slot is declared under.
    pub fn config_key(&self) -> &'static str {
        match self {
            PluginKind::Parser => "parser",
            PluginKind::Renderer => "renderer",
            PluginKind::Config => "config",
            PluginKind::PreProcessor => "pre_processors",
            PluginKind::Compiler => "compilers",
            PluginKind::Linker => "linkers",
            PluginKind::PostProcessor => "post_processors",
            PluginKind::Tag => "tags",
        }
    }
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PluginKind::Parser => "parser",
            PluginKind::Renderer => "renderer",
            PluginKind::Config => "configuration",
            PluginKind::PreProcessor => "pre-processor",
            PluginKind::Compiler => "compiler",
            PluginKind::Linker => "linker",
            PluginKind::PostProcessor => "post-processor",
            PluginKind::Tag => "tag handler",
        };
        f.write_str(name)
    }
}

/// A constructed plugin.
#[derive(Clone)]
pub enum PluginInstance {
    Parser(Arc<dyn Parser>),
    Renderer(Arc<dyn Renderer>),
    Config(Arc<dyn ConfigClass>),
    Processor(Arc<dyn Processor>),
    Compiler(Arc<dyn Compiler>),
    Linker(Arc<dyn Linker>),
    Tag(Arc<dyn TagHandler>),
}

impl PluginInstance {
    /// Whether this instance can fill `kind`.
    pub fn fits(&self, kind: PluginKind) -> bool {
        matches!(
            (self, kind),
            (PluginInstance::Parser(_), PluginKind::Parser)
                | (PluginInstance::Renderer(_), PluginKind::Renderer)
                | (PluginInstance::Config(_), PluginKind::Config)
                | (PluginInstance::Processor(_), PluginKind::PreProcessor)
                | (PluginInstance::Processor(_), PluginKind::PostProcessor)
                | (PluginInstance::Compiler(_), PluginKind::Compiler)
                | (PluginInstance::Linker(_), PluginKind::Linker)
                | (PluginInstance::Tag(_), PluginKind::Tag)
        )
    }

    fn describe(&self) -> &'static str {
        match self {
            PluginInstance::Parser(_) => "parser",
            PluginInstance::Renderer(_) => "renderer",
            PluginInstance::Config(_) => "configuration",
            PluginInstance::Processor(_) => "processor",
            PluginInstance::Compiler(_) => "compiler",
            PluginInstance::Linker(_) => "linker",
            PluginInstance::Tag(_) => "tag handler",
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginInstance({})", self.describe())
    }
}

/// What a plugin factory sees when it is asked to build an instance.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    /// Package the declaration belongs to.
    pub package: &'a str,
    pub kind: PluginKind,
    /// Declared tag name (tags only).
    pub name: Option<&'a str>,
    /// Normalized import path.
    pub path: &'a str,
    pub config: &'a Configuration,
}

/// Constructor closure for a plugin.
pub type PluginFactory =
    Arc<dyn Fn(&PluginContext<'_>) -> anyhow::Result<PluginInstance> + Send + Sync>;

/// How an import path turns into an instance, decided at registration time.
#[derive(Clone)]
pub enum Registration {
    /// Shared ready-made instance.
    Constructed(PluginInstance),

    /// Built per declaration with the package configuration.
    Factory(PluginFactory),
}

impl Registration {
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&PluginContext<'_>) -> anyhow::Result<PluginInstance> + Send + Sync + 'static,
    {
        Registration::Factory(Arc::new(f))
    }

    pub fn parser(parser: impl Parser + 'static) -> Self {
        Registration::Constructed(PluginInstance::Parser(Arc::new(parser)))
    }

    pub fn renderer(renderer: impl Renderer + 'static) -> Self {
        Registration::Constructed(PluginInstance::Renderer(Arc::new(renderer)))
    }

    pub fn processor(processor: impl Processor + 'static) -> Self {
        Registration::Constructed(PluginInstance::Processor(Arc::new(processor)))
    }

    pub fn compiler(compiler: impl Compiler + 'static) -> Self {
        Registration::Constructed(PluginInstance::Compiler(Arc::new(compiler)))
    }

    pub fn linker(linker: impl Linker + 'static) -> Self {
        Registration::Constructed(PluginInstance::Linker(Arc::new(linker)))
    }

    pub fn tag(handler: impl TagHandler + 'static) -> Self {
        Registration::Constructed(PluginInstance::Tag(Arc::new(handler)))
    }

    pub fn config(config: impl ConfigClass + 'static) -> Self {
        Registration::Constructed(PluginInstance::Config(Arc::new(config)))
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Registration::Constructed(instance) => {
                f.debug_tuple("Constructed").field(instance).finish()
            }
            Registration::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// Namespace an import path was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Package(String),
    Global,
}

/// Canonical form of an import path: trimmed, with `::` treated as `.`.
pub fn normalize_import_path(path: &str) -> String {
    path.trim().replace("::", ".")
}

/// Import path -> registration, with package scopes layered over a global scope.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    global: HashMap<String, Registration>,
    scoped: HashMap<String, HashMap<String, Registration>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a globally visible plugin.
    pub fn register(&mut self, path: &str, registration: Registration) -> &mut Self {
        self.global.insert(normalize_import_path(path), registration);
        self
    }

    /// Register a plugin only visible to `package`.
    pub fn register_scoped(
        &mut self,
        package: &str,
        path: &str,
        registration: Registration,
    ) -> &mut Self {
        self.scoped
            .entry(package.to_string())
            .or_default()
            .insert(normalize_import_path(path), registration);
        self
    }

    /// Look `path` up for `package`: package scope first, then global.
    pub fn lookup(&self, package: &str, path: &str) -> Option<(Scope, &Registration)> {
        let path = normalize_import_path(path);
        if let Some(found) = self.scoped.get(package).and_then(|s| s.get(&path)) {
            return Some((Scope::Package(package.to_string()), found));
        }
        self.global.get(&path).map(|found| (Scope::Global, found))
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.scoped.values().all(HashMap::is_empty)
    }
}
