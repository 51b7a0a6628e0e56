//! Integration tests for Package resolution and loading.
//!
//! Packages are installed into a temp `packages_dir`; remote content is
//! served through `file://` URLs so nothing touches the network.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use notex_packages::{
    FileCache, LicenseTable, LoadContext, LoaderConfig, LocalFetcher, Minifier, Package,
    PackageError, PackageList, PackageRequest, PluginRegistry, Provenance, ResourceEnv,
};
use serde_json::{json, Value};
use tempfile::TempDir;

struct Env {
    temp: TempDir,
    config: LoaderConfig,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let config = LoaderConfig::new(
            temp.path().join("packages"),
            temp.path().join("tmp"),
            temp.path().join("cache"),
        );
        fs::create_dir_all(&config.packages_dir).unwrap();
        Self { temp, config }
    }

    fn cache(&self) -> Arc<FileCache> {
        Arc::new(FileCache::with_fetcher(&self.config.cache_dir, Arc::new(LocalFetcher)))
    }

    fn context(&self) -> Arc<LoadContext> {
        Arc::new(LoadContext::new(
            &self.config,
            self.cache(),
            Arc::new(PluginRegistry::new()),
            Arc::new(LicenseTable::builtin()),
        ))
    }

    fn install(&self, name: &str, version: &str, config: Value) -> PathBuf {
        let dir = self.config.packages_dir.join(name).join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("config.json"), config.to_string()).unwrap();
        dir
    }

    fn package(&self, name: &str, request: &str) -> Result<Package, PackageError> {
        Package::new(PackageRequest::new(name, request), self.context())
    }
}

fn write_zip(path: &Path, files: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
    for (name, content) in files {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn test_demo_package_with_one_style() {
    let env = Env::new();
    let dir = env.install(
        "demo",
        "1.0.0",
        json!({"name": "demo", "version": "1.0.0", "license": "MIT", "styles": ["a.css"]}),
    );
    fs::write(dir.join("a.css"), "body { margin: 0; }").unwrap();

    let mut package = env.package("demo", "1.0.0").unwrap();
    let loaded = package.load().unwrap();

    assert_eq!(loaded.resources.styles.len(), 1);
    let style = &loaded.resources.styles[0];
    assert!(style.local_path().unwrap().ends_with("a.css"));
    assert!(style.exists());
    assert_eq!(style.provenance(), Provenance::Local);
}

#[test]
fn test_missing_style_fails_load() {
    let env = Env::new();
    env.install(
        "demo",
        "1.0.0",
        json!({"name": "demo", "version": "1.0.0", "license": "MIT", "styles": ["missing.css"]}),
    );

    let mut package = env.package("demo", "1.0.0").unwrap();
    let err = package.load().unwrap_err();
    assert!(matches!(err, PackageError::MissingResource { .. }), "{err}");
    assert!(!package.is_loaded());
}

#[test]
fn test_highest_version_in_range() {
    let env = Env::new();
    for version in ["0.9.0", "1.0.0", "1.5.0", "2.0.0"] {
        env.install("demo", version, json!({}));
    }

    let package = env.package("demo", ">=1.0,<2.0").unwrap();
    assert_eq!(package.version(), "1.5.0");
    assert!(package.path().ends_with("demo/1.5.0"));

    match env.package("demo", ">=3.0").unwrap_err() {
        PackageError::VersionRangeMismatch { available, .. } => {
            assert_eq!(available, vec!["0.9.0", "1.0.0", "1.5.0", "2.0.0"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_not_installed_lists_installed_packages() {
    let env = Env::new();
    env.install("alpha", "1.0.0", json!({}));
    env.install("beta", "1.0.0", json!({}));

    match env.package("gamma", "*").unwrap_err() {
        PackageError::NotInstalled { installed, .. } => {
            assert_eq!(installed, vec!["alpha", "beta"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_identity_mismatch_fails() {
    let env = Env::new();
    env.install(
        "demo",
        "1.0.0",
        json!({
            "name": "other", "version": "1.0.0", "license": "MIT", "scripts": ["//cdn.org/a.js"]
        }),
    );
    env.install(
        "demo",
        "1.1.0",
        json!({
            "name": "demo", "version": "1.1.1", "license": "MIT", "scripts": ["//cdn.org/a.js"]
        }),
    );

    for request in ["1.0.0", "1.1.0"] {
        let mut package = env.package("demo", request).unwrap();
        let err = package.load().unwrap_err();
        assert!(
            matches!(err, PackageError::InvalidConfig { ref message, .. }
                if message.contains("mismatching")),
            "{err}"
        );
    }
}

#[test]
fn test_package_without_functionality_fails() {
    let env = Env::new();
    env.install(
        "demo",
        "1.0.0",
        json!({"name": "demo", "version": "1.0.0", "license": "MIT"}),
    );
    let mut package = env.package("demo", "1.0.0").unwrap();
    let err = package.load().unwrap_err();
    assert!(err.to_string().contains("does not have any functionality"));
}

#[test]
fn test_load_is_idempotent() {
    let env = Env::new();
    env.install(
        "demo",
        "1.0.0",
        json!({
            "name": "demo", "version": "1.0.0", "license": "MIT", "scripts": ["//cdn.org/a.js"]
        }),
    );
    let mut package = env.package("demo", "1.0.0").unwrap();
    let first = package.load().unwrap().meta.loaded_at;
    let second = package.load().unwrap().meta.loaded_at;
    assert_eq!(first, second);
}

#[test]
fn test_archive_resource_is_made_offline_at_load() {
    let env = Env::new();
    let archive = env.temp.path().join("lib.zip");
    write_zip(&archive, &[("lib/lib.css", "p { color: blue; }"), ("lib/font.woff", "font")]);
    let url = format!("file://{}", archive.display());

    env.install(
        "demo",
        "1.0.0",
        json!({
            "name": "demo", "version": "1.0.0", "license": "MIT",
            "styles": [{"download_archive": url, "downloaded_path": "lib/lib.css"}]
        }),
    );
    let mut package = env.package("demo", "1.0.0").unwrap();
    let loaded = package.load().unwrap();

    let style = &loaded.resources.styles[0];
    assert_eq!(style.provenance(), Provenance::Archive);
    assert_eq!(style.local_path(), Some("lib/lib.css"));
    let path = style.full_file_path().unwrap();
    assert!(path.starts_with(env.config.tmp_dir.join("offline").join("demo")));
    assert_eq!(fs::read_to_string(path).unwrap(), "p { color: blue; }");
}

#[test]
fn test_remote_style_made_offline_through_list() {
    let env = Env::new();
    let remote = env.temp.path().join("remote.css");
    fs::write(&remote, "a { }").unwrap();
    let url = format!("file://{}", remote.display());
    env.install(
        "demo",
        "1.0.0",
        json!({"name": "demo", "version": "1.0.0", "license": "MIT", "styles": [url]}),
    );

    let mut list = PackageList::new();
    list.add_package(env.package("demo", "1.0.0").unwrap()).unwrap();

    let online = list.styles(false, false).unwrap();
    assert_eq!(online[0].relative_path().as_deref(), Some(url.as_str()));

    let offline = list.styles(true, false).unwrap();
    let html = offline[0].html().unwrap();
    assert!(html.starts_with("<link href=\""));
    assert!(html.ends_with(&format!("<!-- downloaded from \"{}\" -->", url)));

    let out = env.temp.path().join("out");
    let stats = list.copy_resources(&out).unwrap();
    assert_eq!(stats.written, 1);
}

struct CountingMinifier(Arc<AtomicUsize>);

impl Minifier for CountingMinifier {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn minify(&self, source: &str) -> anyhow::Result<String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(source.split_whitespace().collect())
    }
}

#[test]
fn test_minify_of_unchanged_source_hits_cache() {
    let env = Env::new();
    let dir = env.install(
        "demo",
        "1.0.0",
        json!({"name": "demo", "version": "1.0.0", "license": "MIT", "styles": ["a.css"]}),
    );
    fs::write(dir.join("a.css"), "a {  color: red; }").unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counting: Arc<dyn Minifier> = Arc::new(CountingMinifier(calls.clone()));
    let resources = ResourceEnv::new(&env.config.tmp_dir, env.cache())
        .with_minifiers(counting.clone(), counting);
    let ctx = Arc::new(
        LoadContext::from_config(&env.config).with_resource_env(Arc::new(resources)),
    );

    for _ in 0..2 {
        let mut list = PackageList::new();
        list.add_package(Package::new(PackageRequest::new("demo", "*"), ctx.clone()).unwrap())
            .unwrap();
        let styles = list.styles(false, true).unwrap();
        assert!(styles[0].notes().is_empty());
        assert_eq!(styles[0].file_content().unwrap(), "a{color:red;}");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
