//! Resources: templates, styles, scripts and static files.
//!
//! A resource is one file (or, through a copy map, a small group of files)
//! that is either local to its group's directory, remote, or shipped inside a
//! downloadable archive. Remote and archive resources can be made offline
//! through the content cache; styles and scripts can be minified; every local
//! resource can be copied into a build output directory.
//!
//! # Directory Layout
//!
//! ```text
//! {tmp_dir}/
//!   offline/{group}/{hash6}{basename}      # downloaded remote file
//!   offline/{group}/{hash8}_{stem}/        # unpacked archive
//!   minify/{group}/{local_path}            # minified output
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheRequest, ContentCache};
use crate::digest::sha256_hex_str;
use crate::error::{PackageError, PackageResult};
use crate::fs_util::{ensure_dir, is_up_to_date, link_or_copy};
use crate::names::is_external;

mod expand;
mod minify;

pub use expand::{get_resources, ResourceDecl, ResourceSet};
pub use minify::{CssMinifier, JsMinifier, Minifier};

/// What a resource is used as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Template,
    Style,
    Script,
    Static,
}

impl ResourceKind {
    /// Linked kinds are referenced from generated markup.
    pub fn is_linked(&self) -> bool {
        matches!(self, ResourceKind::Style | ResourceKind::Script)
    }

    fn default_tag_type(&self) -> &'static str {
        match self {
            ResourceKind::Script => "text/javascript",
            _ => "text/css",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Template => write!(f, "template"),
            ResourceKind::Style => write!(f, "style"),
            ResourceKind::Script => write!(f, "script"),
            ResourceKind::Static => write!(f, "static"),
        }
    }
}

/// Where a resource's content originally comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Local,
    Remote,
    Archive,
}

/// Option map form of a resource declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourceOptions {
    /// Path relative to the group directory; may carry `?query`/`#fragment`.
    pub local_path: Option<String>,
    pub remote_path: Option<String>,
    pub allow_make_offline: bool,
    /// Zip archive to fetch and unpack when making the resource offline.
    pub download_archive: Option<String>,
    /// Path of the resource inside the unpacked archive.
    pub downloaded_path: Option<String>,
    /// Source path -> destination path for extra files copied with the resource.
    pub copy_map: BTreeMap<String, String>,
    pub allow_minify: bool,
    /// Overrides the markup `type` attribute.
    pub tag_type: Option<String>,
    /// Inline file content into the markup instead of linking it.
    pub internalize: Option<bool>,
    pub note: Option<String>,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            local_path: None,
            remote_path: None,
            allow_make_offline: true,
            download_archive: None,
            downloaded_path: None,
            copy_map: BTreeMap::new(),
            allow_minify: true,
            tag_type: None,
            internalize: None,
            note: None,
        }
    }
}

/// A resource as written in configuration: a bare path or an option map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceSpec {
    Path(String),
    Options(ResourceOptions),
}

impl ResourceSpec {
    /// Option map for this declaration; bare strings containing `//` are remote.
    pub fn into_options(self) -> ResourceOptions {
        match self {
            ResourceSpec::Path(path) if is_external(&path) => ResourceOptions {
                remote_path: Some(path),
                ..ResourceOptions::default()
            },
            ResourceSpec::Path(path) => ResourceOptions {
                local_path: Some(path),
                ..ResourceOptions::default()
            },
            ResourceSpec::Options(options) => options,
        }
    }
}

/// Split trailing `?query` or `#fragment` parameters off a path.
pub fn split_params(path: &str) -> (String, String) {
    match path.find(['?', '#']) {
        Some(idx) => (path[..idx].to_string(), path[idx..].to_string()),
        None => (path.to_string(), String::new()),
    }
}

/// Shared collaborators and directories for resource operations.
#[derive(Clone)]
pub struct ResourceEnv {
    tmp_dir: PathBuf,
    cache: Arc<dyn ContentCache>,
    css_minifier: Arc<dyn Minifier>,
    js_minifier: Arc<dyn Minifier>,
}

impl std::fmt::Debug for ResourceEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceEnv")
            .field("tmp_dir", &self.tmp_dir)
            .field("css_minifier", &self.css_minifier.name())
            .field("js_minifier", &self.js_minifier.name())
            .finish_non_exhaustive()
    }
}

impl ResourceEnv {
    pub fn new(tmp_dir: impl Into<PathBuf>, cache: Arc<dyn ContentCache>) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
            cache,
            css_minifier: Arc::new(CssMinifier),
            js_minifier: Arc::new(JsMinifier),
        }
    }

    pub fn with_minifiers(mut self, css: Arc<dyn Minifier>, js: Arc<dyn Minifier>) -> Self {
        self.css_minifier = css;
        self.js_minifier = js;
        self
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn cache(&self) -> &Arc<dyn ContentCache> {
        &self.cache
    }
}

/// Outcome of [`Resource::copy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub written: usize,
    pub skipped: usize,
}

impl std::ops::AddAssign for CopyStats {
    fn add_assign(&mut self, other: Self) {
        self.written += other.written;
        self.skipped += other.skipped;
    }
}

/// A single declared resource.
#[derive(Debug, Clone)]
pub struct Resource {
    kind: ResourceKind,
    provenance: Provenance,
    group_name: String,
    resource_dir: Option<PathBuf>,
    local_path: Option<String>,
    local_params: String,
    remote_path: Option<String>,
    download_archive: Option<String>,
    downloaded_path: Option<String>,
    archive_dir: Option<String>,
    copy_map: BTreeMap<String, String>,
    allow_make_offline: bool,
    allow_minify: bool,
    tag_type: Option<String>,
    internalize: bool,
    notes: Vec<String>,
    processed_path: Option<PathBuf>,
    env: Arc<ResourceEnv>,
}

impl Resource {
    /// Build a resource, checking option invariants.
    ///
    /// A resource declared only through `download_archive` is made offline
    /// immediately, since it has no other usable path.
    pub fn new(
        kind: ResourceKind,
        group_name: &str,
        resource_dir: Option<PathBuf>,
        options: ResourceOptions,
        env: Arc<ResourceEnv>,
    ) -> PackageResult<Self> {
        let label = format!(
            "{} {} \"{}\"",
            kind,
            group_name,
            options
                .local_path
                .as_deref()
                .or(options.remote_path.as_deref())
                .or(options.download_archive.as_deref())
                .unwrap_or("")
        );
        let invalid = |reason: &str| PackageError::InvalidResource {
            resource: label.clone(),
            reason: reason.to_string(),
        };

        let has_local = options.local_path.as_deref().is_some_and(|p| !p.is_empty());
        if !has_local && options.remote_path.is_none() && options.download_archive.is_none() {
            return Err(invalid(
                "at least one of local_path, remote_path or download_archive should be set",
            ));
        }
        if has_local && (options.download_archive.is_some() || options.downloaded_path.is_some()) {
            return Err(invalid(
                "if local_path is set, download_archive and downloaded_path should be empty",
            ));
        }
        if options.downloaded_path.is_some() && options.download_archive.is_none() {
            return Err(invalid("downloaded_path should only be set if download_archive is set"));
        }
        if options.download_archive.is_some() && options.downloaded_path.is_none() {
            return Err(invalid("downloaded_path is required if download_archive is set"));
        }
        if options.download_archive.is_some() && !options.allow_make_offline {
            return Err(invalid("allow_make_offline must be true if download_archive is set"));
        }
        if !kind.is_linked() {
            if options.tag_type.is_some() {
                return Err(invalid("tag_type is only allowed for styles and scripts"));
            }
            if options.internalize.is_some() {
                return Err(invalid("internalize is only allowed for styles and scripts"));
            }
            if !options.copy_map.is_empty() {
                return Err(invalid("copy_map is only allowed for styles and scripts"));
            }
        }
        let internalize = options.internalize.unwrap_or(false);
        if internalize && !has_local && !options.allow_make_offline {
            return Err(invalid(
                "to internalize a resource it must be available offline \
                 (local_path is set or allow_make_offline is true)",
            ));
        }

        let provenance = if options.download_archive.is_some() {
            Provenance::Archive
        } else if has_local {
            Provenance::Local
        } else {
            Provenance::Remote
        };
        let (local_path, local_params) = match options.local_path.as_deref() {
            Some(path) if has_local => {
                let (path, params) = split_params(path);
                (Some(path), params)
            }
            _ => (None, String::new()),
        };

        let mut resource = Self {
            kind,
            provenance,
            group_name: group_name.to_string(),
            resource_dir,
            local_path,
            local_params,
            remote_path: options.remote_path,
            download_archive: options.download_archive,
            downloaded_path: options.downloaded_path,
            archive_dir: None,
            copy_map: options.copy_map,
            allow_make_offline: options.allow_make_offline,
            allow_minify: options.allow_minify,
            tag_type: options.tag_type,
            internalize,
            notes: options.note.into_iter().collect(),
            processed_path: None,
            env,
        };
        if resource.local_path.is_none() && resource.remote_path.is_none() {
            resource.make_offline()?;
        }
        Ok(resource)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn local_path(&self) -> Option<&str> {
        self.local_path.as_deref()
    }

    pub fn local_params(&self) -> &str {
        &self.local_params
    }

    pub fn remote_path(&self) -> Option<&str> {
        self.remote_path.as_deref()
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn internalize(&self) -> bool {
        self.internalize
    }

    /// Whether a local file is available (possibly after making it offline).
    pub fn is_local(&self) -> bool {
        self.local_path.is_some()
    }

    /// Filesystem path of the local file, without parameters.
    pub fn full_file_path(&self) -> Option<PathBuf> {
        let local = self.local_path.as_deref()?;
        let mut path = self.resource_dir.clone()?;
        if let Some(archive_dir) = &self.archive_dir {
            path.push(archive_dir);
        }
        path.push(local);
        Some(path)
    }

    /// Local path with parameters, or the remote URL.
    pub fn full_path(&self) -> Option<String> {
        match self.full_file_path() {
            Some(path) => Some(format!("{}{}", path.display(), self.local_params)),
            None => self.remote_path.clone(),
        }
    }

    /// Path as referenced from a built document, with parameters.
    pub fn relative_path(&self) -> Option<String> {
        match &self.local_path {
            Some(local) => Some(format!("{}{}", local, self.local_params)),
            None => self.remote_path.clone(),
        }
    }

    /// Remote resources always exist; local ones if their file does.
    pub fn exists(&self) -> bool {
        if self.remote_path.is_some() {
            return true;
        }
        self.full_file_path().is_some_and(|p| p.exists())
    }

    /// Download the resource (or its archive) into the offline directory.
    ///
    /// No-op for resources that are already local or may not be made offline.
    pub fn make_offline(&mut self) -> PackageResult<()> {
        if self.local_path.is_some() || !self.allow_make_offline {
            return Ok(());
        }
        let offline_dir = self.env.tmp_dir.join("offline").join(&self.group_name);
        ensure_dir(&offline_dir)?;

        if let Some(archive) = self.download_archive.clone() {
            info!(group = %self.group_name, archive = %archive, "making archive available offline");
            let prefix = sha256_hex_str(&format!("{}.{}", self.group_name, archive));
            let (archive_url, _) = split_params(&archive);
            let stem = Path::new(&archive_url)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let archive_dir = format!("{}_{}", &prefix[..8], stem);

            let archive_file = self.env.cache.get_or_create_file(CacheRequest::Url(&archive))?;
            let unpacked = self
                .env
                .cache
                .get_or_create_file(CacheRequest::Unpack(&archive_file))?;
            link_or_copy(&unpacked, &offline_dir.join(&archive_dir), false, true)?;

            let downloaded = self.downloaded_path.clone().unwrap_or_default();
            let (local, params) = split_params(&downloaded);
            self.archive_dir = Some(archive_dir);
            self.local_path = Some(local);
            self.local_params = params;
            self.notes.push(format!("extracted from \"{}\"", archive));
        } else if let Some(remote) = self.remote_path.clone() {
            info!(group = %self.group_name, url = %remote, "making file available offline");
            let prefix = sha256_hex_str(&format!("{}.{}", self.group_name, remote));
            let (remote_file, params) = split_params(&remote);
            let basename = remote_file.rsplit('/').next().unwrap_or_default();
            let local = format!("{}{}", &prefix[..6], basename);

            let cached = self.env.cache.get_or_create_file(CacheRequest::Url(&remote))?;
            link_or_copy(&cached, &offline_dir.join(&local), true, true)?;

            self.local_path = Some(local);
            self.local_params = params;
            self.notes.push(format!("downloaded from \"{}\"", remote));
        }
        self.resource_dir = Some(offline_dir);
        Ok(())
    }

    /// Minify the local file through the cache. Clears notes.
    ///
    /// Only styles and scripts are transformed; other kinds just lose their
    /// notes. Remote resources that were not made offline are left as-is.
    pub fn minify(&mut self) -> PackageResult<()> {
        if !self.allow_minify {
            return Ok(());
        }
        self.notes.clear();
        let minifier = match self.kind {
            ResourceKind::Style => self.env.css_minifier.clone(),
            ResourceKind::Script => self.env.js_minifier.clone(),
            ResourceKind::Template | ResourceKind::Static => return Ok(()),
        };
        if self.processed_path.is_some() {
            return Ok(());
        }
        let (Some(local), Some(source)) = (self.local_path.clone(), self.full_file_path()) else {
            return Ok(());
        };

        let transform = |input: &Path, output: &Path| -> anyhow::Result<()> {
            let text = std::fs::read_to_string(input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let minified = minifier.minify(&text)?;
            std::fs::write(output, minified)
                .with_context(|| format!("failed to write {}", output.display()))
        };
        let cached = self.env.cache.get_or_create_file(CacheRequest::Derived {
            name: minifier.name(),
            source: &source,
            transform: &transform,
        })?;

        let target = self
            .env
            .tmp_dir
            .join("minify")
            .join(&self.group_name)
            .join(&local);
        link_or_copy(&cached, &target, false, false)?;
        debug!(resource = %self, target = %target.display(), "minified");
        self.processed_path = Some(target);
        Ok(())
    }

    /// Copy the local file(s) into `to`.
    ///
    /// Uses the copy map when set, otherwise copies the resource itself to its
    /// local path. A destination at least as new as its source is skipped.
    pub fn copy(&self, to: &Path) -> PackageResult<CopyStats> {
        let mut stats = CopyStats::default();
        let Some(local) = self.local_path.as_deref() else {
            return Ok(stats);
        };

        let mut pairs = Vec::new();
        if self.copy_map.is_empty() {
            if let Some(source) = self.processed_path.clone().or_else(|| self.full_file_path()) {
                pairs.push((source, to.join(local)));
            }
        } else {
            let base = self.resource_dir.as_ref().ok_or_else(|| PackageError::InvalidResource {
                resource: self.to_string(),
                reason: "local resources need a resource directory".to_string(),
            })?;
            let base = match &self.archive_dir {
                Some(archive_dir) => base.join(archive_dir),
                None => base.clone(),
            };
            for (src, dst) in &self.copy_map {
                if src.contains('*') {
                    return Err(PackageError::InvalidResource {
                        resource: self.to_string(),
                        reason: format!("wildcards are not allowed in copy_map ({})", src),
                    });
                }
                pairs.push((base.join(src), to.join(dst)));
            }
        }

        for (src, dst) in pairs {
            if is_up_to_date(&src, &dst)? {
                debug!(kind = %self.kind, dst = %dst.display(), "unchanged; not copying");
                stats.skipped += 1;
                continue;
            }
            info!(
                kind = %self.kind,
                src = %src.display(),
                dst = %dst.display(),
                "copying resource"
            );
            link_or_copy(&src, &dst, false, false)?;
            stats.written += 1;
        }
        Ok(stats)
    }

    /// Content of the (possibly minified) local file.
    pub fn file_content(&self) -> PackageResult<String> {
        if !self.kind.is_linked() {
            return Err(PackageError::Unsupported {
                package: self.group_name.clone(),
                feature: format!("reading content of {} resources", self.kind),
            });
        }
        let path = self
            .processed_path
            .clone()
            .or_else(|| self.full_file_path())
            .ok_or_else(|| PackageError::InvalidResource {
                resource: self.to_string(),
                reason: "must be local or made offline before its content can be read".to_string(),
            })?;
        std::fs::read_to_string(&path).map_err(|e| PackageError::io(&path, e))
    }

    /// Markup fragment that links or inlines this resource.
    pub fn html(&self) -> PackageResult<String> {
        if !self.kind.is_linked() {
            return Err(PackageError::Unsupported {
                package: self.group_name.clone(),
                feature: format!("html for {} resources", self.kind),
            });
        }
        let tag_type = self
            .tag_type
            .as_deref()
            .unwrap_or(self.kind.default_tag_type());

        if self.internalize {
            let content = self.file_content()?;
            let markup = match self.kind {
                ResourceKind::Style => format!("<style type=\"{}\">{}</style>", tag_type, content),
                _ => format!("<script type=\"{}\">{}</script>", tag_type, content),
            };
            return Ok(self.with_notes(markup, "file content inserted; "));
        }

        let href = self.relative_path().ok_or_else(|| PackageError::InvalidResource {
            resource: self.to_string(),
            reason: "has no path to link".to_string(),
        })?;
        let markup = match self.kind {
            ResourceKind::Style => format!(
                "<link href=\"{}\" rel=\"stylesheet\" type=\"{}\" >",
                href, tag_type
            ),
            _ => format!("<script src=\"{}\" type=\"{}\"></script>", href, tag_type),
        };
        Ok(self.with_notes(markup, ""))
    }

    fn with_notes(&self, markup: String, prefix: &str) -> String {
        if self.notes.is_empty() {
            return markup;
        }
        format!("{} <!-- {}{} -->", markup, prefix, self.notes.join("; "))
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.local_path, &self.remote_path) {
            (Some(local), Some(remote)) => {
                write!(f, "{} {} \"{}\" & \"{}\"", self.kind, self.group_name, local, remote)
            }
            (Some(path), None) | (None, Some(path)) => {
                write!(f, "{} {} \"{}\"", self.kind, self.group_name, path)
            }
            (None, None) => write!(f, "{} {}", self.kind, self.group_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FileCache, LocalFetcher};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        dir: PathBuf,
        env: Arc<ResourceEnv>,
    }

    impl Fixture {
        fn local(&self, kind: ResourceKind, options: ResourceOptions) -> PackageResult<Resource> {
            Resource::new(kind, "demo", Some(self.dir.clone()), options, self.env.clone())
        }

        fn remote(&self, kind: ResourceKind, options: ResourceOptions) -> PackageResult<Resource> {
            Resource::new(kind, "demo", None, options, self.env.clone())
        }
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("pkg");
        fs::create_dir_all(&dir).unwrap();
        let cache = FileCache::with_fetcher(temp.path().join("cache"), Arc::new(LocalFetcher));
        let env = Arc::new(ResourceEnv::new(temp.path().join("tmp"), Arc::new(cache)));
        Fixture { temp, dir, env }
    }

    fn local(path: &str) -> ResourceOptions {
        ResourceOptions {
            local_path: Some(path.to_string()),
            ..ResourceOptions::default()
        }
    }

    #[test]
    fn test_split_params() {
        assert_eq!(split_params("a.css?v=1"), ("a.css".into(), "?v=1".into()));
        assert_eq!(split_params("a.js#top"), ("a.js".into(), "#top".into()));
        assert_eq!(split_params("a.js"), ("a.js".into(), String::new()));
    }

    #[test]
    fn test_spec_classification() {
        let remote = ResourceSpec::Path("//cdn.org/x.css".into()).into_options();
        assert_eq!(remote.remote_path.as_deref(), Some("//cdn.org/x.css"));
        let local = ResourceSpec::Path("x.css".into()).into_options();
        assert_eq!(local.local_path.as_deref(), Some("x.css"));
        assert!(local.allow_make_offline && local.allow_minify);
    }

    #[test]
    fn test_option_map_rejects_unknown_keys() {
        let value = serde_json::json!({"local_path": "a.css", "allow_minify": false});
        let spec: ResourceSpec = serde_json::from_value(value).unwrap();
        assert!(matches!(spec, ResourceSpec::Options(ref o) if !o.allow_minify));
        assert!(serde_json::from_value::<ResourceSpec>(serde_json::json!({"bogus": 1})).is_err());
    }

    #[test]
    fn test_invariants() {
        let f = fixture();

        assert!(f.local(ResourceKind::Style, ResourceOptions::default()).is_err());
        let both = ResourceOptions {
            download_archive: Some("lib.zip".into()),
            downloaded_path: Some("a.css".into()),
            ..local("a.css")
        };
        assert!(f.local(ResourceKind::Style, both).is_err());
        let orphan = ResourceOptions {
            downloaded_path: Some("a.css".into()),
            ..local("a.css")
        };
        assert!(f.local(ResourceKind::Style, orphan).is_err());
        let offline_forbidden = ResourceOptions {
            download_archive: Some("lib.zip".into()),
            downloaded_path: Some("a.css".into()),
            allow_make_offline: false,
            ..ResourceOptions::default()
        };
        assert!(f.local(ResourceKind::Style, offline_forbidden).is_err());
        let static_tag_type = ResourceOptions {
            tag_type: Some("text/plain".into()),
            ..local("a.png")
        };
        let err = f.local(ResourceKind::Static, static_tag_type).unwrap_err();
        assert!(matches!(err, PackageError::InvalidResource { .. }));
    }

    #[test]
    fn test_internalize_requires_offline_copy() {
        let f = fixture();
        let pinned_remote = ResourceOptions {
            remote_path: Some("https://cdn.org/x.css".into()),
            internalize: Some(true),
            allow_make_offline: false,
            ..ResourceOptions::default()
        };
        let err = f.remote(ResourceKind::Style, pinned_remote.clone()).unwrap_err();
        assert!(
            matches!(err, PackageError::InvalidResource { ref reason, .. }
                if reason.contains("must be available offline")),
            "{err}"
        );

        let fetchable = ResourceOptions {
            allow_make_offline: true,
            ..pinned_remote
        };
        assert!(f.remote(ResourceKind::Style, fetchable).unwrap().internalize());
    }

    #[test]
    fn test_local_resource_paths() {
        let f = fixture();
        fs::write(f.dir.join("a.css"), "a{}").unwrap();
        let res = f.local(ResourceKind::Style, local("a.css?v=2")).unwrap();
        assert_eq!(res.provenance(), Provenance::Local);
        assert_eq!(res.local_path(), Some("a.css"));
        assert_eq!(res.relative_path().as_deref(), Some("a.css?v=2"));
        assert_eq!(res.full_file_path().unwrap(), f.dir.join("a.css"));
        assert!(res.exists());
        assert_eq!(
            res.html().unwrap(),
            "<link href=\"a.css?v=2\" rel=\"stylesheet\" type=\"text/css\" >"
        );
    }

    #[test]
    fn test_make_offline_from_file_url() {
        let f = fixture();
        let source = f.dir.join("remote.js");
        fs::write(&source, "run();").unwrap();
        let url = format!("file://{}", source.display());
        let options = ResourceOptions {
            remote_path: Some(url.clone()),
            ..ResourceOptions::default()
        };
        let mut res = f.remote(ResourceKind::Script, options).unwrap();
        assert!(!res.is_local());

        res.make_offline().unwrap();
        let local = res.local_path().unwrap().to_string();
        assert!(local.ends_with("remote.js"));
        assert_eq!(local.len(), "remote.js".len() + 6);
        assert_eq!(fs::read_to_string(res.full_file_path().unwrap()).unwrap(), "run();");
        assert_eq!(res.notes(), [format!("downloaded from \"{}\"", url)]);

        res.make_offline().unwrap();
        assert_eq!(res.local_path(), Some(local.as_str()));
        assert_eq!(res.notes().len(), 1);
        let note = format!(" <!-- downloaded from \"{}\" -->", url);
        assert!(res.html().unwrap().ends_with(&note));
    }

    #[test]
    fn test_make_offline_disallowed_keeps_remote() {
        let f = fixture();
        let options = ResourceOptions {
            remote_path: Some("https://cdn.org/x.js".into()),
            allow_make_offline: false,
            ..ResourceOptions::default()
        };
        let mut res = f.remote(ResourceKind::Script, options).unwrap();
        res.make_offline().unwrap();
        assert_eq!(res.provenance(), Provenance::Remote);
        assert_eq!(
            res.html().unwrap(),
            "<script src=\"https://cdn.org/x.js\" type=\"text/javascript\"></script>"
        );
    }

    #[test]
    fn test_minify_then_copy() {
        let f = fixture();
        fs::write(f.dir.join("a.css"), "body {\n  color: red;\n}\n").unwrap();
        let options = ResourceOptions {
            note: Some("from demo".into()),
            ..local("a.css")
        };
        let mut res = f.local(ResourceKind::Style, options).unwrap();
        res.minify().unwrap();
        assert!(res.notes().is_empty());
        res.minify().unwrap();

        let out = f.temp.path().join("out");
        let stats = res.copy(&out).unwrap();
        assert_eq!(stats, CopyStats { written: 1, skipped: 0 });
        assert_eq!(fs::read_to_string(out.join("a.css")).unwrap(), "body{color: red}");

        let again = res.copy(&out).unwrap();
        assert_eq!(again, CopyStats { written: 0, skipped: 1 });
    }

    #[test]
    fn test_copy_map_rejects_wildcards() {
        let f = fixture();
        fs::write(f.dir.join("a.js"), "a()").unwrap();
        let options = ResourceOptions {
            copy_map: [("lib/*.js".to_string(), "lib".to_string())].into_iter().collect(),
            ..local("a.js")
        };
        let res = f.local(ResourceKind::Script, options).unwrap();
        let err = res.copy(&f.temp.path().join("out")).unwrap_err();
        assert!(matches!(err, PackageError::InvalidResource { .. }));
    }

    #[test]
    fn test_internalized_script() {
        let f = fixture();
        fs::write(f.dir.join("a.js"), "go();").unwrap();
        let options = ResourceOptions {
            internalize: Some(true),
            note: Some("inline".into()),
            ..local("a.js")
        };
        let res = f.local(ResourceKind::Script, options).unwrap();
        assert_eq!(
            res.html().unwrap(),
            "<script type=\"text/javascript\">go();</script> <!-- file content inserted; inline -->"
        );
    }

    #[test]
    fn test_internalized_style() {
        let f = fixture();
        fs::write(f.dir.join("print.css"), "p{margin:0}").unwrap();
        let options = ResourceOptions {
            internalize: Some(true),
            tag_type: Some("text/x-print".into()),
            note: Some("print rules".into()),
            ..local("print.css")
        };
        let res = f.local(ResourceKind::Style, options).unwrap();
        assert_eq!(
            res.html().unwrap(),
            "<style type=\"text/x-print\">p{margin:0}</style> \
             <!-- file content inserted; print rules -->"
        );

        let plain = ResourceOptions {
            internalize: Some(true),
            ..local("print.css")
        };
        let res = f.local(ResourceKind::Style, plain).unwrap();
        assert_eq!(res.html().unwrap(), "<style type=\"text/css\">p{margin:0}</style>");
    }

    #[test]
    fn test_html_unsupported_for_static() {
        let f = fixture();
        let res = f.local(ResourceKind::Static, local("img.png")).unwrap();
        assert!(matches!(res.html().unwrap_err(), PackageError::Unsupported { .. }));
        assert!(!res.exists());
    }
}
