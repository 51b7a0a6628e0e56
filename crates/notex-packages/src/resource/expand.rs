//! Expansion of declared resource specs into [`Resource`]s.

use std::path::Path;
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, warn};

use super::{split_params, Resource, ResourceEnv, ResourceKind, ResourceSpec};
use crate::error::{PackageError, PackageResult};
use crate::fs_util::list_files;

/// Resource declarations of one group (a package or a document).
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceDecl<'a> {
    pub template: Option<&'a str>,
    pub styles: &'a [ResourceSpec],
    pub scripts: &'a [ResourceSpec],
    pub static_files: &'a [ResourceSpec],
    /// Note attached to every resource that does not carry its own.
    pub note: Option<&'a str>,
}

/// Resources of one group, all verified to exist.
#[derive(Debug, Clone, Default)]
pub struct ResourceSet {
    pub template: Option<Resource>,
    pub styles: Vec<Resource>,
    pub scripts: Vec<Resource>,
    pub static_files: Vec<Resource>,
}

impl ResourceSet {
    /// Styles, scripts and static files, in that order.
    pub fn linked_and_static(&self) -> impl Iterator<Item = &Resource> {
        self.styles
            .iter()
            .chain(self.scripts.iter())
            .chain(self.static_files.iter())
    }
}

/// Expand the declarations of `group_name`, whose local files live in `dir`.
///
/// Wildcard patterns are matched against the files under `dir` (sorted); a
/// pattern without matches is only logged. Every resulting resource, and the
/// template if any, must exist.
pub fn get_resources(
    group_name: &str,
    dir: &Path,
    decl: &ResourceDecl<'_>,
    env: &Arc<ResourceEnv>,
) -> PackageResult<ResourceSet> {
    let mut set = ResourceSet::default();

    if let Some(template) = decl.template {
        let resource = Resource::new(
            ResourceKind::Template,
            group_name,
            Some(dir.to_path_buf()),
            ResourceSpec::Path(template.to_string()).into_options(),
            env.clone(),
        )?;
        if !resource.full_file_path().is_some_and(|p| p.is_file()) {
            return Err(missing(&resource));
        }
        set.template = Some(resource);
    }

    let mut files = None;
    for (kind, specs) in [
        (ResourceKind::Style, decl.styles),
        (ResourceKind::Script, decl.scripts),
        (ResourceKind::Static, decl.static_files),
    ] {
        let mut expanded = Vec::new();
        for spec in specs {
            expand(kind, group_name, dir, spec, decl.note, env, &mut files, &mut expanded)?;
        }
        if let Some(resource) = expanded.iter().find(|r| !r.exists()) {
            return Err(missing(resource));
        }
        match kind {
            ResourceKind::Style => set.styles = expanded,
            ResourceKind::Script => set.scripts = expanded,
            _ => set.static_files = expanded,
        }
    }

    debug!(
        group = group_name,
        styles = set.styles.len(),
        scripts = set.scripts.len(),
        static_files = set.static_files.len(),
        "resolved resources"
    );
    Ok(set)
}

#[allow(clippy::too_many_arguments)]
fn expand(
    kind: ResourceKind,
    group_name: &str,
    dir: &Path,
    spec: &ResourceSpec,
    note: Option<&str>,
    env: &Arc<ResourceEnv>,
    files: &mut Option<Vec<String>>,
    out: &mut Vec<Resource>,
) -> PackageResult<()> {
    let mut options = spec.clone().into_options();
    if options.note.is_none() {
        options.note = note.map(str::to_string);
    }
    let new =
        |options| Resource::new(kind, group_name, Some(dir.to_path_buf()), options, env.clone());

    let Some(local) = options.local_path.clone() else {
        out.push(new(options)?);
        return Ok(());
    };
    let (pattern, params) = split_params(&local);
    if !is_glob(&pattern) {
        out.push(new(options)?);
        return Ok(());
    }
    if let Some(remote) = &options.remote_path {
        return Err(PackageError::invalid_config(
            group_name,
            format!(
                "wildcard in local_path \"{}\" not allowed if remote_path is set (\"{}\"), \
                 since remote_path cannot have wildcards",
                local, remote
            ),
        ));
    }

    let matcher = glob_matcher(group_name, &pattern)?;
    if files.is_none() {
        *files = Some(if dir.is_dir() { list_files(dir)? } else { Vec::new() });
    }
    let matches: Vec<&String> = files
        .iter()
        .flatten()
        .filter(|f| matcher.is_match(f.as_str()))
        .collect();
    if matches.is_empty() {
        warn!(
            group = group_name,
            kind = %kind,
            pattern = %local,
            dir = %dir.display(),
            "no files match resource pattern"
        );
        return Ok(());
    }
    for path in matches {
        let mut options = options.clone();
        options.local_path = Some(format!("{}{}", path, params));
        out.push(new(options)?);
    }
    Ok(())
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

fn glob_matcher(group_name: &str, pattern: &str) -> PackageResult<GlobMatcher> {
    let pattern = pattern.trim_start_matches("./");
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| {
            PackageError::invalid_config(group_name, format!("invalid resource pattern: {}", e))
        })
}

fn missing(resource: &Resource) -> PackageError {
    PackageError::MissingResource {
        kind: resource.kind().to_string(),
        resource: resource.to_string(),
        path: resource.full_file_path().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FileCache, LocalFetcher};
    use crate::resource::ResourceOptions;
    use std::fs;
    use tempfile::TempDir;

    fn env(temp: &TempDir) -> Arc<ResourceEnv> {
        let cache = FileCache::with_fetcher(temp.path().join("cache"), Arc::new(LocalFetcher));
        Arc::new(ResourceEnv::new(temp.path().join("tmp"), Arc::new(cache)))
    }

    fn paths(resources: &[Resource]) -> Vec<String> {
        resources
            .iter()
            .filter_map(|r| r.relative_path())
            .collect()
    }

    #[test]
    fn test_literal_and_glob_expansion() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("pkg");
        fs::create_dir_all(dir.join("css/sub")).unwrap();
        fs::write(dir.join("css/b.css"), "").unwrap();
        fs::write(dir.join("css/a.css"), "").unwrap();
        fs::write(dir.join("css/sub/c.css"), "").unwrap();
        fs::write(dir.join("main.js"), "").unwrap();

        let styles = vec![ResourceSpec::Path("css/*.css?v=1".into())];
        let scripts = vec![
            ResourceSpec::Path("main.js".into()),
            ResourceSpec::Path("https://cdn.org/x.js".into()),
        ];
        let decl = ResourceDecl {
            styles: &styles,
            scripts: &scripts,
            note: Some("from demo"),
            ..ResourceDecl::default()
        };
        let set = get_resources("demo", &dir, &decl, &env(&temp)).unwrap();

        assert_eq!(paths(&set.styles), vec!["css/a.css?v=1", "css/b.css?v=1"]);
        assert_eq!(paths(&set.scripts), vec!["main.js", "https://cdn.org/x.js"]);
        assert_eq!(set.styles[0].notes(), ["from demo".to_string()]);
        assert!(set.template.is_none());
    }

    #[test]
    fn test_unmatched_glob_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let styles = vec![ResourceSpec::Path("*.css".into())];
        let decl = ResourceDecl {
            styles: &styles,
            ..ResourceDecl::default()
        };
        let set = get_resources("demo", temp.path(), &decl, &env(&temp)).unwrap();
        assert!(set.styles.is_empty());
    }

    #[test]
    fn test_missing_literal_fails() {
        let temp = TempDir::new().unwrap();
        let statics = vec![ResourceSpec::Path("logo.png".into())];
        let decl = ResourceDecl {
            static_files: &statics,
            ..ResourceDecl::default()
        };
        let err = get_resources("demo", temp.path(), &decl, &env(&temp)).unwrap_err();
        assert!(matches!(err, PackageError::MissingResource { ref kind, .. } if kind == "static"));
    }

    #[test]
    fn test_missing_template_fails() {
        let temp = TempDir::new().unwrap();
        let decl = ResourceDecl {
            template: Some("page.html"),
            ..ResourceDecl::default()
        };
        let err = get_resources("demo", temp.path(), &decl, &env(&temp)).unwrap_err();
        assert!(
            matches!(err, PackageError::MissingResource { ref kind, .. } if kind == "template")
        );
    }

    #[test]
    fn test_wildcard_with_remote_is_rejected() {
        let temp = TempDir::new().unwrap();
        let styles = vec![ResourceSpec::Options(ResourceOptions {
            local_path: Some("*.css".into()),
            remote_path: Some("https://cdn.org/a.css".into()),
            ..ResourceOptions::default()
        })];
        let decl = ResourceDecl {
            styles: &styles,
            ..ResourceDecl::default()
        };
        let err = get_resources("demo", temp.path(), &decl, &env(&temp)).unwrap_err();
        assert!(err.is_config_error());
    }
}
