//! Installed-version discovery and version choice.
//!
//! Packages are installed as `packages_dir/<name>/<version>/`; the version
//! directory names are the set of installed versions. Range semantics are
//! owned by a [`VersionMatcher`]; [`SemverMatcher`] is the default.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::{Version, VersionReq};
use tracing::{debug, info};

use crate::error::{PackageError, PackageResult};

/// Range comparison collaborator.
pub trait VersionMatcher: Send + Sync {
    /// Pick exactly one of `candidates` satisfying `request`.
    ///
    /// Returns `Ok(None)` when nothing matches and `Err(reason)` when the
    /// request itself is malformed. The returned string must be one of the
    /// candidates.
    fn choose(&self, request: &str, candidates: &[String]) -> Result<Option<String>, String>;

    /// Order versions ascending.
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Semantic-version matcher: highest satisfying version wins.
///
/// A bare full version (`1.0.0`) is an exact request, `*` or an empty string
/// accepts anything, `==` is read as `=` and a leading `v` is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SemverMatcher;

impl SemverMatcher {
    fn parse_request(request: &str) -> Result<VersionReq, String> {
        let trimmed = request.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(VersionReq::STAR);
        }
        if let Some(exact) = parse_version_loose(trimmed) {
            return VersionReq::parse(&format!("={}", exact)).map_err(|e| e.to_string());
        }
        let normalized = normalize_request(trimmed);
        VersionReq::parse(&normalized).map_err(|e| e.to_string())
    }
}

impl VersionMatcher for SemverMatcher {
    fn choose(&self, request: &str, candidates: &[String]) -> Result<Option<String>, String> {
        let req = Self::parse_request(request)?;
        let mut best: Option<(Version, &String)> = None;
        for label in candidates {
            let Some(version) = parse_version_loose(label) else {
                continue;
            };
            if !req.matches(&version) {
                continue;
            }
            match &best {
                Some((current, _)) if version <= *current => {}
                _ => best = Some((version, label)),
            }
        }
        Ok(best.map(|(_, label)| label.clone()))
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        match (parse_version_loose(a), parse_version_loose(b)) {
            (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        }
    }
}

/// Parse `1.2.3`, `v1.2.3`, `1.2` or `1` as a version (missing parts are zero).
fn parse_version_loose(raw: &str) -> Option<Version> {
    let t = raw.trim();
    let t = t.strip_prefix('v').unwrap_or(t);
    if t.is_empty() {
        return None;
    }
    if let Ok(v) = Version::parse(t) {
        return Some(v);
    }
    let parts: Vec<&str> = t.split('.').collect();
    if parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let mut nums = [0u64; 3];
    for (slot, part) in nums.iter_mut().zip(&parts) {
        *slot = part.parse().ok()?;
    }
    Some(Version::new(nums[0], nums[1], nums[2]))
}

fn is_req_boundary(ch: char) -> bool {
    ch.is_ascii_whitespace() || matches!(ch, ',' | '<' | '>' | '=' | '^' | '~')
}

fn normalize_request(raw: &str) -> String {
    let raw = raw.replace("==", "=");
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (i, &ch) in chars.iter().enumerate() {
        if ch == 'v'
            && i + 1 < chars.len()
            && chars[i + 1].is_ascii_digit()
            && (i == 0 || is_req_boundary(chars[i - 1]))
        {
            continue;
        }
        out.push(ch);
        if ch == ',' {
            out.push(' ');
        }
    }
    out
}

/// Enumerates installed packages and their versions on disk.
#[derive(Debug, Clone)]
pub struct VersionStore {
    packages_dir: PathBuf,
}

impl VersionStore {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            packages_dir: packages_dir.into(),
        }
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Names of all installed packages, sorted.
    pub fn installed_packages(&self) -> Vec<String> {
        let mut names = list_subdirs(&self.packages_dir).unwrap_or_default();
        names.sort();
        names
    }

    /// Version directory names for `name`, unsorted.
    ///
    /// Fails with [`PackageError::NotInstalled`] if the package directory is absent.
    pub fn versions(&self, name: &str) -> PackageResult<Vec<String>> {
        let dir = self.packages_dir.join(name);
        if !dir.is_dir() {
            return Err(PackageError::NotInstalled {
                name: name.to_string(),
                packages_dir: self.packages_dir.clone(),
                installed: self.installed_packages(),
            });
        }
        list_subdirs(&dir).map_err(|e| PackageError::io(&dir, e))
    }
}

fn list_subdirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(out)
}

/// Chooses one installed version for a request.
#[derive(Clone)]
pub struct VersionResolver {
    store: VersionStore,
    matcher: Arc<dyn VersionMatcher>,
}

impl std::fmt::Debug for VersionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionResolver")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl VersionResolver {
    /// Resolver using [`SemverMatcher`].
    pub fn new(store: VersionStore) -> Self {
        Self::with_matcher(store, Arc::new(SemverMatcher))
    }

    pub fn with_matcher(store: VersionStore, matcher: Arc<dyn VersionMatcher>) -> Self {
        Self { store, matcher }
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Installed versions of `name`, sorted ascending by the matcher.
    pub fn installed_versions(&self, name: &str) -> PackageResult<Vec<String>> {
        let mut versions = self.store.versions(name)?;
        versions.sort_by(|a, b| self.matcher.compare(a, b));
        Ok(versions)
    }

    /// Choose the installed version of `name` that satisfies `request`.
    pub fn choose(&self, name: &str, request: &str) -> PackageResult<String> {
        let versions = self.installed_versions(name)?;
        let choice = self.choose_from(name, &versions, request)?;
        info!(
            package = name,
            version = %choice,
            request,
            available = %versions.join(", "),
            "chose package version"
        );
        Ok(choice)
    }

    /// Choose among an explicit set of installed versions.
    pub fn choose_from(
        &self,
        name: &str,
        installed: &[String],
        request: &str,
    ) -> PackageResult<String> {
        let mismatch = || PackageError::VersionRangeMismatch {
            name: name.to_string(),
            request: request.to_string(),
            available: installed.to_vec(),
        };
        let choice = self
            .matcher
            .choose(request, installed)
            .map_err(|reason| PackageError::InvalidVersionRange {
                request: request.to_string(),
                reason,
            })?
            .ok_or_else(mismatch)?;
        if !installed.contains(&choice) {
            debug!(package = name, %choice, "matcher returned a version that is not installed");
            return Err(mismatch());
        }
        Ok(choice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn installed(versions: &[&str]) -> Vec<String> {
        versions.iter().map(|v| v.to_string()).collect()
    }

    fn store_with(versions: &[&str]) -> (TempDir, VersionStore) {
        let temp = TempDir::new().unwrap();
        for v in versions {
            std::fs::create_dir_all(temp.path().join("demo").join(v)).unwrap();
        }
        std::fs::create_dir_all(temp.path().join("other").join("0.1.0")).unwrap();
        let store = VersionStore::new(temp.path());
        (temp, store)
    }

    #[test]
    fn test_highest_satisfying_version_wins() {
        let (_temp, store) = store_with(&["0.9.0", "1.0.0", "1.5.0", "2.0.0"]);
        let resolver = VersionResolver::new(store);
        assert_eq!(resolver.choose("demo", ">=1.0,<2.0").unwrap(), "1.5.0");
    }

    #[test]
    fn test_mismatch_lists_all_installed_versions() {
        let (_temp, store) = store_with(&["0.9.0", "1.0.0", "1.5.0", "2.0.0"]);
        let resolver = VersionResolver::new(store);
        let err = resolver.choose("demo", ">=3.0").unwrap_err();
        match err {
            PackageError::VersionRangeMismatch { available, .. } => {
                assert_eq!(available, installed(&["0.9.0", "1.0.0", "1.5.0", "2.0.0"]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_not_installed_lists_present_packages() {
        let (_temp, store) = store_with(&["1.0.0"]);
        let resolver = VersionResolver::new(store);
        match resolver.choose("missing", "*").unwrap_err() {
            PackageError::NotInstalled { installed, .. } => {
                assert_eq!(installed, vec!["demo".to_string(), "other".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bare_version_is_exact() {
        let resolver = VersionResolver::new(VersionStore::new("/nonexistent"));
        let versions = installed(&["1.0.0", "1.5.0"]);
        assert_eq!(resolver.choose_from("demo", &versions, "1.0.0").unwrap(), "1.0.0");
        assert_eq!(resolver.choose_from("demo", &versions, "v1.5").unwrap(), "1.5.0");
        assert_eq!(resolver.choose_from("demo", &versions, "*").unwrap(), "1.5.0");
        assert_eq!(resolver.choose_from("demo", &versions, "==1.0.0").unwrap(), "1.0.0");
    }

    #[test]
    fn test_choice_is_always_a_member() {
        let resolver = VersionResolver::new(VersionStore::new("/nonexistent"));
        let versions = installed(&["0.1.0", "0.2.0", "not-a-version", "1.0.0"]);
        for request in ["*", ">=0.1", "<1.0", "^0.1", "~0.2", ">=5", "=0.3.0"] {
            match resolver.choose_from("demo", &versions, request) {
                Ok(choice) => assert!(versions.contains(&choice), "{request} -> {choice}"),
                Err(e) => assert!(matches!(e, PackageError::VersionRangeMismatch { .. })),
            }
        }
    }

    #[test]
    fn test_invalid_request() {
        let resolver = VersionResolver::new(VersionStore::new("/nonexistent"));
        let err = resolver
            .choose_from("demo", &installed(&["1.0.0"]), ">>1")
            .unwrap_err();
        assert!(matches!(err, PackageError::InvalidVersionRange { .. }));
    }

    #[test]
    fn test_installed_versions_sorted_semantically() {
        let (_temp, store) = store_with(&["1.10.0", "1.2.0", "1.9.0"]);
        let resolver = VersionResolver::new(store);
        assert_eq!(
            resolver.installed_versions("demo").unwrap(),
            installed(&["1.2.0", "1.9.0", "1.10.0"])
        );
    }
}
