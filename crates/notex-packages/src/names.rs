//! Package name rules and path classification.

use crate::error::{PackageError, PackageResult};

/// Human-readable description of the naming rules, used in errors.
pub const PACKAGE_NAME_INFO: &str = "Package names can consist of between 3 and 32 alphanumeric \
    characters, starting with a letter. They are case-insensitive and can contain \"-_.,+\" \
    (not at the end) which are all treated as \"_\".";

/// Whether a resource path points at a remote location.
pub fn is_external(path: &str) -> bool {
    path.contains("//")
}

/// Canonical form of a package name.
///
/// Packages are case-insensitive and treat whitespace and `-_.,+` the same,
/// so `Foo-Bar`, `foo.bar` and `foo__bar` all map to `foo_bar`.
pub fn unique_package_name(name: &str) -> PackageResult<String> {
    let mut canonical = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        let c = if c.is_whitespace() || matches!(c, '.' | '-' | '+' | ',') {
            '_'
        } else {
            c
        };
        if c == '_' && canonical.ends_with('_') {
            continue;
        }
        canonical.push(c);
    }

    if is_valid_canonical_name(&canonical) {
        Ok(canonical)
    } else {
        Err(PackageError::InvalidName {
            name: name.to_string(),
            reason: PACKAGE_NAME_INFO.to_string(),
        })
    }
}

/// `^[a-z][a-z0-9_]{1,30}[a-z0-9]$`
fn is_valid_canonical_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if !(3..=32).contains(&bytes.len()) {
        return false;
    }
    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    first.is_ascii_lowercase()
        && (last.is_ascii_lowercase() || last.is_ascii_digit())
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'_')
}
