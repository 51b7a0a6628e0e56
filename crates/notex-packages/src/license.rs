//! License texts packages may declare.
//!
//! Texts are templates with `{name}` and `{year}` placeholders. The table is
//! built once and shared read-only (`Arc<LicenseTable>` in the load context).

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{PackageError, PackageResult};

/// Placeholder used when a package declares an unrecognized license.
pub const UNKNOWN_LICENSE_TEXT: &str = "??";

/// License texts embedded at compile time.
///
/// Format: (license_key, license_template)
pub static BUILTIN_LICENSES: &[(&str, &str)] = &[
    (
        "BSD-3-Clause",
        include_str!("../licenses/BSD-3-Clause"),
    ),
    ("ISC", include_str!("../licenses/ISC")),
    ("MIT", include_str!("../licenses/MIT")),
];

/// Immutable license key -> template table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseTable {
    texts: BTreeMap<String, String>,
}

impl LicenseTable {
    /// Table of the built-in licenses.
    pub fn builtin() -> Self {
        Self::from_entries(
            BUILTIN_LICENSES
                .iter()
                .map(|(key, text)| (key.to_string(), text.to_string())),
        )
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            texts: entries.into_iter().collect(),
        }
    }

    /// Load every file in `dir` as a license named after the file.
    pub fn from_dir(dir: &Path) -> PackageResult<Self> {
        let mut texts = BTreeMap::new();
        let entries = std::fs::read_dir(dir).map_err(|e| PackageError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| PackageError::io(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let text = std::fs::read_to_string(&path).map_err(|e| PackageError::io(&path, e))?;
            texts.insert(entry.file_name().to_string_lossy().into_owned(), text);
        }
        Ok(Self { texts })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.texts.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.texts.keys().map(String::as_str)
    }

    /// License text for `key` with the holder name and year filled in.
    pub fn render(&self, key: &str, name: &str, year: i32) -> Option<String> {
        self.texts.get(key).map(|template| {
            template
                .replace("{name}", name)
                .replace("{year}", &year.to_string())
        })
    }
}
