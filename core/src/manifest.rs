//! Project manifest access
//!
//! [`ManifestAccessor`] is the file capability every mutation goes through,
//! so tests can substitute an in-memory project. [`PackageManifest`] edits a
//! `package.json` in place; `serde_json` is built with `preserve_order` so a
//! rewrite keeps the author's key order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{RemedyError, Result};
use crate::source::DependencySpec;

pub const PACKAGE_JSON: &str = "package.json";

/// Sections consulted when locating a direct dependency, in lookup order.
pub const DEPENDENCY_SECTIONS: [&str; 2] = ["dependencies", "devDependencies"];

/// Text file capability for manifest, config and lockfile mutations.
#[async_trait]
pub trait ManifestAccessor: Send + Sync {
    async fn read_text(&self, path: &Path) -> std::io::Result<String>;

    async fn write_text(&self, path: &Path, contents: &str) -> std::io::Result<()>;

    async fn remove_file(&self, path: &Path) -> std::io::Result<()>;

    async fn exists(&self, path: &Path) -> bool;
}

/// [`ManifestAccessor`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsManifestAccessor;

#[async_trait]
impl ManifestAccessor for FsManifestAccessor {
    async fn read_text(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write_text(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

pub fn manifest_path(project_path: &Path) -> PathBuf {
    project_path.join(PACKAGE_JSON)
}

/// Editable view over a `package.json` object.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    root: Map<String, Value>,
}

impl PackageManifest {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RemedyError::manifest_with_source("package.json is not valid JSON", e))?;
        match value {
            Value::Object(root) => Ok(Self { root }),
            _ => Err(RemedyError::manifest("package.json is not a JSON object")),
        }
    }

    /// Read `<project>/package.json`. A missing file is `ManifestNotFound`.
    pub async fn read(accessor: &dyn ManifestAccessor, project_path: &Path) -> Result<Self> {
        let path = manifest_path(project_path);
        match accessor.read_text(&path).await {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RemedyError::manifest_not_found(path))
            }
            Err(e) => Err(RemedyError::manifest_with_source(
                format!("failed to read {}", path.display()),
                e,
            )),
        }
    }

    pub async fn write(&self, accessor: &dyn ManifestAccessor, project_path: &Path) -> Result<()> {
        let path = manifest_path(project_path);
        accessor
            .write_text(&path, &self.to_json_string())
            .await
            .map_err(|e| {
                RemedyError::manifest_with_source(format!("failed to write {}", path.display()), e)
            })
    }

    /// npm formatting: two-space indent, trailing newline.
    pub fn to_json_string(&self) -> String {
        let mut out = serde_json::to_string_pretty(&self.root).unwrap_or_else(|_| "{}".to_string());
        out.push('\n');
        out
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Direct dependencies from `dependencies` then `devDependencies`.
    /// Non-string specifiers are skipped.
    pub fn direct_dependencies(&self) -> Vec<DependencySpec> {
        DEPENDENCY_SECTIONS
            .iter()
            .filter_map(|section| self.root.get(*section).and_then(Value::as_object))
            .flat_map(|deps| {
                deps.iter().filter_map(|(name, spec)| {
                    spec.as_str().map(|spec| DependencySpec::new(name.clone(), spec))
                })
            })
            .collect()
    }

    /// First section (in [`DEPENDENCY_SECTIONS`] order) declaring `name`.
    pub fn section_of(&self, name: &str) -> Option<&'static str> {
        DEPENDENCY_SECTIONS.into_iter().find(|section| {
            self.root
                .get(*section)
                .and_then(Value::as_object)
                .is_some_and(|deps| deps.contains_key(name))
        })
    }

    pub fn version_of(&self, name: &str) -> Option<&str> {
        let section = self.section_of(name)?;
        self.root.get(section)?.get(name)?.as_str()
    }

    /// Rewrite `name` in every section declaring it. Returns whether anything changed.
    pub fn set_version(&mut self, name: &str, version: &str) -> bool {
        let mut changed = false;
        for section in DEPENDENCY_SECTIONS {
            if let Some(deps) = self.root.get_mut(section).and_then(Value::as_object_mut)
                && let Some(current) = deps.get_mut(name)
                && current.as_str() != Some(version)
            {
                *current = Value::String(version.to_string());
                changed = true;
            }
        }
        changed
    }

    /// Remove `name` from every section declaring it. Returns whether anything changed.
    pub fn remove_dependency(&mut self, name: &str) -> bool {
        let mut changed = false;
        for section in DEPENDENCY_SECTIONS {
            if let Some(deps) = self.root.get_mut(section).and_then(Value::as_object_mut) {
                changed |= deps.shift_remove(name).is_some();
            }
        }
        changed
    }

    /// Insert into `section`, creating it when absent.
    pub fn insert_dependency(&mut self, section: &str, name: &str, version: &str) {
        self.insert_into(section, name, version);
    }

    /// Set `name` in a top-level string map such as `resolutions` or `overrides`.
    pub fn set_pinned(&mut self, table: &str, name: &str, version: &str) -> bool {
        self.insert_into(table, name, version)
    }

    /// Insert `name: version` into the object at `key`, replacing a
    /// non-object value. Returns whether the document changed.
    fn insert_into(&mut self, key: &str, name: &str, version: &str) -> bool {
        let next = Value::String(version.to_string());
        match self.root.get_mut(key) {
            Some(Value::Object(map)) => {
                if map.get(name) == Some(&next) {
                    return false;
                }
                map.insert(name.to_string(), next);
            }
            _ => {
                let mut map = Map::new();
                map.insert(name.to_string(), next);
                self.root.insert(key.to_string(), Value::Object(map));
            }
        }
        true
    }
}

/// Add a `^` range prefix unless the version already carries an operator
/// or is a dist-tag.
pub fn caret_range(version: &str) -> String {
    let version = version.trim();
    if version.starts_with(|c: char| c.is_ascii_digit()) {
        format!("^{version}")
    } else {
        version.to_string()
    }
}
