//! npm lockfile parsing
//!
//! Produces the URL-based transitive dependencies of a project from
//! `npm-shrinkwrap.json` or `package-lock.json`.
//!
//! Lockfile v2/v3 documents key every installed package by its
//! `node_modules/...` path in `packages`; v1 documents nest packages under
//! `dependencies`. Both are flattened into the path-keyed form, then walked
//! breadth-first from the root's direct dependencies using Node's lookup
//! rule (nearest enclosing `node_modules`, then the top level), so every
//! package is reached first along its shortest chain.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::dead_url::{LockfileParser, TransitiveDependencyNode};
use crate::error::{RemedyError, Result};
use crate::manifest::{FsManifestAccessor, ManifestAccessor, PackageManifest};
use crate::source::{is_registry_tarball, is_url_spec};

/// Lockfiles in the order npm honors them.
pub const LOCKFILE_NAMES: [&str; 2] = ["npm-shrinkwrap.json", "package-lock.json"];

const NODE_MODULES: &str = "node_modules/";

/// Root-level dependency maps of a v2/v3 lockfile.
const ROOT_DEPENDENCY_KEYS: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "optionalDependencies",
    "peerDependencies",
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct LockEntry {
    name: String,
    /// URL-based source, when the package is not a registry install
    source: Option<String>,
    requires: Vec<String>,
}

/// Flattened lockfile: package path → entry, plus the root's direct names.
#[derive(Debug, Default)]
struct LockTree {
    entries: HashMap<String, LockEntry>,
    direct: Vec<String>,
}

pub struct NpmLockfileParser {
    files: Arc<dyn ManifestAccessor>,
}

impl Default for NpmLockfileParser {
    fn default() -> Self {
        Self::new(Arc::new(FsManifestAccessor))
    }
}

impl NpmLockfileParser {
    pub fn new(files: Arc<dyn ManifestAccessor>) -> Self {
        Self { files }
    }

    async fn read_lockfile(&self, project_path: &Path) -> Result<Option<(String, String)>> {
        for name in LOCKFILE_NAMES {
            let path = project_path.join(name);
            if !self.files.exists(&path).await {
                continue;
            }
            let text = self.files.read_text(&path).await.map_err(|e| {
                RemedyError::lockfile_with_source(format!("failed to read {}", path.display()), e)
            })?;
            return Ok(Some((name.to_string(), text)));
        }
        Ok(None)
    }
}

#[async_trait]
impl LockfileParser for NpmLockfileParser {
    async fn parse(&self, project_path: &Path) -> Result<Vec<TransitiveDependencyNode>> {
        let Some((name, text)) = self.read_lockfile(project_path).await? else {
            tracing::debug!(project = %project_path.display(), "no lockfile, no transitive dependencies");
            return Ok(Vec::new());
        };

        let doc: Value = serde_json::from_str(&text)
            .map_err(|e| RemedyError::lockfile_with_source(format!("{name} is not valid JSON"), e))?;

        let mut tree = if doc.get("packages").is_some_and(Value::is_object) {
            flatten_packages(&doc)
        } else {
            flatten_v1(&doc)
        };

        if tree.direct.is_empty() {
            // v1 lockfiles do not list the root's dependencies.
            tree.direct = match PackageManifest::read(self.files.as_ref(), project_path).await {
                Ok(manifest) => manifest
                    .direct_dependencies()
                    .into_iter()
                    .map(|d| d.name)
                    .collect(),
                Err(_) => top_level_names(&tree),
            };
        }

        let nodes = walk(&tree);
        tracing::debug!(
            lockfile = %name,
            packages = tree.entries.len(),
            url_nodes = nodes.len(),
            "lockfile parsed"
        );
        Ok(nodes)
    }
}

/// URL-based, non-registry source of a lock entry.
fn url_source(entry: &Value) -> Option<String> {
    ["resolved", "version"]
        .into_iter()
        .filter_map(|key| entry.get(key).and_then(Value::as_str))
        .find(|s| is_url_spec(s) && !is_registry_tarball(s))
        .map(str::to_string)
}

fn object_keys(entry: &Value, keys: &[&str]) -> Vec<String> {
    keys.iter()
        .filter_map(|key| entry.get(*key).and_then(Value::as_object))
        .flat_map(|map| map.keys().cloned())
        .collect()
}

fn package_name_from_path(path: &str) -> &str {
    match path.rfind(NODE_MODULES) {
        Some(idx) => &path[idx + NODE_MODULES.len()..],
        None => path,
    }
}

/// `node_modules/a/node_modules/b` → `node_modules/a`; top level → root (`""`).
fn parent_path(path: &str) -> &str {
    match path.rfind("/node_modules/") {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn flatten_packages(doc: &Value) -> LockTree {
    let mut tree = LockTree::default();
    let Some(packages) = doc.get("packages").and_then(Value::as_object) else {
        return tree;
    };

    for (path, entry) in packages {
        if path.is_empty() {
            tree.direct = object_keys(entry, &ROOT_DEPENDENCY_KEYS);
            continue;
        }
        // Workspace sources (`packages/foo`) are not installed packages.
        if !path.starts_with(NODE_MODULES) {
            continue;
        }
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_else(|| package_name_from_path(path))
            .to_string();
        tree.entries.insert(
            path.clone(),
            LockEntry {
                name,
                source: url_source(entry),
                requires: object_keys(entry, &["dependencies", "optionalDependencies"]),
            },
        );
    }
    tree
}

fn flatten_v1(doc: &Value) -> LockTree {
    fn visit(prefix: &str, deps: &serde_json::Map<String, Value>, tree: &mut LockTree) {
        for (name, entry) in deps {
            let path = if prefix.is_empty() {
                format!("{NODE_MODULES}{name}")
            } else {
                format!("{prefix}/{NODE_MODULES}{name}")
            };
            tree.entries.insert(
                path.clone(),
                LockEntry {
                    name: name.clone(),
                    source: url_source(entry),
                    requires: object_keys(entry, &["requires"]),
                },
            );
            if let Some(nested) = entry.get("dependencies").and_then(Value::as_object) {
                visit(&path, nested, tree);
            }
        }
    }

    let mut tree = LockTree::default();
    if let Some(deps) = doc.get("dependencies").and_then(Value::as_object) {
        visit("", deps, &mut tree);
    }
    tree
}

fn top_level_names(tree: &LockTree) -> Vec<String> {
    let mut names: Vec<String> = tree
        .entries
        .iter()
        .filter(|(path, _)| parent_path(path).is_empty())
        .map(|(_, entry)| entry.name.clone())
        .collect();
    names.sort();
    names
}

/// Node's lookup: `<from>/node_modules/<name>`, then each enclosing package,
/// then the top level.
fn resolve(tree: &LockTree, from: &str, name: &str) -> Option<String> {
    let mut base = from;
    loop {
        let candidate = if base.is_empty() {
            format!("{NODE_MODULES}{name}")
        } else {
            format!("{base}/{NODE_MODULES}{name}")
        };
        if tree.entries.contains_key(&candidate) {
            return Some(candidate);
        }
        if base.is_empty() {
            return None;
        }
        base = parent_path(base);
    }
}

fn walk(tree: &LockTree) -> Vec<TransitiveDependencyNode> {
    let mut nodes = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<(String, Vec<String>)> = VecDeque::new();

    for name in &tree.direct {
        if let Some(path) = resolve(tree, "", name)
            && visited.insert(path.clone())
        {
            queue.push_back((path, Vec::new()));
        }
    }

    while let Some((path, parents)) = queue.pop_front() {
        let Some(entry) = tree.entries.get(&path) else {
            continue;
        };

        if !parents.is_empty()
            && let Some(url) = &entry.source
        {
            nodes.push(TransitiveDependencyNode {
                name: entry.name.clone(),
                resolved_url: url.clone(),
                parents: parents.clone(),
                depth: parents.len(),
            });
        }

        let mut chain = parents;
        chain.push(entry.name.clone());
        for required in &entry.requires {
            if let Some(child) = resolve(tree, &path, required)
                && visited.insert(child.clone())
            {
                queue.push_back((child, chain.clone()));
            }
        }
    }

    nodes
}
