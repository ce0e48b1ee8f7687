//! Persistent fix history
//!
//! Each repository gets one JSON document under the history directory
//! recording which strategy last succeeded for each error pattern. A global
//! index, keyed by error pattern alone, lets a fix learned on one
//! repository be offered to another. The global tier is last-writer-wins:
//! it remembers the most recent success, not the most frequent one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RemedyError, Result};
use crate::strategy::FixStrategy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalFix {
    pub error_pattern: String,
    pub strategy: FixStrategy,
    pub success_count: u32,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixHistory {
    pub repo_id: String,
    pub fixes: Vec<HistoricalFix>,
    pub last_resurrection: DateTime<Utc>,
}

impl FixHistory {
    pub fn new(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            fixes: Vec::new(),
            last_resurrection: Utc::now(),
        }
    }

    pub fn find(&self, error_pattern: &str) -> Option<&HistoricalFix> {
        self.fixes.iter().find(|f| f.error_pattern == error_pattern)
    }

    /// Upsert the fix for `error_pattern`. Repeating the same strategy type
    /// increments its count; a different type replaces the entry and starts
    /// over at one.
    pub fn record(
        &mut self,
        error_pattern: &str,
        strategy: FixStrategy,
        now: DateTime<Utc>,
    ) -> &HistoricalFix {
        self.last_resurrection = now;

        let index = match self
            .fixes
            .iter()
            .position(|f| f.error_pattern == error_pattern)
        {
            Some(index) => {
                let fix = &mut self.fixes[index];
                fix.success_count = if fix.strategy.kind() == strategy.kind() {
                    fix.success_count.saturating_add(1)
                } else {
                    1
                };
                fix.strategy = strategy;
                fix.last_used = now;
                index
            }
            None => {
                self.fixes.push(HistoricalFix {
                    error_pattern: error_pattern.to_string(),
                    strategy,
                    success_count: 1,
                    last_used: now,
                });
                self.fixes.len() - 1
            }
        };
        &self.fixes[index]
    }
}

/// Per-repository histories plus the cross-repository index.
#[derive(Debug)]
pub struct FixHistoryStore {
    base_dir: PathBuf,
    repos: HashMap<String, FixHistory>,
    global: HashMap<String, HistoricalFix>,
}

impl FixHistoryStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            repos: HashMap::new(),
            global: HashMap::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn history(&self, repo_id: &str) -> Option<&FixHistory> {
        self.repos.get(repo_id)
    }

    /// Record a successful fix; returns its success count.
    pub fn record_fix(&mut self, repo_id: &str, error_pattern: &str, strategy: FixStrategy) -> u32 {
        let now = Utc::now();
        let history = self
            .repos
            .entry(repo_id.to_string())
            .or_insert_with(|| FixHistory::new(repo_id));
        let fix = history.record(error_pattern, strategy, now).clone();
        let count = fix.success_count;

        tracing::debug!(
            repo_id,
            error_pattern,
            strategy = %fix.strategy.kind(),
            success_count = count,
            "fix recorded"
        );
        self.global.insert(error_pattern.to_string(), fix);
        count
    }

    /// Most recent success for `error_pattern` in any repository.
    pub fn get_successful_fix(&self, error_pattern: &str) -> Option<&FixStrategy> {
        self.global.get(error_pattern).map(|f| &f.strategy)
    }

    /// Repository entry first, then the global index.
    pub fn find_best_fix(&self, repo_id: &str, error_pattern: &str) -> Option<&FixStrategy> {
        self.repos
            .get(repo_id)
            .and_then(|h| h.find(error_pattern))
            .map(|f| &f.strategy)
            .or_else(|| self.get_successful_fix(error_pattern))
    }

    /// Repository fixes, most successful first. Ties keep recording order.
    pub fn get_prioritized_fixes(&self, repo_id: &str) -> Vec<&HistoricalFix> {
        let mut fixes: Vec<&HistoricalFix> = self
            .repos
            .get(repo_id)
            .map(|h| h.fixes.iter().collect())
            .unwrap_or_default();
        fixes.sort_by_key(|f| std::cmp::Reverse(f.success_count));
        fixes
    }

    pub fn history_path(&self, repo_id: &str) -> PathBuf {
        self.base_dir.join(history_file_name(repo_id))
    }

    /// Persist one repository's history. A repository seen for the first
    /// time is saved with an empty fix list.
    pub fn save_history(&mut self, repo_id: &str) -> Result<()> {
        let path = self.history_path(repo_id);
        let history = self
            .repos
            .entry(repo_id.to_string())
            .or_insert_with(|| FixHistory::new(repo_id));

        std::fs::create_dir_all(&self.base_dir).map_err(|e| {
            RemedyError::persistence_with_source(
                format!("failed to create {}", self.base_dir.display()),
                e,
            )
        })?;

        let json = serde_json::to_string_pretty(history)
            .map_err(|e| RemedyError::persistence_with_source("failed to serialize history", e))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes())
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|e| {
                RemedyError::persistence_with_source(
                    format!("failed to write {}", path.display()),
                    e,
                )
            })?;

        tracing::debug!(repo_id, path = %path.display(), fixes = history.fixes.len(), "history saved");
        Ok(())
    }

    /// Load one repository's history into memory. A missing or malformed
    /// document, or one written for a different repository, yields `None`;
    /// fixes newer than the global index's entries are merged into it.
    pub fn load_history(&mut self, repo_id: &str) -> Result<Option<&FixHistory>> {
        let path = self.history_path(repo_id);
        let Some(history) = read_history(&path)? else {
            return Ok(None);
        };
        if history.repo_id != repo_id {
            tracing::warn!(
                repo_id,
                found = %history.repo_id,
                path = %path.display(),
                "ignoring fix history written for another repository"
            );
            return Ok(None);
        }

        self.merge_global(&history);
        tracing::debug!(repo_id, fixes = history.fixes.len(), "history loaded");
        self.repos.insert(repo_id.to_string(), history);
        Ok(self.repos.get(repo_id))
    }

    /// Load every history document under the base directory, seeding the
    /// global index. Returns the number of repositories loaded.
    pub fn load_all(&mut self) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(RemedyError::persistence_with_source(
                    format!("failed to list {}", self.base_dir.display()),
                    e,
                ));
            }
        };

        let mut loaded = 0;
        for entry in entries {
            let path = entry
                .map_err(|e| {
                    RemedyError::persistence_with_source(
                        format!("failed to list {}", self.base_dir.display()),
                        e,
                    )
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(history) = read_history(&path)? else {
                continue;
            };
            // A document only counts under the name its repository maps to.
            if self.history_path(&history.repo_id) != path {
                tracing::warn!(
                    path = %path.display(),
                    repo_id = %history.repo_id,
                    "skipping misplaced fix history"
                );
                continue;
            }
            self.merge_global(&history);
            self.repos.insert(history.repo_id.clone(), history);
            loaded += 1;
        }

        tracing::debug!(
            base_dir = %self.base_dir.display(),
            repositories = loaded,
            patterns = self.global.len(),
            "fix histories loaded"
        );
        Ok(loaded)
    }

    fn merge_global(&mut self, history: &FixHistory) {
        for fix in &history.fixes {
            let newer = self
                .global
                .get(&fix.error_pattern)
                .is_none_or(|existing| existing.last_used < fix.last_used);
            if newer {
                self.global.insert(fix.error_pattern.clone(), fix.clone());
            }
        }
    }

    /// Forget everything held in memory. Files on disk are untouched.
    pub fn clear_all(&mut self) {
        self.repos.clear();
        self.global.clear();
    }
}

/// `owner/repo` → `owner%2Frepo.json`. Percent-encoding keeps distinct
/// repository ids on distinct files.
fn history_file_name(repo_id: &str) -> String {
    format!("{}.json", urlencoding::encode(repo_id))
}

/// Missing file → `None`; malformed document → `None` with a warning.
fn read_history(path: &Path) -> Result<Option<FixHistory>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RemedyError::persistence_with_source(
                format!("failed to read {}", path.display()),
                e,
            ));
        }
    };

    match serde_json::from_str(&text) {
        Ok(history) => Ok(Some(history)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed fix history");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn bump(package: &str) -> FixStrategy {
        FixStrategy::AdjustVersion {
            package: package.to_string(),
            new_version: "latest".to_string(),
        }
    }

    #[test]
    fn same_type_increments_changed_type_resets() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FixHistoryStore::new(dir.path());

        assert_eq!(store.record_fix("acme/app", "dependency_not_found:x", bump("x")), 1);
        assert_eq!(store.record_fix("acme/app", "dependency_not_found:x", bump("x")), 2);
        assert_eq!(
            store.record_fix(
                "acme/app",
                "dependency_not_found:x",
                FixStrategy::RemovePackage {
                    package: "x".to_string()
                }
            ),
            1
        );
        let history = store.history("acme/app").expect("history");
        assert_eq!(history.fixes.len(), 1);
    }

    #[test]
    fn repo_entry_beats_global() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FixHistoryStore::new(dir.path());
        store.record_fix("a", "lockfile_conflict:none", FixStrategy::ForceInstall);
        store.record_fix(
            "b",
            "lockfile_conflict:none",
            FixStrategy::RemoveLockfile {
                lockfile: "package-lock.json".to_string(),
            },
        );

        assert_eq!(
            store.find_best_fix("a", "lockfile_conflict:none"),
            Some(&FixStrategy::ForceInstall)
        );
        assert_eq!(
            store.find_best_fix("c", "lockfile_conflict:none").map(FixStrategy::kind),
            Some(crate::strategy::StrategyKind::RemoveLockfile)
        );
        assert_eq!(store.find_best_fix("c", "unknown:none"), None);
    }

    #[test]
    fn prioritized_fixes_are_stable() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FixHistoryStore::new(dir.path());
        store.record_fix("r", "p1", bump("a"));
        store.record_fix("r", "p2", bump("b"));
        store.record_fix("r", "p3", bump("c"));
        store.record_fix("r", "p3", bump("c"));

        let order: Vec<&str> = store
            .get_prioritized_fixes("r")
            .into_iter()
            .map(|f| f.error_pattern.as_str())
            .collect();
        assert_eq!(order, vec!["p3", "p1", "p2"]);
        assert!(store.get_prioritized_fixes("missing").is_empty());
    }

    #[test]
    fn save_load_round_trip_seeds_global() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FixHistoryStore::new(dir.path());
        store.record_fix("acme/app", "type_error:none", FixStrategy::ForceInstall);
        store.save_history("acme/app").expect("save");
        assert!(dir.path().join("acme%2Fapp.json").exists());

        let saved = store.history("acme/app").cloned().expect("history");
        store.clear_all();
        assert_eq!(store.get_successful_fix("type_error:none"), None);

        let loaded = store.load_history("acme/app").expect("load").cloned();
        assert_eq!(loaded, Some(saved));
        assert_eq!(
            store.get_successful_fix("type_error:none"),
            Some(&FixStrategy::ForceInstall)
        );
    }

    #[test]
    fn missing_and_malformed_documents_load_as_none() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FixHistoryStore::new(dir.path());
        assert_eq!(store.load_history("nobody").expect("load"), None);

        std::fs::write(dir.path().join("broken.json"), "{\"repoId\": 3").expect("write");
        assert_eq!(store.load_history("broken").expect("load"), None);
    }

    #[test]
    fn distinct_repo_ids_get_distinct_files() {
        assert_eq!(history_file_name("github.com/acme/app"), "github.com%2Facme%2Fapp.json");
        assert_eq!(history_file_name("../escape"), "..%2Fescape.json");

        let store = FixHistoryStore::new("/unused");
        assert_ne!(store.history_path("acme/app"), store.history_path("acme_app"));
    }

    #[test]
    fn document_for_another_repo_is_not_loaded() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FixHistoryStore::new(dir.path());
        store.record_fix("acme/app", "type_error:none", FixStrategy::ForceInstall);
        store.save_history("acme/app").expect("save");

        std::fs::copy(
            store.history_path("acme/app"),
            store.history_path("acme_app"),
        )
        .expect("copy");

        let mut fresh = FixHistoryStore::new(dir.path());
        assert_eq!(fresh.load_history("acme_app").expect("load"), None);
        assert_eq!(fresh.get_successful_fix("type_error:none"), None);
        assert_eq!(fresh.load_all().expect("load all"), 1);
        assert!(fresh.history("acme_app").is_none());
        assert!(fresh.history("acme/app").is_some());
    }

    #[test]
    fn load_all_seeds_the_global_index() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = FixHistoryStore::new(dir.path());
        store.record_fix("a/one", "lockfile_conflict:none", FixStrategy::ForceInstall);
        store.record_fix("b/two", "peer_dependency_conflict:react", FixStrategy::LegacyPeerDeps);
        store.save_history("a/one").expect("save");
        store.save_history("b/two").expect("save");
        std::fs::write(dir.path().join("notes.txt"), "not a history").expect("write");

        let mut fresh = FixHistoryStore::new(dir.path());
        assert_eq!(fresh.load_all().expect("load all"), 2);
        assert_eq!(
            fresh.find_best_fix("c/three", "peer_dependency_conflict:react"),
            Some(&FixStrategy::LegacyPeerDeps)
        );
        assert_eq!(
            fresh.find_best_fix("c/three", "lockfile_conflict:none"),
            Some(&FixStrategy::ForceInstall)
        );

        let mut empty = FixHistoryStore::new(dir.path().join("missing"));
        assert_eq!(empty.load_all().expect("load all"), 0);
    }
}
