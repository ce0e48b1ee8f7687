//! Strategy application on project directories and learning across
//! sessions.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use resurrect_core::{
    AnalyzedError, FailureCategory, FixHistoryStore, FixOutcome, FixSession, FixStrategy,
    FixStrategyEngine, PatternRegistry, classify_install_output,
};
use serde_json::{Value, json};
use tempfile::TempDir;

use common::MemoryFiles;

const MANIFEST: &str = r#"{
  "name": "legacy-app",
  "dependencies": {
    "node-sass": "4.14.1",
    "react": "^15.0.0"
  },
  "devDependencies": {
    "mocha": "^2.0.0"
  }
}
"#;

fn project() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("package.json"), MANIFEST).expect("write package.json");
    dir
}

fn manifest(dir: &Path) -> Value {
    let text = std::fs::read_to_string(dir.join("package.json")).expect("read package.json");
    serde_json::from_str(&text).expect("parse package.json")
}

fn engine() -> FixStrategyEngine {
    FixStrategyEngine::default()
        .with_registry(Arc::new(PatternRegistry::with_defaults("unused.json")))
        .with_host_arch("arm64")
}

#[tokio::test]
async fn adjust_version_rewrites_the_range() {
    let dir = project();
    let outcome = engine()
        .apply_fix(
            dir.path(),
            &FixStrategy::AdjustVersion {
                package: "react".to_string(),
                new_version: "16.14.0".to_string(),
            },
        )
        .await;

    assert_eq!(outcome, FixOutcome::ok());
    assert_eq!(manifest(dir.path())["dependencies"]["react"], json!("^16.14.0"));
}

#[tokio::test]
async fn npmrc_directives_are_appended_once() {
    let dir = project();
    std::fs::write(dir.path().join(".npmrc"), "registry=https://registry.npmjs.org/").expect("write");
    let engine = engine();

    for _ in 0..2 {
        assert!(engine.apply_fix(dir.path(), &FixStrategy::LegacyPeerDeps).await.success);
    }
    assert!(engine.apply_fix(dir.path(), &FixStrategy::ForceInstall).await.success);

    let npmrc = std::fs::read_to_string(dir.path().join(".npmrc")).expect("read .npmrc");
    assert_eq!(
        npmrc,
        "registry=https://registry.npmjs.org/\nlegacy-peer-deps=true\nforce=true\n"
    );
}

#[tokio::test]
async fn remove_lockfile_deletes_only_when_present() {
    let dir = project();
    let lockfile = dir.path().join("package-lock.json");
    std::fs::write(&lockfile, "{}").expect("write lockfile");
    let strategy = FixStrategy::RemoveLockfile {
        lockfile: "package-lock.json".to_string(),
    };

    assert!(engine().apply_fix(dir.path(), &strategy).await.success);
    assert!(!lockfile.exists());
    assert!(engine().apply_fix(dir.path(), &strategy).await.success);

    let escape = FixStrategy::RemoveLockfile {
        lockfile: "../package-lock.json".to_string(),
    };
    assert!(!engine().apply_fix(dir.path(), &escape).await.success);
}

#[tokio::test]
async fn substitute_package_uses_registry_version() {
    let dir = project();
    let outcome = engine()
        .apply_fix(
            dir.path(),
            &FixStrategy::SubstitutePackage {
                original: "node-sass".to_string(),
                replacement: "sass".to_string(),
            },
        )
        .await;
    assert!(outcome.success, "{outcome:?}");

    let deps = manifest(dir.path())["dependencies"].clone();
    assert_eq!(deps.get("node-sass"), None);
    assert_eq!(deps["sass"], json!("^1.69.0"));
}

#[tokio::test]
async fn remove_package_and_add_resolution() {
    let dir = project();
    let engine = engine();

    let removed = engine
        .apply_fix(
            dir.path(),
            &FixStrategy::RemovePackage {
                package: "mocha".to_string(),
            },
        )
        .await;
    assert!(removed.success);

    let pinned = engine
        .apply_fix(
            dir.path(),
            &FixStrategy::AddResolution {
                package: "react".to_string(),
                version: "16.14.0".to_string(),
            },
        )
        .await;
    assert!(pinned.success);

    let doc = manifest(dir.path());
    assert_eq!(doc["devDependencies"], json!({}));
    assert_eq!(doc["resolutions"]["react"], json!("16.14.0"));
    assert_eq!(doc["overrides"]["react"], json!("16.14.0"));
}

#[tokio::test]
async fn unchanged_resolution_is_not_rewritten() {
    let project = Path::new("/project");
    let files = Arc::new(MemoryFiles::with_file(project.join("package.json"), MANIFEST));
    let engine = engine().with_manifest_accessor(files.clone());
    let pin = FixStrategy::AddResolution {
        package: "react".to_string(),
        version: "16.14.0".to_string(),
    };

    assert!(engine.apply_fix(project, &pin).await.success);
    assert!(engine.apply_fix(project, &pin).await.success);
    assert_eq!(files.write_count(), 1);

    assert!(engine.apply_fix(project, &FixStrategy::LegacyPeerDeps).await.success);
    assert_eq!(
        files.contents(&project.join(".npmrc")).as_deref(),
        Some("legacy-peer-deps=true\n")
    );
    assert_eq!(files.write_count(), 2);
}

#[tokio::test]
async fn missing_manifest_and_package_are_reported_not_raised() {
    let empty = TempDir::new().expect("temp dir");
    let outcome = engine()
        .apply_fix(
            empty.path(),
            &FixStrategy::RemovePackage {
                package: "mocha".to_string(),
            },
        )
        .await;
    assert!(!outcome.success);
    assert!(outcome.error.as_deref().is_some_and(|e| e.contains("package.json")));

    let dir = project();
    let outcome = engine()
        .apply_fix(
            dir.path(),
            &FixStrategy::AdjustVersion {
                package: "left-pad".to_string(),
                new_version: "1.3.0".to_string(),
            },
        )
        .await;
    assert!(!outcome.success);
    assert!(outcome.error.as_deref().is_some_and(|e| e.contains("left-pad")));
}

#[tokio::test]
async fn learned_fix_is_preferred_in_the_next_session() {
    let history_dir = TempDir::new().expect("temp dir");
    let dir = project();
    let engine = engine();
    let error = AnalyzedError::new(FailureCategory::PeerDependencyConflict, "ERESOLVE")
        .with_package("react")
        .with_version_constraint("^16.8.0");

    // First session: the default catalog leads with legacy-peer-deps, the
    // resolution is what finally works.
    let mut store = FixHistoryStore::new(history_dir.path());
    let mut session = FixSession::new();
    let first = engine.select_strategy_from_store(&session, &error, &store, "acme/app");
    assert_eq!(first, FixStrategy::LegacyPeerDeps);
    session.mark_strategy_attempted(&error, &first);

    let second = engine.select_strategy_from_store(&session, &error, &store, "acme/app");
    assert_eq!(
        second,
        FixStrategy::AddResolution {
            package: "react".to_string(),
            version: "^16.8.0".to_string(),
        }
    );
    let outcome = engine.apply_fix(dir.path(), &second).await;
    assert!(engine.record_outcome(&mut store, "acme/app", &error, &second, &outcome));
    assert!(!engine.record_outcome(
        &mut store,
        "acme/app",
        &error,
        &first,
        &FixOutcome::failed("still broken")
    ));
    store.save_history("acme/app").expect("save");

    // Next session, fresh process.
    let mut store = FixHistoryStore::new(history_dir.path());
    store.load_history("acme/app").expect("load");
    let session = FixSession::new();
    assert_eq!(
        engine.select_strategy_from_store(&session, &error, &store, "acme/app"),
        second
    );

    // Another repository benefits through the global index.
    assert_eq!(
        engine.select_strategy_from_store(&session, &error, &store, "other/repo"),
        second
    );
}

#[tokio::test]
async fn fix_learned_in_one_repository_is_offered_to_another_after_restart() {
    let history_dir = TempDir::new().expect("temp dir");
    let error = AnalyzedError::new(FailureCategory::LockfileConflict, "EINTEGRITY");
    let learned = FixStrategy::ForceInstall;
    let session = FixSession::new();
    assert_ne!(engine().select_strategy(&session, &error, None), learned);

    let mut store = FixHistoryStore::new(history_dir.path());
    assert!(engine().record_outcome(&mut store, "acme/first", &error, &learned, &FixOutcome::ok()));
    store.save_history("acme/first").expect("save");

    let mut store = FixHistoryStore::new(history_dir.path());
    assert_eq!(store.load_all().expect("load all"), 1);
    assert_eq!(
        engine().select_strategy_from_store(&session, &error, &store, "acme/second"),
        learned
    );
}

#[test]
fn classified_log_feeds_strategy_selection() {
    let log = "npm ERR! Failed at the node-sass@4.14.1 postinstall script.\n\
               gyp ERR! stack Error: `make` failed with exit code: 2\n";
    let errors = classify_install_output(log);
    let top = errors.first().expect("classified error");
    assert_eq!(top.category, FailureCategory::NativeModuleFailure);

    let strategy = engine().select_strategy(&FixSession::new(), top, None);
    assert_eq!(
        strategy,
        FixStrategy::SubstitutePackage {
            original: "node-sass".to_string(),
            replacement: "sass".to_string(),
        }
    );
}
