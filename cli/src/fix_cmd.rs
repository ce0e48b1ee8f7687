//! `resurrect fix` and `resurrect record`: install-error remediation with
//! learned history

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use resurrect_core::{
    AnalyzedError, FixOutcome, FixSession, FixStrategy, Resurrector, classify_install_output,
};

#[derive(Debug, Parser)]
pub struct FixArgs {
    /// Project directory containing package.json
    #[arg(value_name = "PROJECT", default_value = ".")]
    pub project: PathBuf,

    /// Repository identity the fix history is keyed by (e.g. owner/repo)
    #[arg(long, value_name = "ID")]
    pub repo_id: String,

    /// Captured output of the failing install or build
    #[arg(long, value_name = "FILE")]
    pub log: PathBuf,

    /// Print the selected strategy without applying it
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

impl FixArgs {
    pub async fn run(self) -> i32 {
        match self.execute().await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("error: {e:#}");
                1
            }
        }
    }

    async fn execute(&self) -> anyhow::Result<i32> {
        let errors = classify_log(&self.log)?;
        let Some(top) = errors.first() else {
            println!("no install errors recognized in {}", self.log.display());
            return Ok(0);
        };

        let mut engine = Resurrector::new()?;
        engine.history_mut().load_all()?;
        let strategies = engine.strategy_engine();
        let session = FixSession::new();
        let strategy =
            strategies.select_strategy_from_store(&session, top, engine.history(), &self.repo_id);

        let outcome = if self.dry_run {
            None
        } else {
            Some(strategies.apply_fix(&self.project, &strategy).await)
        };

        if self.json {
            let report = serde_json::json!({
                "error": top,
                "strategy": strategy,
                "outcome": outcome,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("error:    {} ({})", top.error_pattern(), top.message);
            println!("strategy: {}", serde_json::to_string(&strategy)?);
            match &outcome {
                None => println!("dry run, nothing applied"),
                Some(FixOutcome { success: true, .. }) => {
                    println!("applied; reinstall, then record it with `resurrect record` if it worked");
                }
                Some(FixOutcome { error, .. }) => {
                    println!("failed:   {}", error.as_deref().unwrap_or("unknown error"));
                }
            }
        }

        Ok(match outcome {
            Some(FixOutcome { success: false, .. }) => 1,
            _ => 0,
        })
    }
}

#[derive(Debug, Parser)]
pub struct RecordArgs {
    /// Repository identity the fix history is keyed by
    #[arg(long, value_name = "ID")]
    pub repo_id: String,

    /// Install or build output the strategy fixed
    #[arg(long, value_name = "FILE")]
    pub log: PathBuf,

    /// Strategy that worked, as JSON (e.g. '{"type":"legacy_peer_deps"}')
    #[arg(long, value_name = "JSON")]
    pub strategy: String,
}

impl RecordArgs {
    pub fn run(self) -> i32 {
        match self.execute() {
            Ok(code) => code,
            Err(e) => {
                eprintln!("error: {e:#}");
                1
            }
        }
    }

    fn execute(&self) -> anyhow::Result<i32> {
        let strategy: FixStrategy =
            serde_json::from_str(&self.strategy).context("invalid --strategy JSON")?;
        let errors = classify_log(&self.log)?;
        let Some(top) = errors.first() else {
            println!("no install errors recognized in {}", self.log.display());
            return Ok(1);
        };

        let mut engine = Resurrector::new()?;
        engine.history_mut().load_all()?;
        let strategies = engine.strategy_engine();
        strategies.record_outcome(
            engine.history_mut(),
            &self.repo_id,
            top,
            &strategy,
            &FixOutcome::ok(),
        );
        engine.history_mut().save_history(&self.repo_id)?;

        println!(
            "recorded {} for {} in {}",
            strategy.kind(),
            top.error_pattern(),
            self.repo_id
        );
        Ok(0)
    }
}

fn classify_log(path: &Path) -> anyhow::Result<Vec<AnalyzedError>> {
    let output = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read log {}", path.display()))?;
    Ok(classify_install_output(&output))
}
