//! `resurrect deps`: dead-URL pass over a project's `package.json`

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use resurrect_core::{
    ApplyReport, DeadUrlAction, DeadUrlHandlingSummary, FsManifestAccessor, PackageManifest,
    ProjectContext, Resurrector,
};

#[derive(Debug, Parser)]
pub struct DepsArgs {
    /// Project directory containing package.json
    #[arg(value_name = "PROJECT", default_value = ".")]
    pub project: PathBuf,

    /// Also resolve URL-based dependencies found in the lockfile
    #[arg(long)]
    pub transitive: bool,

    /// Rewrite package.json with the replacements
    #[arg(long)]
    pub write: bool,

    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl DepsArgs {
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
        let engine = Resurrector::new()?;
        let resolver = engine.dead_url_resolver()?;

        let manifest = PackageManifest::read(&FsManifestAccessor, &self.project)
            .await
            .with_context(|| format!("cannot read manifest in {}", self.project.display()))?;
        let deps = manifest.direct_dependencies();
        let project = ProjectContext::new(&self.project);

        let summary = if self.transitive {
            resolver
                .handle_dead_urls_with_transitive(&project, &deps)
                .await?
        } else {
            resolver.handle_dead_urls(&project, &deps).await?
        };

        let report = if self.write {
            Some(
                resolver
                    .apply_to_package_json(&self.project, &summary.results)
                    .await?,
            )
        } else {
            None
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary, report.as_ref());
        }
        Ok(0)
    }
}

fn print_summary(summary: &DeadUrlHandlingSummary, report: Option<&ApplyReport>) {
    for result in &summary.results {
        let location = match (&result.parent_chain, result.depth) {
            (Some(chain), Some(depth)) => format!(" (depth {depth}, via {})", chain.join(" > ")),
            _ => String::new(),
        };
        match result.action {
            DeadUrlAction::Kept => println!("  ok       {}{location}", result.package_name),
            DeadUrlAction::Replaced => println!(
                "  replace  {} -> {}@{}{location}",
                result.package_name,
                result.target_package(),
                result.npm_alternative.as_deref().unwrap_or("latest"),
            ),
            DeadUrlAction::Removed => println!("  remove   {}{location}", result.package_name),
        }
        if let Some(warning) = &result.warning {
            println!("           {warning}");
        }
    }

    println!();
    println!(
        "{} checked, {} dead, {} replaced from npm, {} removed",
        summary.total_checked, summary.dead_urls_found, summary.resolved_via_npm, summary.removed
    );

    match report {
        Some(report) if report.changed() => println!(
            "package.json updated: {} rewritten, {} removed",
            report.updated.len(),
            report.removed.len()
        ),
        Some(_) => println!("package.json unchanged"),
        None if summary.dead_urls_found > 0 => println!("re-run with --write to apply"),
        None => {}
    }
    if let Some(report) = report
        && !report.skipped.is_empty()
    {
        println!("not direct dependencies, left to the lockfile: {}", report.skipped.join(", "));
    }
}
