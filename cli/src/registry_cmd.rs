//! `resurrect registry`: pattern registry queries

use clap::{Parser, Subcommand};
use resurrect_core::{PatternRegistry, ResurrectConfig};

#[derive(Debug, Parser)]
pub struct RegistryCli {
    #[command(subcommand)]
    pub command: RegistrySubcommand,

    /// Output as JSON for automation
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum RegistrySubcommand {
    /// Show the known replacement for a package
    Lookup {
        #[arg(value_name = "PACKAGE")]
        name: String,
    },

    /// Show the dead-URL pattern a URL matches, if any
    Match {
        #[arg(value_name = "URL")]
        url: String,
    },
}

impl RegistryCli {
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
        let config = ResurrectConfig::load()?;
        let registry = PatternRegistry::load(&config.registry_path);

        match &self.command {
            RegistrySubcommand::Lookup { name } => {
                let entry = registry.lookup(name);
                let arch = registry.find_architecture_incompatible(name, &config.host_arch);
                if self.json {
                    let report = serde_json::json!({
                        "replacement": entry,
                        "architectureIncompatible": arch,
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    match entry {
                        Some(entry) => {
                            println!("{} -> {}", entry.old_name, entry.new_name);
                            if let Some(version) = entry.target_version("*") {
                                println!("  version: {version}");
                            }
                            if let Some(description) = &entry.code_change_description {
                                println!("  code changes: {description}");
                            }
                        }
                        None => println!("no known replacement for {name}"),
                    }
                    if let Some(arch) = arch {
                        println!(
                            "  incompatible with {}: {}",
                            config.host_arch, arch.reason
                        );
                    }
                }
                Ok(if entry.is_some() || arch.is_some() { 0 } else { 1 })
            }
            RegistrySubcommand::Match { url } => {
                let pattern = registry.matches_dead_url_pattern(url);
                let known_dead = registry.is_known_dead_url(url);
                if self.json {
                    let report = serde_json::json!({
                        "pattern": pattern,
                        "knownDead": known_dead,
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    match pattern {
                        Some(pattern) => {
                            println!("matches {}", pattern.pattern);
                            if !pattern.reason.is_empty() {
                                println!("  reason: {}", pattern.reason);
                            }
                        }
                        None if known_dead => println!("listed as a known dead URL"),
                        None => println!("no dead-URL pattern matches"),
                    }
                }
                Ok(if pattern.is_some() || known_dead { 0 } else { 1 })
            }
        }
    }
}
