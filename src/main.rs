//! theos CLI: dual-hypothesis reasoning governor.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use theos::config::GovernorConfig;
use theos::governor::Governor;
use theos::output::SessionOutput;
use theos::wisdom::{WisdomQuery, WisdomStore};

const CONFIG_FILE: &str = "theos.toml";

#[derive(Parser)]
#[command(name = "theos", version, about = "Dual-hypothesis reasoning governor")]
struct Cli {
    /// Data directory for the wisdom store.
    #[arg(long, global = true, default_value = ".theos")]
    data_dir: PathBuf,

    /// Governor config file (defaults to `<data-dir>/theos.toml` if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reason about a query with the built-in template generators.
    Reason {
        query: String,

        /// Domain tag stored with the learned record.
        #[arg(long, default_value = "general")]
        domain: String,

        /// Override the configured cycle limit.
        #[arg(long)]
        max_cycles: Option<u32>,

        /// Run both generators concurrently.
        #[arg(long)]
        parallel: bool,

        /// Print the full audit trail as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect and manage the wisdom store.
    Wisdom {
        #[command(subcommand)]
        action: WisdomAction,
    },

    /// Manage the governor configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum WisdomAction {
    /// Show record counts, averages, and the active tier.
    Stats,
    /// Export every record as a JSON array.
    Export { file: PathBuf },
    /// Append records from a JSON array.
    Import { file: PathBuf },
    /// Find records similar to a query.
    Search {
        query: String,

        #[arg(long, default_value = "0.7")]
        threshold: f64,

        #[arg(long)]
        domain: Option<String>,

        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration as TOML.
    Show,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.data_dir.join(CONFIG_FILE));

    match cli.command {
        Commands::Reason {
            query,
            domain,
            max_cycles,
            parallel,
            json,
        } => {
            let mut config = load_config(&config_path, cli.config.is_some())?;
            config.parallel_generation |= parallel;
            let store = Arc::new(WisdomStore::open(&cli.data_dir)?);
            let mut governor = Governor::with_templates(config, store)?;
            let result = governor.reason(&query, &domain, max_cycles)?;

            if json {
                println!("{}", result.audit.to_json().into_diagnostic()?);
                return Ok(());
            }

            println!("Stop reason: {}", result.stop_reason());
            println!("Cycles:      {}", result.cycles_used);
            if let Some(scores) = &result.audit.final_scores {
                println!(
                    "Final:       similarity {:.3}, risk {:.3}, quality {:.3}, ethical {:.3}",
                    scores.similarity, scores.risk, scores.quality, scores.ethical_score
                );
            }
            println!(
                "Budget:      {:.3} of {:.3} consumed",
                result.audit.budget_consumed, result.audit.budget_initial
            );
            println!("Energy:      {} units", result.audit.energy.total);
            println!();
            match &result.output {
                SessionOutput::Recalled { similarity, .. } => {
                    println!("Recalled from wisdom (similarity {similarity:.3}):");
                }
                other => println!("Output ({}):", other.kind()),
            }
            println!("{}", result.output.text());
            println!("Confidence:  {:.3}", result.output.confidence());
        }

        Commands::Wisdom { action } => {
            let store = WisdomStore::open(&cli.data_dir)?;
            match action {
                WisdomAction::Stats => {
                    println!("{}", store.statistics()?);
                }
                WisdomAction::Export { file } => {
                    let n = store.export_json(&file)?;
                    println!("Exported {n} records to {}", file.display());
                }
                WisdomAction::Import { file } => {
                    let n = store.import_json(&file)?;
                    println!("Imported {n} records from {}", file.display());
                    println!("{}", store.statistics()?);
                }
                WisdomAction::Search {
                    query,
                    threshold,
                    domain,
                    limit,
                } => {
                    let mut q = WisdomQuery::new(query, threshold).with_limit(limit);
                    if let Some(domain) = domain {
                        q = q.with_domain(domain);
                    }
                    let hits = store.query(&q)?;
                    if hits.is_empty() {
                        println!("No records above similarity {threshold}.");
                    }
                    for (i, hit) in hits.iter().enumerate() {
                        println!(
                            "  {}. [{:.3}] {} ({}, {}, confidence {:.2})",
                            i + 1,
                            hit.similarity,
                            hit.record.query,
                            hit.record.domain,
                            hit.record.kind,
                            hit.record.confidence
                        );
                        println!("     {}", hit.record.resolution);
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    miette::bail!(
                        "{} already exists (pass --force to overwrite)",
                        config_path.display()
                    );
                }
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent).into_diagnostic()?;
                }
                GovernorConfig::default().save(&config_path)?;
                println!("Wrote default config to {}", config_path.display());
            }
            ConfigAction::Show => {
                let config = load_config(&config_path, cli.config.is_some())?;
                print!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
            }
        },
    }

    Ok(())
}

/// An explicit `--config` must exist; the data-dir default is optional.
fn load_config(path: &Path, explicit: bool) -> Result<GovernorConfig> {
    if explicit || path.exists() {
        Ok(GovernorConfig::load(path)?)
    } else {
        Ok(GovernorConfig::default())
    }
}
