use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use serde_json::Value;
use tracing::{error, info, warn};

use hap::cache::DiskCache;
use hap::config::{Settings, DEFAULT_CACHE_DIR, DEFAULT_CACHE_TTL_SECS, DEFAULT_TIMEOUT_SECS};
use hap::engine::{Driver, Level, RunOptions};
use hap::fetch::LinkFetcher;
use hap::store;

#[derive(Parser)]
#[command(name = "hap", version, about = "Hap! Simple HTML scraping tool")]
struct Cli {
    /// JSON dataplan file(s); read from stdin when omitted
    inputs: Vec<PathBuf>,

    /// Print a sample dataplan and exit
    #[arg(long)]
    sample: bool,

    /// Overwrite the link of every dataplan
    #[arg(long)]
    link: Option<String>,

    /// Save collected records back to the dataplan
    #[arg(long)]
    save: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,

    /// Always fetch live content and skip the cache
    #[arg(long)]
    no_cache: bool,

    /// Reset stored records before saving
    #[arg(long)]
    refresh: bool,

    /// Do not print records
    #[arg(long)]
    silent: bool,

    #[arg(long, env = "HAP_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Seconds a cached page stays fresh
    #[arg(long, env = "HAP_CACHE_TTL", default_value_t = DEFAULT_CACHE_TTL_SECS)]
    cache_ttl: u64,

    /// HTTP timeout in seconds
    #[arg(long, env = "HAP_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            cache_dir: self.cache_dir.clone(),
            cache_ttl: Duration::from_secs(self.cache_ttl),
            timeout: Duration::from_secs(self.timeout),
            ..Settings::default()
        }
    }

    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.silent {
            "error"
        } else {
            "info"
        }
    }
}

/// A dataplan and where it came from (`None` for stdin).
struct Input {
    path: Option<PathBuf>,
    dataplan: Value,
}

fn read_inputs(cli: &Cli) -> anyhow::Result<Vec<Input>> {
    if !cli.inputs.is_empty() {
        return cli
            .inputs
            .iter()
            .map(|path| {
                let dataplan = store::read_plan(path)
                    .with_context(|| format!("Cannot read dataplan {}", path.display()))?;
                Ok(Input { path: Some(path.clone()), dataplan })
            })
            .collect();
    }

    let mut text = String::new();
    io::stdin().read_to_string(&mut text)?;
    if text.trim().is_empty() {
        bail!("Invalid input stream");
    }
    let dataplan = store::parse_plan(&text).context("Input stream is not a valid dataplan")?;
    Ok(vec![Input { path: None, dataplan }])
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level().into()),
        )
        .with_writer(io::stderr)
        .init();

    if cli.sample {
        println!("{}", store::SAMPLE_PLAN);
        return Ok(());
    }

    if cli.inputs.is_empty() && io::stdin().is_terminal() {
        Cli::command().print_help()?;
        return Ok(());
    }

    let mut inputs = read_inputs(&cli)?;
    for input in &mut inputs {
        store::override_link(&mut input.dataplan, cli.link.as_deref())?;
    }
    if cli.refresh && !cli.save {
        warn!("--refresh has no effect without --save");
    }

    let settings = cli.settings();
    let options = RunOptions {
        skip_cache: cli.no_cache,
        reset_records: cli.save && cli.refresh,
    };
    let driver = Arc::new(Driver::new(
        LinkFetcher::new(&settings),
        DiskCache::new(&settings),
        options,
    ));

    let tasks = inputs.iter().map(|input| {
        let driver = Arc::clone(&driver);
        let dataplan = input.dataplan.clone();
        tokio::task::spawn_blocking(move || driver.run(dataplan))
    });
    let results = futures::future::join_all(tasks).await;

    let total = inputs.len();
    let mut failed = 0;
    for (input, joined) in inputs.into_iter().zip(results) {
        let source = input
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<stdin>".to_string());

        let outcome = match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("{}: {}", source, e);
                failed += 1;
                continue;
            }
            Err(e) => {
                error!("{}: worker failed: {}", source, e);
                failed += 1;
                continue;
            }
        };

        let problems = outcome
            .diagnostics
            .iter()
            .filter(|d| d.level == Level::Error)
            .count();
        if problems > 0 {
            info!("{}: {} definition(s) failed", source, problems);
        }

        if cli.save {
            let path = input
                .path
                .unwrap_or_else(|| PathBuf::from(store::stdin_plan_filename(Utc::now())));
            store::write_plan(&path, &outcome.dataplan)
                .with_context(|| format!("Cannot save dataplan {}", path.display()))?;
            info!("Saved dataplan to {}", path.display());
        }

        if !cli.silent {
            println!("{}", store::to_pretty_json(&outcome.record)?);
        }
    }

    if failed > 0 {
        bail!("{} of {} dataplan(s) failed", failed, total);
    }
    Ok(())
}
