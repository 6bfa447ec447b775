use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use common::config::Config;
use eyre::Result;
use tokio::fs::{create_dir_all, read_dir, read_to_string};
use tracing::error;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod bench;

/// Crates whose log level follows `RUST_LOG` unless a `--log` directive names them
const MODULES: &[&str] = &["common", "bufman", "tablescan", "logging", "default_benches"];

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    log: Vec<String>,
    /// Folder holding one sub folder per run
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List previous runs
    Ls,
    /// Run every bench of a config
    Bench {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: PathBuf,
    },
    /// Print the worker commands of every trial without running them
    Print {
        #[arg(short, long, default_value = "config.yaml")]
        config_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "log.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("storage_sweep={log_level}"));
    for log in &args.log {
        env_filter = env_filter.add_directive(log.parse()?);
    }
    for module in MODULES {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    default_benches::init_benches();

    match args.command {
        Commands::Ls => list_benchmarks(&args.results_dir).await?,
        Commands::Bench { config_file } => {
            create_dir_all(&args.results_dir).await?;
            if let Err(err) = bench::run_benchmark(&config_file, &args.results_dir).await {
                error!("{err:#?}");
                return Err(err);
            }
        }
        Commands::Print { config_file } => print_commands(&config_file).await?,
    };

    Ok(())
}

async fn list_benchmarks(results_dir: &Path) -> Result<()> {
    for (name, folder) in get_benchmarks(results_dir).await? {
        println!("{name} -> {}", folder.display());
    }
    Ok(())
}

async fn get_benchmarks(results_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut results = Vec::new();
    if !results_dir.exists() {
        return Ok(results);
    }
    let mut items = read_dir(results_dir).await?;
    while let Some(entry) = items.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            let config_file = entry.path().join("config.yaml");
            if config_file.exists() {
                let config: Config = serde_yml::from_str(&read_to_string(config_file).await?)?;
                results.push((config.name, entry.path()));
            }
        }
    }
    results.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(results)
}

async fn print_commands(config_file: &Path) -> Result<()> {
    let config = bench::load_config(config_file).await?;
    for (name, cmds) in bench::dry_run(&config)? {
        println!("{name}: {} commands", cmds.len());
        for cmd in cmds {
            println!("  {cmd}");
        }
    }
    Ok(())
}
