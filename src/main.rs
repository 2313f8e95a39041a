use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use boringhannover::{logging, prepare_registry, run, AppConfig, RunOptions};

#[derive(Parser)]
#[command(name = "boringhannover")]
#[command(about = "Weekly cinema and concert digest for Hannover")]
#[command(version)]
struct Cli {
    /// Write the exports only, never sync to GitHub
    #[arg(long)]
    local: bool,
    /// Path to a JSON config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Output directory, overrides the config
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// Only run the given source (repeatable)
    #[arg(long, value_name = "KEY")]
    only: Vec<String>,
    /// Print every registered source and exit
    #[arg(long)]
    list_sources: bool,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn list_sources(cli: &Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let registry = prepare_registry(&config, &[])?;
    for info in registry.list() {
        println!(
            "{}  {}  {}  {}  {}",
            info.key,
            info.name,
            info.source_type.as_str(),
            info.url,
            if info.enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let result = if cli.list_sources {
        list_sources(&cli)
    } else {
        let options = RunOptions {
            local: cli.local,
            config_path: cli.config.clone(),
            output_dir: cli.output.clone(),
            only: cli.only.clone(),
        };
        run(&options).map(|summary| {
            println!(
                "{} movies, {} radar events; {} sources ok, {} failed, {} skipped",
                summary.movies,
                summary.radar,
                summary.succeeded.len(),
                summary.failed.len(),
                summary.skipped.len()
            );
        })
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "run failed");
            ExitCode::FAILURE
        }
    }
}
