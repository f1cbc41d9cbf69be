mod cli;
mod logging;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use harvest_core::{load_hashtags_from_file, normalize_hashtags, HarvestConfig, MS_TOKEN_ENV};
use harvest_runner::Orchestrator;
use std::env;
use std::process::ExitCode;
use tiktok_client::{HttpMediaDownloader, TikTokClient};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match logging::init_logger(cli.verbose, cli.log.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to set up logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether at least one hashtag completed.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(&cli)?;

    let mut hashtags = normalize_hashtags(&cli.hashtags)?;
    if let Some(path) = &cli.file {
        let from_file = load_hashtags_from_file(path)
            .with_context(|| format!("reading hashtags from {}", path.display()))?;
        hashtags = normalize_hashtags(hashtags.into_iter().chain(from_file))?;
    }
    if hashtags.is_empty() {
        anyhow::bail!("no hashtags given");
    }

    info!("Data directory: {}", config.data_dir.display());
    let fetcher = TikTokClient::new(&config).context("building the TikTok client")?;
    let downloader = HttpMediaDownloader::new(&config.media, &config.fetch.user_agent)
        .context("building the media downloader")?;

    let options = cli.run_options(&config);
    let orchestrator = Orchestrator::new(config, fetcher, downloader, options);
    let summary = orchestrator.run(&hashtags).await;

    println!("{summary}");
    Ok(summary.any_succeeded())
}

fn load_config(cli: &Cli) -> anyhow::Result<HarvestConfig> {
    let config = match &cli.config {
        Some(path) => HarvestConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => HarvestConfig::default(),
    };
    let mut config = config.with_env_token(env::var(MS_TOKEN_ENV).ok());
    cli.apply_overrides(&mut config);

    config.validate().context("invalid configuration")?;
    config.ensure_data_dir().context("preparing the data directory")?;
    Ok(config)
}
