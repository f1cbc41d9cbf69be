use clap::Parser;
use harvest_core::HarvestConfig;
use harvest_runner::RunOptions;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hashtag-harvest")]
#[command(about = "Harvest TikTok posts by hashtag and report co-occurring hashtags", long_about = None)]
pub struct Cli {
    /// Hashtags to harvest, with or without a leading '#'
    #[arg(required_unless_present = "file")]
    pub hashtags: Vec<String>,

    /// Read hashtags from a file, separated by newlines or commas
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Download the media of every stored post
    #[arg(short, long)]
    pub download: bool,

    /// Save a bar chart of co-occurring hashtags
    #[arg(short, long)]
    pub plot: bool,

    /// Print a table of co-occurring hashtags
    #[arg(short, long)]
    pub table: bool,

    /// Number of hashtags shown in the table and plot
    #[arg(short, long, value_name = "N")]
    pub number: Option<usize>,

    /// Maximum number of posts fetched per hashtag
    #[arg(short, long, value_name = "N")]
    pub limit: Option<usize>,

    /// Directory holding one sub-directory per hashtag
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Also write log output to this file
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,

    /// Work on stored datasets only, without contacting TikTok
    #[arg(long)]
    pub no_fetch: bool,
}

impl Cli {
    /// Flags override whatever the config file and environment set.
    pub fn apply_overrides(&self, config: &mut HarvestConfig) {
        if let Some(dir) = &self.output_dir {
            config.data_dir = dir.clone();
        }
        if let Some(limit) = self.limit {
            config.fetch.limit = limit;
        }
        if let Some(number) = self.number {
            config.report.top_n = number;
        }
    }

    pub fn run_options(&self, config: &HarvestConfig) -> RunOptions {
        RunOptions {
            fetch: !self.no_fetch,
            table: self.table,
            plot: self.plot,
            download: self.download,
            ..RunOptions::from_config(config)
        }
    }
}
