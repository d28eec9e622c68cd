//! review-harvest: collect Google Maps reviews into a run directory.

use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use review_harvest::SortMode;
use review_harvest_cli::config::{ConfigLoader, ConfigOverrides, DEFAULT_CONFIG_FILE};
use review_harvest_cli::logging::{self, LogOptions};
use review_harvest_cli::{display, doctor, pipeline};

#[derive(Parser)]
#[command(
    name = "review-harvest",
    about = "Harvest Google Maps reviews with a headless Chromium",
    version
)]
struct Cli {
    /// Config file (YAML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Google Maps place URL.
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Review order: newest, highest, lowest or relevance.
    #[arg(short, long, value_parser = parse_sort, global = true)]
    sort: Option<SortMode>,

    /// Run the browser without a window.
    #[arg(long, overrides_with = "no_headless", global = true)]
    headless: bool,

    /// Show the browser window.
    #[arg(long, global = true)]
    no_headless: bool,

    /// Download avatars and review photos.
    #[arg(short, long, global = true)]
    images: bool,

    /// Also write reviews.csv.
    #[arg(long, global = true)]
    csv: bool,

    /// Scroll attempt budget.
    #[arg(short, long, global = true)]
    max_scrolls: Option<usize>,

    /// Base directory for run output.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Let the browser load images, fonts and media.
    #[arg(long, global = true)]
    no_block_resources: bool,

    /// Also write daily log files here.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        let headless = if self.no_headless {
            Some(false)
        } else if self.headless {
            Some(true)
        } else {
            None
        };
        ConfigOverrides {
            url: self.url.clone(),
            sort_by: self.sort,
            headless,
            max_scrolls: self.max_scrolls,
            export_csv: self.csv.then_some(true),
            download_images: self.images.then_some(true),
            base_dir: self.output.clone(),
            block_resources: self.no_block_resources.then_some(false),
            log_dir: self.log_dir.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest reviews (default).
    Run,

    /// Check that Chromium and the output directory are usable.
    Doctor,

    /// Print the effective configuration.
    Config,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   review-harvest completions bash > ~/.local/share/bash-completion/completions/review-harvest
    ///   review-harvest completions zsh > ~/.zfunc/_review-harvest
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn parse_sort(value: &str) -> Result<SortMode, String> {
    SortMode::ALL
        .into_iter()
        .find(|mode| mode.as_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| format!("unknown sort '{value}' (newest, highest, lowest, relevance)"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = cli.run.overrides();
    let config_file = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = ConfigLoader::load(config_file, &overrides)?;
            let _guard = logging::init(&LogOptions {
                level: &cli.log_level,
                json: cli.log_json,
                log_dir: config.log_dir.as_deref(),
            })?;
            pipeline::run(&config).await?;
        }
        Commands::Doctor => {
            let config = ConfigLoader::load_unchecked(config_file, &overrides)?;
            let file = config_file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
            if !doctor::run(&config, file) {
                std::process::exit(1);
            }
        }
        Commands::Config => {
            let config = ConfigLoader::load_unchecked(config_file, &overrides)?;
            println!("{}", display::config_table(&config));
            if let Err(e) = ConfigLoader::validate(&config) {
                println!();
                println!("[!!] {e}");
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "review-harvest",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_become_overrides() {
        let cli = Cli::parse_from([
            "review-harvest",
            "-u",
            "https://www.google.com/maps/place/Cafe",
            "--sort",
            "Newest",
            "--no-headless",
            "-i",
            "-m",
            "40",
        ]);
        let overrides = cli.run.overrides();
        assert_eq!(overrides.sort_by, Some(SortMode::Newest));
        assert_eq!(overrides.headless, Some(false));
        assert_eq!(overrides.download_images, Some(true));
        assert_eq!(overrides.export_csv, None);
        assert_eq!(overrides.max_scrolls, Some(40));
        assert_eq!(overrides.block_resources, None);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_run_flags_after_subcommand() {
        let cli = Cli::parse_from(["review-harvest", "config", "--csv", "-o", "/tmp/out"]);
        assert!(matches!(cli.command, Some(Commands::Config)));
        let overrides = cli.run.overrides();
        assert_eq!(overrides.export_csv, Some(true));
        assert_eq!(overrides.base_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(overrides.headless, None);
    }

    #[test]
    fn test_resource_blocking_flag() {
        let cli = Cli::parse_from(["review-harvest", "--no-block-resources"]);
        assert_eq!(cli.run.overrides().block_resources, Some(false));
    }

    #[test]
    fn test_unknown_sort_is_rejected() {
        assert!(parse_sort("oldest").is_err());
        assert!(Cli::try_parse_from(["review-harvest", "-s", "oldest"]).is_err());
    }
}
