//! Mirror Crawler CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mirror_crawler::{
    error::{AppError, Result},
    models::{Config, FetchSource, UploadBackend},
    pipeline,
    services::MirrorPool,
    storage::{LocalUploadTarget, UploadTarget},
    utils::http,
};

/// Timeline archiver working through mirror front-ends
#[derive(Parser, Debug)]
#[command(
    name = "mirror-crawler",
    version,
    about = "Archive timeline posts and media through rotating mirrors"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive the timelines of the given accounts
    Crawl {
        /// Accounts to archive (default: run.accounts from the config)
        accounts: Vec<String>,

        /// Timeline tab to page through
        #[arg(long, value_parser = parse_source)]
        source: Option<FetchSource>,

        /// Stop after the first page
        #[arg(long)]
        one_page: bool,

        /// Stop after this many posts per account
        #[arg(long)]
        max_posts: Option<usize>,

        /// Local archive directory (implies the local backend)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration file
    Validate,

    /// Select one mirror and print it
    Probe,
}

fn parse_source(value: &str) -> std::result::Result<FetchSource, String> {
    match value.to_ascii_lowercase().as_str() {
        "media" => Ok(FetchSource::Media),
        "search" => Ok(FetchSource::Search),
        other => Err(format!("unknown source '{other}', expected 'media' or 'search'")),
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

async fn upload_target(config: &Config) -> Result<Box<dyn UploadTarget>> {
    match config.upload.backend {
        UploadBackend::Local => Ok(Box::new(LocalUploadTarget::new(&config.upload.local_dir))),
        #[cfg(feature = "s3")]
        UploadBackend::S3 => Ok(Box::new(
            mirror_crawler::storage::S3UploadTarget::from_env(&config.upload).await?,
        )),
        #[cfg(not(feature = "s3"))]
        UploadBackend::S3 => Err(AppError::config(
            "upload.backend = \"s3\" needs a build with the `s3` feature",
        )),
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Mirror Crawler starting...");

    let mut config = Config::load_or_default(&cli.config);
    log::info!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Crawl {
            accounts,
            source,
            one_page,
            max_posts,
            output,
        } => {
            if let Some(source) = source {
                config.run.source = source;
            }
            if one_page {
                config.run.one_page_only = true;
            }
            if max_posts.is_some() {
                config.run.max_posts = max_posts;
            }
            if let Some(output) = output {
                config.upload.backend = UploadBackend::Local;
                config.upload.local_dir = output.display().to_string();
            }
            config.validate()?;

            let accounts = if accounts.is_empty() {
                config.run.accounts.clone()
            } else {
                accounts
            };
            if accounts.is_empty() {
                return Err(AppError::config(
                    "No accounts given on the command line or in run.accounts",
                ));
            }

            let client = http::create_client(&config.crawler)?;
            let target = upload_target(&config).await?;
            let mut pool = MirrorPool::from_config(&config.mirrors, config.crawler.timeout());

            let results =
                pipeline::run_accounts(&config, &client, &mut pool, target.as_ref(), &accounts)
                    .await?;

            let archived: usize = results.iter().map(|(_, s)| s.posts_archived).sum();
            let failed: usize = results.iter().map(|(_, s)| s.posts_failed).sum();
            log::info!(
                "Crawl complete: {}/{} accounts, {} posts archived, {} failed",
                results.len(),
                accounts.len(),
                archived,
                failed
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }

        Command::Probe => {
            let client = http::create_client(&config.crawler)?;
            let mut pool = MirrorPool::from_config(&config.mirrors, config.crawler.timeout());
            let mirror = pool.select(&client).await?;
            println!("{}", mirror);
        }
    }

    log::info!("Done!");

    Ok(())
}
