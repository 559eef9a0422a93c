use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use sub_collector::{
    config::Config,
    logging,
    proxy::{
        deduplicate_by_address, parse_feed, to_document, ProxyDeduplicator, ProxyRecord,
        SubscriptionCollector, SubscriptionFetcher,
    },
};
use tracing::info;

/// Proxy subscription collector with concurrent fetching and deduplication
#[derive(Parser)]
#[command(name = "sub-collector")]
#[command(about = "Collect and deduplicate proxies from subscription feeds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch subscriptions and print the deduplicated proxies
    Collect {
        /// YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Subscription URLs, added to those in the config (can specify multiple)
        #[arg(short, long)]
        url: Vec<String>,
        /// Attempts per subscription
        #[arg(long)]
        retry: Option<u32>,
        /// Timeout in seconds for each HTTP attempt
        #[arg(long)]
        timeout: Option<u64>,
        /// Number of concurrent workers
        #[arg(short = 'n', long)]
        concurrent: Option<usize>,
        /// Proxy types to keep (can specify multiple)
        #[arg(short = 't', long = "type")]
        proxy_type: Vec<String>,
        /// Deduplicate on the literal server:port instead of resolving hosts
        #[arg(long)]
        no_resolve: bool,
        /// Output file for the proxies document
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse proxies from a local subscription file
    Parse {
        /// Input file holding a subscription body
        input: PathBuf,
        /// Proxy types to keep (can specify multiple)
        #[arg(short = 't', long = "type")]
        proxy_type: Vec<String>,
        /// Output file for the proxies document
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    match cli.command {
        Commands::Collect {
            config,
            url,
            retry,
            timeout,
            concurrent,
            proxy_type,
            no_resolve,
            output,
        } => {
            let mut config = match config {
                Some(path) => Config::from_path(&path)?,
                None => Config::default(),
            };
            config.sub_urls.extend(url);
            if let Some(retry) = retry {
                config.sub_urls_retry = retry;
            }
            if let Some(timeout) = timeout {
                config.sub_urls_timeout = timeout;
            }
            if let Some(concurrent) = concurrent {
                config.concurrent = concurrent;
            }
            if !proxy_type.is_empty() {
                config.proxy_types = proxy_type;
            }
            config.validate()?;

            if config.sub_urls.is_empty() {
                bail!("no subscription URLs given; use --url or sub-urls in the config");
            }

            let fetcher = SubscriptionFetcher::with_config(config.fetcher_config())?;
            let collector = SubscriptionCollector::new(config.collector_config(), fetcher);
            let proxies = collector.collect(&config.sub_urls).await?;

            let unique = if no_resolve {
                deduplicate_by_address(proxies)
            } else {
                ProxyDeduplicator::new()
                    .with_concurrency(config.concurrent)
                    .deduplicate(proxies)
                    .await
            };

            write_document(&unique, output.as_deref())?;
        }
        Commands::Parse {
            input,
            proxy_type,
            output,
        } => {
            let raw = std::fs::read(&input)
                .with_context(|| format!("cannot read {}", input.display()))?;
            let source = input.display().to_string();
            let proxies = parse_feed(&raw, &source, &proxy_type)?;

            info!("parsed {} proxies from {}", proxies.len(), source);
            write_document(&proxies, output.as_deref())?;
        }
    }

    Ok(())
}

fn write_document(records: &[ProxyRecord], output: Option<&Path>) -> Result<()> {
    let document = to_document(records)?;
    match output {
        Some(path) => {
            std::fs::write(path, document)
                .with_context(|| format!("cannot write {}", path.display()))?;
            info!("saved {} proxies to {}", records.len(), path.display());
        }
        None => print!("{}", document),
    }
    Ok(())
}
