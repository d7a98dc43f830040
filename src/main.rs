use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    listing_scrape::logging::init().context("init logging")?;

    let cli = listing_scrape::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        listing_scrape::cli::Command::Init(args) => {
            listing_scrape::store::init(args).context("init")?;
        }
        listing_scrape::cli::Command::Stores(args) => {
            listing_scrape::config::list(args).context("stores")?;
        }
        listing_scrape::cli::Command::Scrape(args) => {
            listing_scrape::crawl::run(args).await.context("scrape")?;
        }
        listing_scrape::cli::Command::Ingest(args) => {
            listing_scrape::ingest::run(args).context("ingest")?;
        }
        listing_scrape::cli::Command::Summary(args) => {
            listing_scrape::summary::run(args).context("summary")?;
        }
    }

    Ok(())
}
