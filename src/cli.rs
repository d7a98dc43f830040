use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the listing table of every configured store.
    Init(InitArgs),
    /// List configured stores.
    Stores(StoresArgs),
    /// Scrape category pages into a store.
    Scrape(ScrapeArgs),
    /// Load a delimited export from another scraper into a store.
    Ingest(IngestArgs),
    /// Print price statistics and counts for a store.
    Summary(SummaryArgs),
}

#[derive(Debug, Args)]
pub struct StoreLocation {
    /// YAML category config (default: built-in categories).
    #[arg(long)]
    pub config: Option<String>,

    /// Directory holding the store files.
    #[arg(long, default_value = ".")]
    pub data_dir: String,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    #[command(flatten)]
    pub location: StoreLocation,
}

#[derive(Debug, Args)]
pub struct StoresArgs {
    /// YAML category config (default: built-in categories).
    #[arg(long)]
    pub config: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FetcherKind {
    /// Headless Chromium; runs the page's scripts.
    Browser,
    /// Plain HTTP GET; for server-rendered pages.
    Http,
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Store to scrape into (e.g. `Article1.db`).
    #[arg(long)]
    pub store: String,

    /// Number of pages to scrape, starting at page 1.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=5))]
    pub pages: u32,

    #[arg(long, value_enum, default_value_t = FetcherKind::Browser)]
    pub fetcher: FetcherKind,

    /// Longest wait for listing cards to render after navigation.
    #[arg(long, default_value_t = 2000)]
    pub settle_timeout_ms: u64,

    /// Navigation (or HTTP request) timeout.
    #[arg(long, default_value_t = 30000)]
    pub nav_timeout_ms: u64,

    /// Chromium executable (default: autodetect).
    #[arg(long, env = "LISTING_SCRAPE_CHROME")]
    pub chrome: Option<String>,

    #[command(flatten)]
    pub location: StoreLocation,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Store to ingest into.
    #[arg(long)]
    pub store: String,

    /// Delimited input file; the delimiter is detected.
    #[arg(long)]
    pub file: String,

    /// Value written to the `source` column of every ingested row.
    #[arg(long, default_value = crate::ingest::DEFAULT_SOURCE_TAG)]
    pub source_tag: String,

    #[command(flatten)]
    pub location: StoreLocation,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Store to summarize.
    #[arg(long)]
    pub store: String,

    /// Only aggregate rows whose category equals this value.
    #[arg(long)]
    pub filter: Option<String>,

    /// Print JSON instead of a text report.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub location: StoreLocation,
}
