use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::browser::{BrowserOptions, ChromiumFetcher};
use crate::cli::{FetcherKind, ScrapeArgs};
use crate::config::CategoryConfig;
use crate::extract::ListingExtractor;
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::formats::{Batch, ListingRecord};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProgress {
    pub page: u32,
    pub total: u32,
    pub records: usize,
}

/// Records collected by one pagination request, in page order and then
/// document order within a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeRun {
    pub records: Vec<ListingRecord>,
}

impl ScrapeRun {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_batch(self, category_field: &str) -> Batch {
        Batch::from_records(category_field, self.records)
    }
}

/// Fetches and extracts pages `1..=page_count` in order.
pub async fn scrape_pages(
    fetcher: &mut dyn PageFetcher,
    extractor: &ListingExtractor,
    base_url: &Url,
    page_count: u32,
    mut on_progress: impl FnMut(PageProgress),
) -> anyhow::Result<ScrapeRun> {
    let mut run = ScrapeRun::default();

    for page_number in 1..=page_count {
        let page = fetcher
            .fetch(base_url, page_number)
            .await
            .with_context(|| format!("fetch page {page_number}/{page_count}"))?;
        let records = extractor.extract(&page);
        let found = records.len();
        run.records.extend(records);

        on_progress(PageProgress {
            page: page_number,
            total: page_count,
            records: found,
        });
    }

    Ok(run)
}

/// Runs `scrape_pages`, then closes `fetcher` whether or not the run failed.
/// A scrape error wins over a close error.
pub async fn scrape_and_close(
    fetcher: &mut dyn PageFetcher,
    extractor: &ListingExtractor,
    base_url: &Url,
    page_count: u32,
    on_progress: impl FnMut(PageProgress),
) -> anyhow::Result<ScrapeRun> {
    let scraped = scrape_pages(fetcher, extractor, base_url, page_count, on_progress).await;
    let closed = fetcher.close().await.context("close page fetcher");
    let scraped = scraped?;
    closed?;
    Ok(scraped)
}

pub async fn run(args: ScrapeArgs) -> anyhow::Result<()> {
    let config = CategoryConfig::load(args.location.config.as_deref().map(Path::new))
        .context("load category config")?;
    let entry = config.get(&args.store)?;
    let base_url = entry.base_url()?;
    let extractor = ListingExtractor::new().context("build listing extractor")?;

    let mut fetcher = build_fetcher(&args).await.context("start page fetcher")?;
    tracing::info!(store = %entry.store, url = %base_url, pages = args.pages, "scrape: start");

    let scraped = scrape_and_close(
        fetcher.as_mut(),
        &extractor,
        &base_url,
        args.pages,
        |progress| {
            tracing::info!(
                page = progress.page,
                total = progress.total,
                records = progress.records,
                "scraped page {}/{}",
                progress.page,
                progress.total
            );
        },
    )
    .await?;

    let store = Store::open(&PathBuf::from(&args.location.data_dir), entry)?;
    let produced = scraped.len();
    let report = store
        .flush(&scraped.into_batch(&entry.category_field))
        .with_context(|| format!("write to store {}", entry.store))?;

    println!(
        "scraped {produced} records into {} ({} rows written)",
        entry.store, report.rows_written
    );
    Ok(())
}

async fn build_fetcher(args: &ScrapeArgs) -> anyhow::Result<Box<dyn PageFetcher>> {
    let navigation_timeout = Duration::from_millis(args.nav_timeout_ms);
    match args.fetcher {
        FetcherKind::Http => Ok(Box::new(HttpFetcher::new(navigation_timeout)?)),
        FetcherKind::Browser => {
            let options = BrowserOptions {
                settle_timeout: Duration::from_millis(args.settle_timeout_ms),
                navigation_timeout,
                executable: args.chrome.as_ref().map(PathBuf::from),
                ..BrowserOptions::default()
            };
            Ok(Box::new(ChromiumFetcher::launch(options).await?))
        }
    }
}
