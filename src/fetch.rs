use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use url::Url;

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: Url,
    pub html: String,
}

/// Loads one listing page per call.
///
/// Implementations may hold a session across calls; `close` releases it and
/// must be called whether or not the fetches succeeded.
#[async_trait]
pub trait PageFetcher: Send {
    async fn fetch(&mut self, base_url: &Url, page_number: u32) -> anyhow::Result<RenderedPage>;

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// `base_url` with its `page` query parameter set to `page_number`. Other
/// query parameters are kept.
pub fn page_url(base_url: &Url, page_number: u32) -> Url {
    let kept = base_url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();

    let mut url = base_url.clone();
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page_number.to_string());
    url
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build listing http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&mut self, base_url: &Url, page_number: u32) -> anyhow::Result<RenderedPage> {
        let url = page_url(base_url, page_number);
        tracing::debug!(%url, "GET listing page");

        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, "listing-scrape/0.1")
            .header(ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url}: HTTP {status}");
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .with_context(|| format!("read body of {url}"))?;

        Ok(RenderedPage {
            url: final_url,
            html,
        })
    }
}
