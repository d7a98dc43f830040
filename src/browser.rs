use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt as _;
use tokio::task::JoinHandle;
use url::Url;

use crate::fetch::{PageFetcher, RenderedPage, page_url};

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    /// Selector whose presence means the listing has rendered.
    pub ready_selector: String,
    pub settle_timeout: Duration,
    pub poll_interval: Duration,
    pub navigation_timeout: Duration,
    pub executable: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            ready_selector: crate::extract::CONTAINER_SELECTOR.to_owned(),
            settle_timeout: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(100),
            navigation_timeout: Duration::from_secs(30),
            executable: None,
        }
    }
}

pub struct ChromiumFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Option<Page>,
    options: BrowserOptions,
    closed: bool,
}

impl ChromiumFetcher {
    pub async fn launch(options: BrowserOptions) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .request_timeout(options.navigation_timeout);
        if let Some(executable) = &options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder
            .build()
            .map_err(|err| anyhow::anyhow!("build browser config: {err}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launch headless chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::trace!(?err, "browser handler event error");
                }
            }
        });
        tracing::debug!("launched headless chromium");

        Ok(Self {
            browser,
            handler,
            page: None,
            options,
            closed: false,
        })
    }

    async fn tab(&mut self) -> anyhow::Result<Page> {
        if let Some(page) = &self.page {
            return Ok(page.clone());
        }
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("open browser tab")?;
        self.page = Some(page.clone());
        Ok(page)
    }
}

#[async_trait]
impl PageFetcher for ChromiumFetcher {
    async fn fetch(&mut self, base_url: &Url, page_number: u32) -> anyhow::Result<RenderedPage> {
        let url = page_url(base_url, page_number);
        let page = self.tab().await?;
        let timeout = self.options.navigation_timeout;

        tracing::debug!(%url, "navigate");
        tokio::time::timeout(timeout, page.goto(url.as_str()))
            .await
            .map_err(|_| {
                anyhow::anyhow!("navigation timed out after {}ms: {url}", timeout.as_millis())
            })?
            .with_context(|| format!("navigate to {url}"))?;

        let ready = wait_for_selector(
            &page,
            &self.options.ready_selector,
            self.options.settle_timeout,
            self.options.poll_interval,
        )
        .await;
        if !ready {
            tracing::warn!(
                %url,
                selector = %self.options.ready_selector,
                "listing containers did not appear before the settle timeout"
            );
        }

        let html = page
            .content()
            .await
            .with_context(|| format!("read rendered document of {url}"))?;

        Ok(RenderedPage { url, html })
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(page) = self.page.take() {
            if let Err(err) = page.close().await {
                tracing::debug!(?err, "close browser tab");
            }
        }
        let closed = self.browser.close().await.context("close chromium");
        if closed.is_ok() {
            self.browser.wait().await.context("wait for chromium to exit")?;
        }
        self.handler.abort();
        closed.map(|_| ())
    }
}

async fn wait_for_selector(
    page: &Page,
    selector: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let start = Instant::now();
    loop {
        if page.find_element(selector).await.is_ok() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(poll_interval).await;
    }
}
