use anyhow::Context as _;
use scraper::{ElementRef, Html, Selector};

use crate::fetch::RenderedPage;
use crate::formats::ListingRecord;

pub const CONTAINER_SELECTOR: &str = "div.ad__card";
const CATEGORY_SELECTOR: &str = "a[title]";
const PRICE_SELECTOR: &str = "p.ad__card-price";
const ADDRESS_SELECTOR: &str = "p.ad__card-location";
const IMAGE_SELECTOR: &str = "img.ad__card-img";

#[derive(Debug)]
pub struct ListingExtractor {
    container: Selector,
    category: Selector,
    price: Selector,
    address: Selector,
    image: Selector,
}

impl ListingExtractor {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            container: parse_selector(CONTAINER_SELECTOR)?,
            category: parse_selector(CATEGORY_SELECTOR)?,
            price: parse_selector(PRICE_SELECTOR)?,
            address: parse_selector(ADDRESS_SELECTOR)?,
            image: parse_selector(IMAGE_SELECTOR)?,
        })
    }

    /// One record per listing container, in document order.
    pub fn extract(&self, page: &RenderedPage) -> Vec<ListingRecord> {
        let document = Html::parse_document(&page.html);
        let records = document
            .select(&self.container)
            .map(|container| ListingRecord {
                category: first(container, &self.category)
                    .and_then(|el| el.value().attr("title"))
                    .map(collapse_whitespace)
                    .unwrap_or_default(),
                price: first(container, &self.price)
                    .map(element_text)
                    .unwrap_or_default(),
                address: first(container, &self.address)
                    .map(element_text)
                    .unwrap_or_default(),
                image_url: first(container, &self.image)
                    .and_then(|el| el.value().attr("src"))
                    .map(|src| resolve_link(page, src))
                    .unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        if records.is_empty() {
            tracing::debug!(url = %page.url, "no listing containers on page");
        }
        records
    }
}

fn parse_selector(selector: &str) -> anyhow::Result<Selector> {
    Selector::parse(selector)
        .map_err(|err| anyhow::anyhow!("{err}"))
        .with_context(|| format!("parse selector {selector:?}"))
}

fn first<'a>(container: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    container.select(selector).next()
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve_link(page: &RenderedPage, src: &str) -> String {
    let src = src.trim();
    if src.is_empty() {
        return String::new();
    }
    match page.url.join(src) {
        Ok(url) => url.to_string(),
        Err(_) => src.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn page(html: &str) -> RenderedPage {
        RenderedPage {
            url: Url::parse("https://sn.coinafrique.com/categorie/vetements-homme?page=1")
                .expect("valid url"),
            html: html.to_owned(),
        }
    }

    const CARD: &str = r#"
<div class="ad__card">
  <a href="/annonce/1" title="Chemise en lin"><img class="ad__card-img" src="/img/1.jpg"></a>
  <p class="ad__card-price">12 000
     FCFA</p>
  <p class="ad__card-location"><span>Dakar,</span> Plateau</p>
</div>"#;

    #[test]
    fn extracts_all_four_fields() -> anyhow::Result<()> {
        let extractor = ListingExtractor::new()?;
        let records = extractor.extract(&page(CARD));

        assert_eq!(
            records,
            vec![ListingRecord {
                category: "Chemise en lin".to_owned(),
                price: "12 000 FCFA".to_owned(),
                address: "Dakar, Plateau".to_owned(),
                image_url: "https://sn.coinafrique.com/img/1.jpg".to_owned(),
            }]
        );
        Ok(())
    }

    #[test]
    fn missing_fields_default_independently() -> anyhow::Result<()> {
        let extractor = ListingExtractor::new()?;
        let html = format!(
            r#"<html><body>
{CARD}
<div class="ad__card"><p class="ad__card-location">Thiès</p></div>
<div class="ad__card"></div>
<div class="ad__card"><a title="Jean"></a><p class="ad__card-price">8 500 FCFA</p></div>
</body></html>"#
        );
        let records = extractor.extract(&page(&html));

        assert_eq!(records.len(), 4);
        assert_eq!(records[1].address, "Thiès");
        assert_eq!(records[1].category, "");
        assert_eq!(records[1].price, "");
        assert_eq!(records[1].image_url, "");
        assert_eq!(records[2], ListingRecord::default());
        assert_eq!(records[3].category, "Jean");
        assert_eq!(records[3].price, "8 500 FCFA");
        assert_eq!(records[3].address, "");
        Ok(())
    }

    #[test]
    fn page_without_containers_yields_nothing() -> anyhow::Result<()> {
        let extractor = ListingExtractor::new()?;
        let records = extractor.extract(&page("<html><body><p>Aucune annonce</p></body></html>"));
        assert!(records.is_empty());
        Ok(())
    }

    #[test]
    fn records_follow_document_order() -> anyhow::Result<()> {
        let extractor = ListingExtractor::new()?;
        let html = (1..=3)
            .map(|n| format!(r#"<div class="ad__card"><a title="item {n}"></a></div>"#))
            .collect::<String>();
        let titles = extractor
            .extract(&page(&html))
            .into_iter()
            .map(|record| record.category)
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["item 1", "item 2", "item 3"]);
        Ok(())
    }
}
