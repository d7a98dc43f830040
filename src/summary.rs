use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Serialize;

use crate::cli::SummaryArgs;
use crate::config::CategoryConfig;
use crate::formats::{ADDRESS_COLUMN, IMAGE_COLUMN, ListingRecord, PRICE_COLUMN, StoreRows};
use crate::store::Store;

const TOP_ADDRESSES: usize = 10;
const PREVIEW_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Summary {
    Empty,
    Populated(StoreSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub category_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub total_rows: usize,
    pub matched_rows: usize,
    /// Distinct category values across the whole store, first seen first.
    pub categories: Vec<String>,
    /// `None` when the filter matched no rows.
    pub price: Option<PriceStats>,
    pub by_category: Vec<GroupCount>,
    pub top_addresses: Vec<GroupCount>,
    pub preview: Vec<ListingRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    pub min: i64,
    pub max: i64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub value: String,
    pub count: usize,
}

/// Numeric value of a display price: every non-digit is dropped and the rest
/// parsed as an integer. No digits at all reads as 0.
pub fn price_value(price: &str) -> i64 {
    let digits = price
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>();
    if digits.is_empty() {
        return 0;
    }
    // Only overflow can fail here.
    digits.parse().unwrap_or(i64::MAX)
}

pub fn summarize(rows: &StoreRows, category_field: &str, filter: Option<&str>) -> Summary {
    if rows.is_empty() {
        return Summary::Empty;
    }

    let category_idx = rows.column_index(category_field);
    let price_idx = rows.column_index(PRICE_COLUMN);
    let address_idx = rows.column_index(ADDRESS_COLUMN);
    let image_idx = rows.column_index(IMAGE_COLUMN);

    let categories = group_counts(rows.rows.iter().map(|row| cell(row, category_idx)))
        .into_iter()
        .map(|group| group.value)
        .collect::<Vec<_>>();

    let matched = rows
        .rows
        .iter()
        .filter(|row| match filter {
            Some(wanted) => cell(row, category_idx).as_deref() == Some(wanted),
            None => true,
        })
        .collect::<Vec<_>>();

    let prices = matched
        .iter()
        .map(|row| price_value(cell(row, price_idx).as_deref().unwrap_or_default()))
        .collect::<Vec<_>>();

    let mut top_addresses = group_counts(matched.iter().map(|row| cell(row, address_idx)));
    top_addresses.truncate(TOP_ADDRESSES);

    let preview = matched
        .iter()
        .take(PREVIEW_ROWS)
        .map(|row| ListingRecord {
            category: cell(row, category_idx).unwrap_or_default(),
            price: cell(row, price_idx).unwrap_or_default(),
            address: cell(row, address_idx).unwrap_or_default(),
            image_url: cell(row, image_idx).unwrap_or_default(),
        })
        .collect();

    Summary::Populated(StoreSummary {
        category_field: category_field.to_owned(),
        filter: filter.map(str::to_owned),
        total_rows: rows.rows.len(),
        matched_rows: matched.len(),
        categories,
        price: price_stats(&prices),
        by_category: group_counts(matched.iter().map(|row| cell(row, category_idx))),
        top_addresses,
        preview,
    })
}

fn cell(row: &[Option<String>], idx: Option<usize>) -> Option<String> {
    idx.and_then(|idx| row.get(idx).cloned().flatten())
}

fn price_stats(prices: &[i64]) -> Option<PriceStats> {
    let min = *prices.iter().min()?;
    let max = *prices.iter().max()?;
    let sum = prices.iter().map(|price| i128::from(*price)).sum::<i128>();
    Some(PriceStats {
        min,
        max,
        mean: sum as f64 / prices.len() as f64,
    })
}

/// Counts non-null values, most frequent first; equal counts keep the order
/// in which values first appeared.
fn group_counts(values: impl Iterator<Item = Option<String>>) -> Vec<GroupCount> {
    let mut groups: Vec<GroupCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for value in values.flatten() {
        match index.get(&value) {
            Some(&idx) => groups[idx].count += 1,
            None => {
                index.insert(value.clone(), groups.len());
                groups.push(GroupCount { value, count: 1 });
            }
        }
    }

    groups.sort_by(|a, b| b.count.cmp(&a.count));
    groups
}

pub fn run(args: SummaryArgs) -> anyhow::Result<()> {
    let config = CategoryConfig::load(args.location.config.as_deref().map(Path::new))
        .context("load category config")?;
    let entry = config.get(&args.store)?;

    let store = Store::open(&PathBuf::from(&args.location.data_dir), entry)?;
    let rows = store
        .load_all()
        .with_context(|| format!("load store {}", entry.store))?;
    tracing::debug!(store = %entry.store, rows = rows.rows.len(), "loaded store");

    let summary = summarize(&rows, &entry.category_field, args.filter.as_deref());
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serialize summary")?
        );
    } else {
        print!("{}", render_text(&entry.store, &summary)?);
    }
    Ok(())
}

pub fn render_text(store: &str, summary: &Summary) -> anyhow::Result<String> {
    let summary = match summary {
        Summary::Empty => return Ok(format!("{store}: empty store\n")),
        Summary::Populated(summary) => summary,
    };

    let mut out = String::new();
    writeln!(out, "{store}: {} rows", summary.total_rows)?;
    if let Some(filter) = &summary.filter {
        writeln!(
            out,
            "{} = {filter}: {} rows",
            summary.category_field, summary.matched_rows
        )?;
    }

    match &summary.price {
        Some(price) => {
            writeln!(out, "price min:  {} FCFA", group_thousands(price.min))?;
            writeln!(out, "price max:  {} FCFA", group_thousands(price.max))?;
            writeln!(
                out,
                "price mean: {} FCFA",
                group_thousands(price.mean.round() as i64)
            )?;
        }
        None => {
            writeln!(out, "no rows match the filter")?;
        }
    }

    writeln!(out, "\nby {}:", summary.category_field)?;
    for group in &summary.by_category {
        writeln!(out, "  {:>6}  {}", group.count, group.value)?;
    }

    writeln!(out, "\ntop addresses:")?;
    for group in &summary.top_addresses {
        writeln!(out, "  {:>6}  {}", group.count, group.value)?;
    }

    writeln!(out, "\nfirst listings:")?;
    for record in &summary.preview {
        writeln!(
            out,
            "  {} | {} | {} | {}",
            record.category, record.price, record.address, record.image_url
        )?;
    }

    Ok(out)
}

fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[(&str, &str, &str)]) -> StoreRows {
        StoreRows {
            columns: vec![
                "type_habits".to_owned(),
                "prix".to_owned(),
                "adresse".to_owned(),
                "image_lien".to_owned(),
            ],
            rows: data
                .iter()
                .map(|(category, price, address)| {
                    vec![
                        Some((*category).to_owned()),
                        Some((*price).to_owned()),
                        Some((*address).to_owned()),
                        None,
                    ]
                })
                .collect(),
        }
    }

    #[test]
    fn price_value_keeps_only_digits() {
        assert_eq!(price_value("12 500 FCFA"), 12500);
        assert_eq!(price_value("12.000 F"), 12000);
        assert_eq!(price_value(""), 0);
        assert_eq!(price_value("Prix non communiqué"), 0);
        assert_eq!(price_value("99999999999999999999999"), i64::MAX);
    }

    #[test]
    fn empty_store_is_reported_as_empty() -> anyhow::Result<()> {
        assert_eq!(summarize(&StoreRows::default(), "type_habits", None), Summary::Empty);
        assert_eq!(
            render_text("Article1.db", &Summary::Empty)?,
            "Article1.db: empty store\n"
        );
        Ok(())
    }

    #[test]
    fn aggregates_prices_and_groups() {
        let data = rows(&[
            ("Chemise", "10 000 FCFA", "Dakar"),
            ("Jean", "Prix sur demande", "Thies"),
            ("Chemise", "20 000 FCFA", "Dakar"),
            ("Veste", "30 000 FCFA", "Mbour"),
        ]);
        let Summary::Populated(summary) = summarize(&data, "type_habits", None) else {
            panic!("expected populated summary");
        };

        assert_eq!(summary.total_rows, 4);
        assert_eq!(
            summary.price,
            Some(PriceStats {
                min: 0,
                max: 30000,
                mean: 15000.0
            })
        );
        assert_eq!(
            summary.by_category,
            vec![
                GroupCount { value: "Chemise".to_owned(), count: 2 },
                GroupCount { value: "Jean".to_owned(), count: 1 },
                GroupCount { value: "Veste".to_owned(), count: 1 },
            ]
        );
        assert_eq!(summary.top_addresses[0].value, "Dakar");
        assert_eq!(summary.categories, vec!["Chemise", "Jean", "Veste"]);
        assert_eq!(summary.preview.len(), 4);
        assert_eq!(summary.preview[1].image_url, "");
    }

    #[test]
    fn filter_restricts_stats_but_not_category_list() {
        let data = rows(&[
            ("Chemise", "10 000 FCFA", "Dakar"),
            ("Jean", "5 000 FCFA", "Thies"),
            ("Chemise", "20 000 FCFA", "Dakar"),
        ]);
        let Summary::Populated(summary) = summarize(&data, "type_habits", Some("Chemise")) else {
            panic!("expected populated summary");
        };
        assert_eq!(summary.matched_rows, 2);
        assert_eq!(summary.price.as_ref().map(|p| p.min), Some(10000));
        assert_eq!(summary.categories.len(), 2);

        let Summary::Populated(none) = summarize(&data, "type_habits", Some("Boubou")) else {
            panic!("expected populated summary");
        };
        assert_eq!(none.matched_rows, 0);
        assert_eq!(none.price, None);
        assert!(none.by_category.is_empty());
    }

    #[test]
    fn top_addresses_are_capped_at_ten() {
        let mut data = Vec::new();
        for n in 0..12 {
            for _ in 0..=n {
                data.push(("Chemise".to_owned(), "1".to_owned(), format!("quartier {n}")));
            }
        }
        let borrowed = data
            .iter()
            .map(|(c, p, a)| (c.as_str(), p.as_str(), a.as_str()))
            .collect::<Vec<_>>();
        let Summary::Populated(summary) = summarize(&rows(&borrowed), "type_habits", None) else {
            panic!("expected populated summary");
        };

        assert_eq!(summary.top_addresses.len(), 10);
        assert_eq!(summary.top_addresses[0].value, "quartier 11");
        assert_eq!(summary.top_addresses[9].value, "quartier 2");
        assert_eq!(summary.preview.len(), 10);
    }

    #[test]
    fn null_values_are_not_counted() {
        let mut data = rows(&[("Chemise", "1", "Dakar")]);
        data.rows.push(vec![None, Some("2".to_owned()), None, None]);
        let Summary::Populated(summary) = summarize(&data, "type_habits", None) else {
            panic!("expected populated summary");
        };
        assert_eq!(summary.by_category.len(), 1);
        assert_eq!(summary.top_addresses.len(), 1);
        assert_eq!(summary.price.map(|p| p.max), Some(2));
    }

    #[test]
    fn equal_counts_keep_first_seen_order() {
        let groups = group_counts(
            ["b", "a", "c", "a", "b"]
                .into_iter()
                .map(|v| Some(v.to_owned())),
        );
        let values = groups.iter().map(|g| g.value.as_str()).collect::<Vec<_>>();
        assert_eq!(values, vec!["b", "a", "c"]);
    }

    #[test]
    fn text_report_groups_thousands() -> anyhow::Result<()> {
        assert_eq!(group_thousands(12500), "12,500");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000_000), "1,000,000");
        assert_eq!(group_thousands(-4500), "-4,500");

        let data = rows(&[("Chemise", "12 500 FCFA", "Dakar")]);
        let text = render_text("Article1.db", &summarize(&data, "type_habits", None))?;
        assert!(text.starts_with("Article1.db: 1 rows\n"));
        assert!(text.contains("price mean: 12,500 FCFA"));
        assert!(text.contains("1  Chemise"));
        Ok(())
    }
}
