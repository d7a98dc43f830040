use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cli::StoresArgs;
use crate::formats::{ADDRESS_COLUMN, IMAGE_COLUMN, PRICE_COLUMN, SOURCE_COLUMN};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub store: String,
    pub table: String,
    /// Column holding the listing's type (garment type, shoe type, ...).
    pub category_field: String,
    /// Category page; the page number is appended as a `page` query parameter.
    pub url: String,
}

impl StoreConfig {
    pub fn base_url(&self) -> anyhow::Result<Url> {
        let url = Url::parse(&self.url)
            .with_context(|| format!("parse url of store {}: {}", self.store, self.url))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("url of store {} must be http/https: {url}", self.store);
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub stores: Vec<StoreConfig>,
}

impl CategoryConfig {
    pub fn builtin() -> Self {
        let entry = |store: &str, table: &str, category_field: &str, slug: &str| StoreConfig {
            store: store.to_owned(),
            table: table.to_owned(),
            category_field: category_field.to_owned(),
            url: format!("https://sn.coinafrique.com/categorie/{slug}"),
        };

        Self {
            stores: vec![
                entry("Article1.db", "IM_table", "type_habits", "vetements-homme"),
                entry("Article2.db", "IM_table2", "type_chaussures", "chaussures-homme"),
                entry("Article3.db", "IM_table3", "type_habits", "vetements-enfants"),
                entry(
                    "Article4.db",
                    "IM_table4",
                    "type_chaussures",
                    "chaussures-enfants",
                ),
            ],
        }
    }

    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)
                    .with_context(|| format!("read config: {}", path.display()))?;
                Self::from_yaml(&yaml)
                    .with_context(|| format!("parse config: {}", path.display()))?
            }
            None => Self::builtin(),
        };
        config.validate().context("validate config")?;
        tracing::debug!(stores = config.stores.len(), "loaded category config");
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("deserialize category config")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stores.is_empty() {
            anyhow::bail!("config must declare at least one store");
        }

        let mut seen = HashSet::new();
        for entry in &self.stores {
            if !is_store_file_name(&entry.store) {
                anyhow::bail!("invalid store file name: {:?}", entry.store);
            }
            if !seen.insert(entry.store.as_str()) {
                anyhow::bail!("duplicate store: {}", entry.store);
            }
            if !is_identifier(&entry.table) {
                anyhow::bail!("invalid table name for {}: {:?}", entry.store, entry.table);
            }
            if !is_identifier(&entry.category_field) {
                anyhow::bail!(
                    "invalid category field for {}: {:?}",
                    entry.store,
                    entry.category_field
                );
            }
            if [PRICE_COLUMN, ADDRESS_COLUMN, IMAGE_COLUMN, SOURCE_COLUMN]
                .iter()
                .any(|column| column.eq_ignore_ascii_case(&entry.category_field))
            {
                anyhow::bail!(
                    "category field of {} collides with a listing column: {}",
                    entry.store,
                    entry.category_field
                );
            }
            entry.base_url()?;
        }

        Ok(())
    }

    pub fn get(&self, store: &str) -> anyhow::Result<&StoreConfig> {
        self.stores
            .iter()
            .find(|entry| entry.store == store)
            .ok_or_else(|| {
                let known = self
                    .stores
                    .iter()
                    .map(|entry| entry.store.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                anyhow::anyhow!("unknown store: {store} (known: {known})")
            })
    }
}

pub fn list(args: StoresArgs) -> anyhow::Result<()> {
    let config = CategoryConfig::load(args.config.as_deref().map(Path::new))?;
    for entry in &config.stores {
        println!(
            "{}\t{}\t{}\t{}",
            entry.store, entry.table, entry.category_field, entry.url
        );
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn is_store_file_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}
