use serde::{Deserialize, Serialize};

pub const PRICE_COLUMN: &str = "prix";
pub const ADDRESS_COLUMN: &str = "adresse";
pub const IMAGE_COLUMN: &str = "image_lien";
pub const SOURCE_COLUMN: &str = "source";

/// One product entry scraped from a listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub category: String,
    pub price: String,
    pub address: String,
    pub image_url: String,
}

impl ListingRecord {
    pub fn columns(category_field: &str) -> Vec<String> {
        vec![
            category_field.to_owned(),
            PRICE_COLUMN.to_owned(),
            ADDRESS_COLUMN.to_owned(),
            IMAGE_COLUMN.to_owned(),
        ]
    }

    fn into_row(self) -> Vec<Option<String>> {
        vec![
            Some(self.category),
            Some(self.price),
            Some(self.address),
            Some(self.image_url),
        ]
    }
}

/// Rows headed for a store, keyed by column name.
///
/// Each row holds one value per entry in `columns`; `None` is written as NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Batch {
    pub fn from_records(category_field: &str, records: Vec<ListingRecord>) -> Self {
        Self {
            columns: ListingRecord::columns(category_field),
            rows: records.into_iter().map(ListingRecord::into_row).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl StoreRows {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
