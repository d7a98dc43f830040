use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rusqlite::Connection;
use rusqlite::types::ValueRef;

use crate::cli::InitArgs;
use crate::config::{CategoryConfig, StoreConfig};
use crate::formats::{Batch, ListingRecord, StoreRows};
use crate::schema::{quote_identifier, reconcile, table_columns};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub columns_added: Vec<String>,
    pub rows_written: usize,
}

/// An append-only SQLite table holding the listings of one category.
pub struct Store {
    conn: Connection,
    table: String,
    path: Option<PathBuf>,
}

impl Store {
    pub fn open(data_dir: &Path, config: &StoreConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("create data dir: {}", data_dir.display()))?;
        let path = store_path(data_dir, config);
        let conn = Connection::open(&path)
            .with_context(|| format!("open store: {}", path.display()))?;
        tracing::debug!(path = %path.display(), table = %config.table, "opened store");

        Ok(Self {
            conn,
            table: config.table.clone(),
            path: Some(path),
        })
    }

    pub fn open_in_memory(table: &str) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory store")?;
        Ok(Self {
            conn,
            table: table.to_owned(),
            path: None,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn columns(&self) -> anyhow::Result<Vec<String>> {
        table_columns(&self.conn, &self.table)
    }

    pub fn init(&self, category_field: &str) -> anyhow::Result<Vec<String>> {
        self.reconcile(&ListingRecord::columns(category_field))
    }

    pub fn reconcile(&self, columns: &[String]) -> anyhow::Result<Vec<String>> {
        reconcile(&self.conn, &self.table, columns)
    }

    /// Inserts every row of `batch` as a new row.
    ///
    /// Each row is its own statement: a failure part-way leaves the earlier
    /// rows committed. The table must already hold every batch column.
    pub fn append(&self, batch: &Batch) -> anyhow::Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let column_list = batch
            .columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=batch.columns.len())
            .map(|idx| format!("?{idx}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_identifier(&self.table)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("prepare insert into {}", self.table))?;

        for (idx, row) in batch.rows.iter().enumerate() {
            if row.len() != batch.columns.len() {
                anyhow::bail!(
                    "row {idx} has {} values for {} columns",
                    row.len(),
                    batch.columns.len()
                );
            }
            stmt.execute(rusqlite::params_from_iter(row.iter()))
                .with_context(|| format!("insert row {idx} into {}", self.table))?;
        }

        Ok(batch.len())
    }

    pub fn flush(&self, batch: &Batch) -> anyhow::Result<FlushReport> {
        let columns_added = if batch.columns.is_empty() {
            Vec::new()
        } else {
            self.reconcile(&batch.columns)
                .context("reconcile store schema")?
        };
        let rows_written = self.append(batch).context("append batch")?;
        tracing::info!(
            table = %self.table,
            rows = rows_written,
            columns_added = columns_added.len(),
            "flushed batch"
        );

        Ok(FlushReport {
            columns_added,
            rows_written,
        })
    }

    pub fn row_count(&self) -> anyhow::Result<usize> {
        if self.columns()?.is_empty() {
            return Ok(0);
        }
        let count: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_identifier(&self.table)),
                [],
                |row| row.get(0),
            )
            .with_context(|| format!("count rows of {}", self.table))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Every row of the table, in insertion order. A missing table reads as
    /// an empty store.
    pub fn load_all(&self) -> anyhow::Result<StoreRows> {
        if self.columns()?.is_empty() {
            return Ok(StoreRows::default());
        }

        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT * FROM {} ORDER BY rowid",
                quote_identifier(&self.table)
            ))
            .with_context(|| format!("prepare select from {}", self.table))?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        let width = columns.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|idx| row.get_ref(idx).map(value_to_text))
                    .collect::<Result<Vec<_>, _>>()
            })
            .with_context(|| format!("select from {}", self.table))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("read rows of {}", self.table))?;

        Ok(StoreRows { columns, rows })
    }
}

pub fn init(args: InitArgs) -> anyhow::Result<()> {
    let config = CategoryConfig::load(args.location.config.as_deref().map(Path::new))
        .context("load category config")?;
    let data_dir = PathBuf::from(&args.location.data_dir);

    for entry in &config.stores {
        let store = Store::open(&data_dir, entry)?;
        let created = store
            .init(&entry.category_field)
            .with_context(|| format!("init store {}", entry.store))?;
        tracing::info!(
            path = ?store.path(),
            table = store.table(),
            columns_added = created.len(),
            "init store"
        );
    }

    println!(
        "initialized {} stores in {}",
        config.stores.len(),
        data_dir.display()
    );
    Ok(())
}

pub fn store_path(data_dir: &Path, config: &StoreConfig) -> PathBuf {
    data_dir.join(&config.store)
}

fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(n) => Some(n.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
