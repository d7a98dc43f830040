use anyhow::Context as _;
use rusqlite::Connection;

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn table_columns(conn: &Connection, table: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM pragma_table_info(?1)")
        .context("prepare table_info query")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))
        .with_context(|| format!("query columns of {table}"))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("read columns of {table}"))?;
    Ok(columns)
}

/// Makes the columns of `table` a superset of `columns` and returns the
/// columns that were added.
///
/// A missing table is created with exactly `columns`. Column names compare
/// case-insensitively, as SQLite does.
pub fn reconcile(conn: &Connection, table: &str, columns: &[String]) -> anyhow::Result<Vec<String>> {
    let mut existing = table_columns(conn, table)?;

    if existing.is_empty() {
        let wanted = dedup_columns(columns);
        if wanted.is_empty() {
            anyhow::bail!("cannot create table {table} without columns");
        }
        let column_defs = wanted
            .iter()
            .map(|column| format!("{} TEXT", quote_identifier(column)))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({column_defs})",
            quote_identifier(table)
        ))
        .with_context(|| format!("create table {table}"))?;
        tracing::info!(table, columns = ?wanted, "created table");
        return Ok(wanted);
    }

    let mut added = Vec::new();
    for column in columns {
        if contains_column(&existing, column) {
            continue;
        }
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT",
            quote_identifier(table),
            quote_identifier(column)
        ))
        .with_context(|| format!("add column {column} to {table}"))?;
        existing.push(column.clone());
        added.push(column.clone());
    }

    if !added.is_empty() {
        tracing::info!(table, columns = ?added, "added columns");
    }
    Ok(added)
}

fn contains_column(columns: &[String], name: &str) -> bool {
    columns.iter().any(|column| column.eq_ignore_ascii_case(name))
}

fn dedup_columns(columns: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(columns.len());
    for column in columns {
        if !contains_column(&out, column) {
            out.push(column.clone());
        }
    }
    out
}
