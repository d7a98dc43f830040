use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::IngestArgs;
use crate::config::CategoryConfig;
use crate::formats::{ADDRESS_COLUMN, Batch, IMAGE_COLUMN, PRICE_COLUMN, SOURCE_COLUMN};
use crate::store::Store;

pub const DEFAULT_SOURCE_TAG: &str = "Web Scraper Ext";

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
const SNIFF_RECORDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub malformed_rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub parsed_rows: usize,
    pub malformed_rows: usize,
    pub incomplete_rows: usize,
    pub duplicate_rows: usize,
    pub ingested_rows: usize,
}

/// Picks the candidate delimiter that splits the most sampled records into
/// as many fields as the header has. Falls back to a comma.
pub fn detect_delimiter(data: &[u8]) -> u8 {
    let mut best = (b',', 0_usize);

    for delimiter in CANDIDATE_DELIMITERS {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(data);

        let mut widths = reader
            .byte_records()
            .take(SNIFF_RECORDS)
            .filter_map(Result::ok)
            .map(|record| record.len());
        let Some(header_width) = widths.next() else {
            continue;
        };
        if header_width < 2 {
            continue;
        }

        let score = 1 + widths.filter(|width| *width == header_width).count();
        if score > best.1 {
            best = (delimiter, score);
        }
    }

    best.0
}

pub fn read_delimited(data: &[u8]) -> anyhow::Result<RawTable> {
    let delimiter = detect_delimiter(data);
    tracing::debug!(delimiter = %char::from(delimiter).escape_default(), "detected delimiter");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut records = reader.byte_records();

    let header = loop {
        match records.next() {
            Some(Ok(record)) if record.iter().all(|field| field.is_empty()) => continue,
            Some(Ok(record)) => break record.iter().map(decode).collect::<Vec<_>>(),
            Some(Err(err)) => return Err(err).context("read header row"),
            None => anyhow::bail!("input has no header row"),
        }
    };

    let mut rows = Vec::new();
    let mut malformed_rows = 0_usize;
    for record in records {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(?err, "skipping unreadable row");
                malformed_rows += 1;
                continue;
            }
        };
        if record.len() == 1 && record.iter().all(|field| field.is_empty()) {
            continue;
        }
        if record.len() != header.len() {
            malformed_rows += 1;
            continue;
        }
        rows.push(record.iter().map(decode).collect());
    }

    Ok(RawTable {
        header: name_columns(header),
        rows,
        malformed_rows,
    })
}

/// Turns a parsed file into a batch for a store keyed by `category_field`.
pub fn clean(table: RawTable, category_field: &str, source_tag: &str) -> (Batch, IngestReport) {
    let mut report = IngestReport {
        parsed_rows: table.rows.len(),
        malformed_rows: table.malformed_rows,
        ..IngestReport::default()
    };

    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for row in table.rows {
        if row.iter().any(String::is_empty) {
            report.incomplete_rows += 1;
            continue;
        }
        if !seen.insert(row.clone()) {
            report.duplicate_rows += 1;
            continue;
        }
        rows.push(row);
    }

    let mut columns = table.header;
    if columns.len() >= 4 {
        let canonical = [category_field, PRICE_COLUMN, ADDRESS_COLUMN, IMAGE_COLUMN];
        for (column, name) in columns.iter_mut().zip(canonical) {
            *column = name.to_owned();
        }
    }

    let source_idx = match columns.iter().position(|column| column == SOURCE_COLUMN) {
        Some(idx) => idx,
        None => {
            columns.push(SOURCE_COLUMN.to_owned());
            columns.len() - 1
        }
    };

    // After renaming, a later column may share a name with an earlier one;
    // only the first is kept.
    let mut keep = Vec::with_capacity(columns.len());
    let mut kept_names: Vec<&str> = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        if kept_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(column))
        {
            continue;
        }
        kept_names.push(column);
        keep.push(idx);
    }

    let batch_rows = rows
        .into_iter()
        .map(|mut row| {
            row.resize(columns.len(), String::new());
            row[source_idx] = source_tag.to_owned();
            keep.iter()
                .map(|idx| Some(row[*idx].clone()))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    let batch_columns = keep.iter().map(|idx| columns[*idx].clone()).collect();

    report.ingested_rows = batch_rows.len();
    (
        Batch {
            columns: batch_columns,
            rows: batch_rows,
        },
        report,
    )
}

pub fn run(args: IngestArgs) -> anyhow::Result<()> {
    let config = CategoryConfig::load(args.location.config.as_deref().map(Path::new))
        .context("load category config")?;
    let entry = config.get(&args.store)?;

    let file = PathBuf::from(&args.file);
    let data = std::fs::read(&file).with_context(|| format!("read input: {}", file.display()))?;
    let table = read_delimited(&data).with_context(|| format!("parse input: {}", file.display()))?;
    tracing::info!(
        file = %file.display(),
        rows = table.rows.len(),
        columns = table.header.len(),
        malformed = table.malformed_rows,
        "ingest: parsed input"
    );

    let (batch, report) = clean(table, &entry.category_field, &args.source_tag);
    tracing::info!(
        incomplete = report.incomplete_rows,
        duplicates = report.duplicate_rows,
        kept = report.ingested_rows,
        "ingest: cleaned rows"
    );

    let store = Store::open(&PathBuf::from(&args.location.data_dir), entry)?;
    store
        .flush(&batch)
        .with_context(|| format!("write to store {}", entry.store))?;

    println!("ingested {} rows into {}", report.ingested_rows, entry.store);
    Ok(())
}

// Cells are kept byte for byte; "Chemise " and "Chemise" are distinct values.
fn decode(field: &[u8]) -> String {
    String::from_utf8_lossy(field).into_owned()
}

/// Names blank header cells and suffixes repeated names (`a`, `a.1`, ...).
fn name_columns(header: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(header.len());
    for (idx, name) in header.into_iter().enumerate() {
        let base = if name.is_empty() {
            format!("column_{}", idx + 1)
        } else {
            name.trim_start_matches('\u{feff}').to_owned()
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while out
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(&candidate))
        {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = "\
web-scraper-order,type,price,location,image
1,Chemise,5 000 FCFA,Dakar,https://img/1.jpg
2,Jean,7 000 FCFA,Thies,https://img/2.jpg
3,Veste,9 000 FCFA,Dakar,https://img/3.jpg
";

    #[test]
    fn detects_common_delimiters() {
        assert_eq!(detect_delimiter(b"a,b,c\n1,2,3\n"), b',');
        assert_eq!(detect_delimiter(b"a;b;c\n1;2,5;3\n"), b';');
        assert_eq!(detect_delimiter(b"a\tb\n1\t2\n"), b'\t');
        assert_eq!(detect_delimiter(b"a|b\n1|2\n"), b'|');
        assert_eq!(detect_delimiter(b"single\nvalue\n"), b',');
    }

    #[test]
    fn ten_rows_with_malformed_and_duplicate_rows_keep_seven() -> anyhow::Result<()> {
        let input = "\
type;prix;adresse;image
Chemise;5 000 FCFA;Dakar;https://img/1.jpg
Jean;7 000 FCFA;Thies;https://img/2.jpg
Veste;9 000 FCFA;Dakar;https://img/3.jpg
Pull;4 000 FCFA;Dakar;https://img/4.jpg;extra;fields
Short;2 000 FCFA;Mbour;https://img/5.jpg
Jean;7 000 FCFA;Thies;https://img/2.jpg
Boubou;15 000 FCFA;Dakar;https://img/6.jpg
Costume;45 000 FCFA;Dakar;https://img/7.jpg;oops
Tshirt;1 500 FCFA;Rufisque;https://img/8.jpg
Polo;3 000 FCFA;Dakar;https://img/9.jpg
";
        let table = read_delimited(input.as_bytes())?;
        assert_eq!(table.malformed_rows, 2);
        assert_eq!(table.rows.len(), 8);

        let (batch, report) = clean(table, "type_habits", DEFAULT_SOURCE_TAG);
        assert_eq!(report.duplicate_rows, 1);
        assert_eq!(report.ingested_rows, 7);
        assert_eq!(batch.len(), 7);
        assert_eq!(
            batch.columns,
            vec!["type_habits", "prix", "adresse", "image_lien", "source"]
        );
        assert!(
            batch
                .rows
                .iter()
                .all(|row| row[4].as_deref() == Some("Web Scraper Ext"))
        );
        Ok(())
    }

    #[test]
    fn renames_first_four_columns_by_position() -> anyhow::Result<()> {
        let table = read_delimited(EXPORT.as_bytes())?;
        let (batch, _) = clean(table, "type_chaussures", "ext");

        // The order column comes first in this export, so it lands in the
        // category column; the original names do not matter.
        assert_eq!(
            batch.columns,
            vec!["type_chaussures", "prix", "adresse", "image_lien", "image", "source"]
        );
        assert_eq!(batch.rows[0][0].as_deref(), Some("1"));
        assert_eq!(batch.rows[0][1].as_deref(), Some("Chemise"));
        Ok(())
    }

    #[test]
    fn rows_with_empty_fields_are_dropped() -> anyhow::Result<()> {
        let input = "a,b,c,d\n1,2,3,4\n1,,3,4\n5,6,7,\n";
        let table = read_delimited(input.as_bytes())?;
        let (batch, report) = clean(table, "type_habits", DEFAULT_SOURCE_TAG);

        assert_eq!(report.incomplete_rows, 2);
        assert_eq!(batch.len(), 1);
        Ok(())
    }

    #[test]
    fn padded_values_are_neither_missing_nor_duplicates() -> anyhow::Result<()> {
        let input = "a,b,c,d\nChemise ,2,3,4\nChemise,2,3,4\nVeste, ,3,4\n";
        let table = read_delimited(input.as_bytes())?;
        let (batch, report) = clean(table, "type_habits", DEFAULT_SOURCE_TAG);

        assert_eq!(report.incomplete_rows, 0);
        assert_eq!(report.duplicate_rows, 0);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.rows[0][0].as_deref(), Some("Chemise "));
        assert_eq!(batch.rows[2][1].as_deref(), Some(" "));
        Ok(())
    }

    #[test]
    fn narrow_files_keep_their_names_and_existing_source_is_overwritten() -> anyhow::Result<()> {
        let input = "name,source\nChemise,site\n";
        let table = read_delimited(input.as_bytes())?;
        let (batch, _) = clean(table, "type_habits", "tagged");

        assert_eq!(batch.columns, vec!["name", "source"]);
        assert_eq!(
            batch.rows[0],
            vec![Some("Chemise".to_owned()), Some("tagged".to_owned())]
        );
        Ok(())
    }

    #[test]
    fn renamed_columns_that_collide_keep_the_first() -> anyhow::Result<()> {
        let input = "a,b,c,d,prix\n1,2,3,4,5\n";
        let table = read_delimited(input.as_bytes())?;
        let (batch, _) = clean(table, "type_habits", "ext");

        assert_eq!(
            batch.columns,
            vec!["type_habits", "prix", "adresse", "image_lien", "source"]
        );
        assert_eq!(batch.rows[0][1].as_deref(), Some("2"));
        Ok(())
    }

    #[test]
    fn header_names_are_made_unique() {
        let named = name_columns(vec![
            "a".to_owned(),
            "a".to_owned(),
            String::new(),
            "\u{feff}b".to_owned(),
        ]);
        assert_eq!(named, vec!["a", "a.1", "column_3", "b"]);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(read_delimited(b"").is_err());
    }
}
