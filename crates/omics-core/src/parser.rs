//! Delimited-text parser for omics tables

use crate::error::{Error, Result};
use crate::resources::open_local;
use crate::table::{Column, Row, Table};
use crate::value::Value;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Options controlling how a delimited file becomes a [`Table`]
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Field delimiter; guessed from the file name when `None`
    pub delimiter: Option<u8>,
    /// Treat the first line as data instead of headers
    pub no_headers: bool,
    /// Only keep these columns
    pub usecols: Option<Vec<String>>,
    /// Columns holding separated lists, mapped to their separator
    pub list_columns: HashMap<String, String>,
    /// Column to use as the index
    pub index_col: Option<String>,
}

impl ParseOptions {
    /// Options with an explicit delimiter
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            delimiter: Some(delimiter),
            ..Self::default()
        }
    }
}

/// Guess the delimiter from a file name (`.gz` is ignored)
pub fn guess_delimiter(name: &str) -> u8 {
    let name = name.strip_suffix(".gz").unwrap_or(name);
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("tsv") | Some("txt") | Some("tab") => b'\t',
        _ => b',',
    }
}

/// Parse a delimited file into a Table; gzipped files are decompressed
pub fn parse_delimited<P: AsRef<Path>>(path: P, options: &ParseOptions) -> Result<Table> {
    let path = path.as_ref();
    parse_delimited_reader(open_local(path)?, path, options)
}

/// Parse delimited content from any reader
pub fn parse_delimited_reader<R: Read>(
    reader: R,
    source: &Path,
    options: &ParseOptions,
) -> Result<Table> {
    let delimiter = options
        .delimiter
        .unwrap_or_else(|| guess_delimiter(&source.to_string_lossy()));

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(!options.no_headers)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers().map_err(|e| Error::Csv {
        path: source.to_path_buf(),
        source: e,
    })?;

    let header_names: Vec<String> = if options.no_headers {
        (0..headers.len()).map(|i| i.to_string()).collect()
    } else {
        headers.iter().map(|h| h.trim().to_string()).collect()
    };

    if header_names.is_empty() {
        return Err(Error::TableParse {
            path: source.to_path_buf(),
            message: "no columns found".to_string(),
        });
    }

    // Positions of the columns to keep
    let keep: Vec<usize> = match &options.usecols {
        Some(usecols) => {
            let missing: Vec<String> = usecols
                .iter()
                .filter(|c| !header_names.contains(c))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(Error::MissingColumns {
                    table: source.display().to_string(),
                    missing,
                });
            }
            (0..header_names.len())
                .filter(|&i| usecols.contains(&header_names[i]))
                .collect()
        }
        None => (0..header_names.len()).collect(),
    };

    let columns: Vec<Column> = keep
        .iter()
        .enumerate()
        .map(|(i, &p)| Column::new(header_names[p].clone(), i))
        .collect();

    let list_seps: Vec<Option<&str>> = columns
        .iter()
        .map(|c| options.list_columns.get(&c.name).map(String::as_str))
        .collect();

    let mut rows = Vec::new();
    for (row_idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| Error::Csv {
            path: source.to_path_buf(),
            source: e,
        })?;

        if record.len() > header_names.len() {
            warn!(
                row = row_idx + 1,
                path = %source.display(),
                "row has more cells than columns, truncating"
            );
        }

        // Short rows are padded with empty cells
        let cells: Vec<Value> = keep
            .iter()
            .zip(&list_seps)
            .map(|(&p, sep)| match (record.get(p), sep) {
                (Some(raw), Some(sep)) => Value::parse_list(raw, sep),
                (Some(raw), None) => Value::parse(raw),
                (None, _) => Value::Empty,
            })
            .collect();

        rows.push(Row::new(Vec::new(), cells));
    }

    let table = Table {
        name: source.display().to_string(),
        index_names: Vec::new(),
        columns,
        rows,
    };
    debug!(
        path = %source.display(),
        rows = table.row_count(),
        columns = table.column_count(),
        "parsed table"
    );

    match &options.index_col {
        Some(index_col) => table.set_index(&[index_col]),
        None => Ok(table),
    }
}

/// Parse delimited text from a string
pub fn parse_delimited_str(content: &str, source_name: &str, options: &ParseOptions) -> Result<Table> {
    parse_delimited_reader(content.as_bytes(), &PathBuf::from(source_name), options)
}

/// Parse CSV from a string (useful for testing)
pub fn parse_csv_str(content: &str, source_name: &str) -> Result<Table> {
    parse_delimited_str(content, source_name, &ParseOptions::with_delimiter(b','))
}

/// Write a table as delimited text; index levels come first
pub fn write_delimited<W: Write>(table: &Table, writer: W, delimiter: u8) -> Result<()> {
    let flat = table.reset_index();
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);

    let to_err = |e: csv::Error| Error::Csv {
        path: PathBuf::from(&table.name),
        source: e,
    };

    csv_writer
        .write_record(flat.columns.iter().map(|c| c.name.as_str()))
        .map_err(to_err)?;
    for row in &flat.rows {
        csv_writer
            .write_record(row.cells.iter().map(|c| c.to_string_value()))
            .map_err(to_err)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write a table as a JSON array of records; index levels come first
pub fn write_json<W: Write>(table: &Table, writer: W) -> Result<()> {
    let flat = table.reset_index();
    let records = flat
        .rows
        .iter()
        .map(|row| {
            flat.columns
                .iter()
                .map(|c| {
                    let cell = row.cells.get(c.index).unwrap_or(&Value::Empty);
                    Ok((c.name.clone(), serde_json::to_value(cell)?))
                })
                .collect::<Result<serde_json::Map<_, _>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    serde_json::to_writer_pretty(writer, &records)?;
    Ok(())
}
