//! Core table types for representing omics data

use crate::error::{Error, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A table of named columns with an optional (multi-)index
///
/// Every row carries one key per index level in `Row::key`. An empty
/// `index_names` means the table is positionally indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Label for the table, usually the source file or database name
    pub name: String,
    /// Names of the index levels
    pub index_names: Vec<String>,
    /// Column definitions
    pub columns: Vec<Column>,
    /// Row data
    pub rows: Vec<Row>,
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column index (0-based)
    pub index: usize,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

/// A row of data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Index labels, one per index level
    pub key: Vec<Value>,
    /// Cell values for each column
    pub cells: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(key: Vec<Value>, cells: Vec<Value>) -> Self {
        Self { key, cells }
    }

    /// Get a cell value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.cells.get(index)
    }
}

impl Table {
    /// Create a new empty table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index_names: Vec::new(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a positionally indexed table from column names and row cells
    pub fn from_columns(
        name: impl Into<String>,
        column_names: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Self {
        let columns = column_names
            .iter()
            .enumerate()
            .map(|(i, n)| Column::new(*n, i))
            .collect();
        let rows = rows
            .into_iter()
            .map(|mut cells| {
                cells.resize(column_names.len(), Value::Empty);
                Row::new(Vec::new(), cells)
            })
            .collect();

        Self {
            name: name.into(),
            index_names: Vec::new(),
            columns,
            rows,
        }
    }

    /// Build an empty-column table over the given index labels
    pub fn with_index(name: impl Into<String>, index_names: Vec<String>, keys: Vec<Vec<Value>>) -> Self {
        let rows = keys.into_iter().map(|k| Row::new(k, Vec::new())).collect();
        Self {
            name: name.into(),
            index_names,
            columns: Vec::new(),
            rows,
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of the first column with this name
    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// True if `name` is a column (not an index level)
    pub fn has_column(&self, name: &str) -> bool {
        self.column_position(name).is_some()
    }

    /// Position of an index level
    pub fn index_position(&self, name: &str) -> Option<usize> {
        self.index_names.iter().position(|n| n == name)
    }

    /// True if `name` is one of the index levels
    pub fn is_index(&self, name: &str) -> bool {
        self.index_position(name).is_some()
    }

    /// The index name when the table has exactly one index level
    pub fn index_name(&self) -> Option<&str> {
        match self.index_names.as_slice() {
            [single] => Some(single.as_str()),
            _ => None,
        }
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Values of a column, falling back to an index level of that name
    pub fn column_values(&self, name: &str) -> Result<Vec<Value>> {
        if let Some(pos) = self.column_position(name) {
            return Ok(self
                .rows
                .iter()
                .map(|r| r.cells.get(pos).cloned().unwrap_or(Value::Empty))
                .collect());
        }
        if let Some(pos) = self.index_position(name) {
            return Ok(self
                .rows
                .iter()
                .map(|r| r.key.get(pos).cloned().unwrap_or(Value::Empty))
                .collect());
        }
        Err(self.missing(vec![name.to_string()]))
    }

    /// Key tuples built from several columns or index levels
    pub fn key_tuples(&self, names: &[String]) -> Result<Vec<Vec<Value>>> {
        let mut tuples: Vec<Vec<Value>> = vec![Vec::with_capacity(names.len()); self.rows.len()];
        for name in names {
            for (tuple, value) in tuples.iter_mut().zip(self.column_values(name)?) {
                tuple.push(value);
            }
        }
        Ok(tuples)
    }

    /// Report names that are neither columns nor index levels
    pub fn check_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let missing: Vec<String> = names
            .iter()
            .map(|n| n.as_ref())
            .filter(|n| !self.has_column(n) && !self.is_index(n))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(self.missing(missing))
        }
    }

    /// Keep only the named columns, in the given order; index is preserved
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let positions: Vec<usize> = names
            .iter()
            .map(|n| {
                self.column_position(n.as_ref())
                    .ok_or_else(|| self.missing(vec![n.as_ref().to_string()]))
            })
            .collect::<Result<_>>()?;

        let columns = names
            .iter()
            .enumerate()
            .map(|(i, n)| Column::new(n.as_ref(), i))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|r| {
                let cells = positions
                    .iter()
                    .map(|&p| r.cells.get(p).cloned().unwrap_or(Value::Empty))
                    .collect();
                Row::new(r.key.clone(), cells)
            })
            .collect();

        Ok(Table {
            name: self.name.clone(),
            index_names: self.index_names.clone(),
            columns,
            rows,
        })
    }

    /// Keep rows for which the predicate holds
    pub fn filter_rows<F: FnMut(&Row) -> bool>(&mut self, mut pred: F) {
        self.rows.retain(|r| pred(r));
    }

    /// Move the named columns into the index, replacing the current index
    ///
    /// A current index level is kept as a column unless it is one of `names`.
    pub fn set_index<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        if names == self.index_names {
            return Ok(self.clone());
        }
        let flat = self.reset_index();
        flat.check_columns(&names)?;

        let key_positions: Vec<usize> = names
            .iter()
            .filter_map(|n| flat.column_position(n))
            .collect();
        let keep: Vec<usize> = (0..flat.columns.len())
            .filter(|p| !key_positions.contains(p))
            .collect();

        let columns = keep
            .iter()
            .enumerate()
            .map(|(i, &p)| Column::new(flat.columns[p].name.clone(), i))
            .collect();
        let rows = flat
            .rows
            .into_iter()
            .map(|r| {
                let cell = |p: usize| r.cells.get(p).cloned().unwrap_or(Value::Empty);
                let key = key_positions.iter().map(|&p| cell(p)).collect();
                let cells = keep.iter().map(|&p| cell(p)).collect();
                Row::new(key, cells)
            })
            .collect();

        Ok(Table {
            name: flat.name,
            index_names: names,
            columns,
            rows,
        })
    }

    /// Turn index levels into leading columns
    ///
    /// Levels that already exist as a column are dropped instead of duplicated.
    pub fn reset_index(&self) -> Table {
        let lifted: Vec<usize> = (0..self.index_names.len())
            .filter(|&i| !self.has_column(&self.index_names[i]))
            .collect();

        let mut columns: Vec<Column> = lifted
            .iter()
            .enumerate()
            .map(|(i, &l)| Column::new(self.index_names[l].clone(), i))
            .collect();
        let offset = columns.len();
        columns.extend(
            self.columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.index + offset)),
        );

        let rows = self
            .rows
            .iter()
            .map(|r| {
                let mut cells: Vec<Value> = lifted
                    .iter()
                    .map(|&l| r.key.get(l).cloned().unwrap_or(Value::Empty))
                    .collect();
                cells.extend(r.cells.iter().cloned());
                Row::new(Vec::new(), cells)
            })
            .collect();

        Table {
            name: self.name.clone(),
            index_names: Vec::new(),
            columns,
            rows,
        }
    }

    /// Rename columns and index levels
    pub fn rename_columns(&mut self, mapping: &HashMap<String, String>) {
        for col in &mut self.columns {
            if let Some(new_name) = mapping.get(&col.name) {
                col.name = new_name.clone();
            }
        }
        for name in &mut self.index_names {
            if let Some(new_name) = mapping.get(name) {
                *name = new_name.clone();
            }
        }
    }

    /// One row per element of list values in `name`
    pub fn explode(&self, name: &str) -> Result<Table> {
        let pos = self
            .column_position(name)
            .ok_or_else(|| self.missing(vec![name.to_string()]))?;

        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            match row.cells.get(pos) {
                Some(Value::List(items)) if !items.is_empty() => {
                    for item in items {
                        let mut cells = row.cells.clone();
                        cells[pos] = item.clone();
                        rows.push(Row::new(row.key.clone(), cells));
                    }
                }
                Some(Value::List(_)) => {
                    let mut cells = row.cells.clone();
                    cells[pos] = Value::Empty;
                    rows.push(Row::new(row.key.clone(), cells));
                }
                _ => rows.push(row.clone()),
            }
        }

        Ok(Table {
            rows,
            ..self.clone_empty()
        })
    }

    /// Drop rows where any of the named columns or index levels is empty
    pub fn drop_empty<S: AsRef<str>>(&self, names: &[S]) -> Result<Table> {
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        let tuples = self.key_tuples(&names)?;
        let rows = self
            .rows
            .iter()
            .zip(tuples)
            .filter(|(_, t)| t.iter().all(|v| !v.is_empty()))
            .map(|(r, _)| r.clone())
            .collect();
        Ok(Table {
            rows,
            ..self.clone_empty()
        })
    }

    /// Replace a column's values, or append it if absent
    pub fn assign(&mut self, name: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(Error::LengthMismatch {
                column: name.to_string(),
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        match self.column_position(name) {
            Some(pos) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    if row.cells.len() <= pos {
                        row.cells.resize(pos + 1, Value::Empty);
                    }
                    row.cells[pos] = value;
                }
            }
            None => {
                let index = self.columns.len();
                self.columns.push(Column::new(name, index));
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.cells.resize(index, Value::Empty);
                    row.cells.push(value);
                }
            }
        }
        Ok(())
    }

    /// Remove columns by name; unknown names are ignored
    pub fn drop_columns<S: AsRef<str>>(&mut self, names: &[S]) {
        let drop: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        let keep: Vec<usize> = self
            .columns
            .iter()
            .filter(|c| !drop.contains(c.name.as_str()))
            .map(|c| c.index)
            .collect();
        self.retain_positions(&keep);
    }

    /// Keep only the columns at the given positions, renumbering them
    pub(crate) fn retain_positions(&mut self, keep: &[usize]) {
        self.columns = keep
            .iter()
            .enumerate()
            .map(|(i, &p)| Column::new(self.columns[p].name.clone(), i))
            .collect();
        for row in &mut self.rows {
            row.cells = keep
                .iter()
                .map(|&p| row.cells.get(p).cloned().unwrap_or(Value::Empty))
                .collect();
        }
    }

    /// Same metadata, no rows
    pub(crate) fn clone_empty(&self) -> Table {
        Table {
            name: self.name.clone(),
            index_names: self.index_names.clone(),
            columns: self.columns.clone(),
            rows: Vec::new(),
        }
    }

    pub(crate) fn missing(&self, missing: Vec<String>) -> Error {
        Error::MissingColumns {
            table: self.name.clone(),
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_csv_str;

    fn genes() -> Table {
        parse_csv_str(
            "gene_id,gene_name,length\nENSG1,TP53,100\nENSG2,BRCA1,\nENSG3,,300\n",
            "genes.csv",
        )
        .unwrap()
    }

    #[test]
    fn test_set_and_reset_index() {
        let table = genes().set_index(&["gene_id"]).unwrap();
        assert_eq!(table.index_name(), Some("gene_id"));
        assert_eq!(table.column_names(), vec!["gene_name", "length"]);
        assert_eq!(table.rows[1].key, vec![Value::from("ENSG2")]);

        let flat = table.reset_index();
        assert!(flat.index_names.is_empty());
        assert_eq!(flat.column_names(), vec!["gene_id", "gene_name", "length"]);
    }

    #[test]
    fn test_set_index_swaps_levels() {
        let table = genes()
            .set_index(&["gene_id"])
            .unwrap()
            .set_index(&["gene_name"])
            .unwrap();
        assert_eq!(table.index_name(), Some("gene_name"));
        assert_eq!(table.column_names(), vec!["gene_id", "length"]);
    }

    #[test]
    fn test_column_values_reads_index() {
        let table = genes().set_index(&["gene_id"]).unwrap();
        let ids = table.column_values("gene_id").unwrap();
        assert_eq!(ids[2], Value::from("ENSG3"));
        assert!(table.column_values("nope").is_err());
    }

    #[test]
    fn test_explode_and_drop_empty() {
        let mut table = Table::from_columns(
            "t",
            &["id", "alias"],
            vec![
                vec![Value::Integer(1), Value::from(vec!["a", "b"])],
                vec![Value::Integer(2), Value::Empty],
            ],
        );
        table = table.explode("alias").unwrap();
        assert_eq!(table.row_count(), 3);
        let cleaned = table.drop_empty(&["alias"]).unwrap();
        assert_eq!(cleaned.row_count(), 2);
    }

    #[test]
    fn test_assign_and_drop() {
        let mut table = genes();
        table
            .assign("score", vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
            .unwrap();
        assert_eq!(table.column_count(), 4);
        assert!(table.assign("bad", vec![Value::Empty]).is_err());

        table.drop_columns(&["gene_name", "missing"]);
        assert_eq!(table.column_names(), vec!["gene_id", "length", "score"]);
        assert_eq!(table.rows[2].cells[2], Value::Integer(3));
    }

    #[test]
    fn test_rename_columns_renames_index() {
        let mut table = genes().set_index(&["gene_id"]).unwrap();
        let mapping = HashMap::from([
            ("gene_id".to_string(), "ensembl_id".to_string()),
            ("length".to_string(), "len".to_string()),
        ]);
        table.rename_columns(&mapping);
        assert_eq!(table.index_name(), Some("ensembl_id"));
        assert!(table.has_column("len"));
    }

    #[test]
    fn test_short_rows_read_as_empty() {
        let mut table = Table::from_columns("t", &["id", "alias", "score"], Vec::new());
        table.rows = vec![
            Row::new(Vec::new(), vec![Value::Integer(1)]),
            Row::new(
                Vec::new(),
                vec![Value::Integer(2), Value::from(vec!["a", "b"]), Value::Integer(5)],
            ),
        ];

        let indexed = table.set_index(&["id"]).unwrap();
        assert_eq!(indexed.rows[0].cells, vec![Value::Empty, Value::Empty]);
        assert_eq!(indexed.explode("alias").unwrap().row_count(), 3);
        assert_eq!(table.explode("alias").unwrap().row_count(), 3);

        table
            .assign("score", vec![Value::Integer(7), Value::Integer(8)])
            .unwrap();
        assert_eq!(
            table.rows[0].cells,
            vec![Value::Integer(1), Value::Empty, Value::Integer(7)]
        );
    }
}
