//! Annotation engine
//!
//! An [`Annotatable`] omic keeps an annotation table indexed by its genes.
//! Database tables are grouped per key, aligned to that index (exactly, by
//! shared list elements, or by fuzzy string similarity) and left-joined onto
//! it. Columns that already exist are reconciled cell by cell with
//! [`merge_concat`] instead of being duplicated.

use crate::database::{AnnotationProvider, DiseaseSource, ExpressionSource, On, SequenceSource};
use crate::error::{Error, Result};
use crate::table::Table;
use crate::transforms::df::DEFAULT_FUZZY_CUTOFF;
use crate::transforms::{fuzzy_key_map, match_iterable_keys, merge_concat, Aggregator};
use crate::value::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Column receiving sequences
pub const SEQUENCE_COL: &str = "sequence";
/// Column receiving disease associations
pub const DISEASE_ASSOCIATIONS_COL: &str = "disease_associations";

/// How database values are aggregated and aligned during annotation
#[derive(Debug, Clone)]
pub struct AnnotateOptions {
    /// Aggregation for keys with several database rows
    pub agg: Aggregator,
    /// Per-column aggregation overrides
    pub agg_for: HashMap<String, Aggregator>,
    /// Align string keys by similarity
    pub fuzzy_match: bool,
    /// Align keys that share any element of list values
    pub list_match: bool,
    /// Minimum similarity for fuzzy alignment
    pub fuzzy_cutoff: f64,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            agg: Aggregator::Unique,
            agg_for: HashMap::new(),
            fuzzy_match: false,
            list_match: false,
            fuzzy_cutoff: DEFAULT_FUZZY_CUTOFF,
        }
    }
}

/// Annotation tables owned by an omic
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    pub annotations: Option<Table>,
    pub annotation_expressions: Option<Table>,
}

/// Left-join grouped database values onto `left` by the `on` keys
#[instrument(skip(left, provider, on, columns, options), fields(on = %on))]
pub fn annotate_table<P: AnnotationProvider + ?Sized>(
    left: &Table,
    provider: &P,
    on: &On,
    columns: &[String],
    options: &AnnotateOptions,
) -> Result<Table> {
    let left_keys = left.key_tuples(on.names())?;

    // Fuzzy and list alignment must see every database key
    let exact = !options.fuzzy_match && !options.list_match;
    let right = provider.grouped_annotations(
        on,
        columns,
        options.agg,
        &options.agg_for,
        exact.then_some(left_keys.as_slice()),
    )?;

    let matches = align_keys(&left_keys, &right, on, options)?;
    let matched = matches.iter().filter(|m| !m.is_empty()).count();
    debug!(rows = left.row_count(), matched, "aligned keys");

    let mut merged = left.clone();
    let mut reconciled = Vec::new();
    for (pos, column) in right.columns.iter().enumerate() {
        let new_values: Vec<Value> = matches
            .iter()
            .map(|rows| {
                rows.iter()
                    .filter_map(|&r| right.rows[r].cells.get(pos))
                    .fold(Value::Empty, |acc, v| merge_concat(&acc, v))
            })
            .collect();

        let values = if merged.has_column(&column.name) {
            reconciled.push(column.name.clone());
            merged
                .column_values(&column.name)?
                .iter()
                .zip(&new_values)
                .map(|(old, new)| merge_concat(old, new))
                .collect()
        } else {
            new_values
        };
        merged.assign(&column.name, values)?;
    }

    if !reconciled.is_empty() {
        info!(columns = ?reconciled, "merging overlapping columns");
    }
    Ok(merged)
}

/// For every left key, the right rows aligned with it
fn align_keys(
    left_keys: &[Vec<Value>],
    right: &Table,
    on: &On,
    options: &AnnotateOptions,
) -> Result<Vec<Vec<usize>>> {
    let right_keys: Vec<&Vec<Value>> = right.rows.iter().map(|r| &r.key).collect();

    if options.fuzzy_match || options.list_match {
        if on.single().is_none() {
            return Err(Error::Unsupported(format!(
                "fuzzy or list matching needs a single key column, got '{}'",
                on
            )));
        }
        let left: Vec<Value> = left_keys.iter().map(|k| k[0].clone()).collect();
        let right: Vec<Value> = right_keys.iter().map(|k| k[0].clone()).collect();

        if options.fuzzy_match {
            let landed = fuzzy_key_map(&left, &right, options.fuzzy_cutoff);
            let mut by_key: HashMap<&Value, Vec<usize>> = HashMap::new();
            for (right_pos, left_pos) in landed.into_iter().enumerate() {
                if let Some(left_pos) = left_pos {
                    by_key.entry(&left[left_pos]).or_default().push(right_pos);
                }
            }
            return Ok(left
                .iter()
                .map(|k| by_key.get(k).cloned().unwrap_or_default())
                .collect());
        }

        return Ok(match_iterable_keys(&left, &right)
            .into_iter()
            .map(|m| m.into_iter().collect())
            .collect());
    }

    let lookup: HashMap<&Vec<Value>, usize> = right_keys
        .iter()
        .enumerate()
        .map(|(pos, k)| (*k, pos))
        .collect();
    Ok(left_keys
        .iter()
        .map(|k| lookup.get(k).map(|&pos| vec![pos]).unwrap_or_default())
        .collect())
}

/// Look up each key tuple in a key map
fn map_keys(keys: &[Vec<Value>], map: &HashMap<Vec<Value>, Value>) -> Vec<Value> {
    keys.iter()
        .map(|k| map.get(k).cloned().unwrap_or(Value::Empty))
        .collect()
}

/// An omic whose genes can be annotated with external databases
pub trait Annotatable {
    /// Name of the omic, e.g. `MessengerRNA`
    fn name(&self) -> &str;

    /// Name of the gene index
    fn gene_index(&self) -> &str;

    /// Genes used to initialize the annotation index
    fn genes_list(&self) -> Vec<Value>;

    fn annotation_state(&self) -> &Annotations;

    fn annotation_state_mut(&mut self) -> &mut Annotations;

    /// Create an empty annotation table over `index`, or the genes list
    fn init_annotations(&mut self, index: Option<Vec<Value>>) {
        if self
            .annotation_state()
            .annotations
            .as_ref()
            .is_some_and(|t| !t.is_empty())
        {
            warn!(omic = self.name(), "annotations already exist, not reinitializing");
            return;
        }

        let keys = index.unwrap_or_else(|| self.genes_list());
        let table = Table::with_index(
            self.name(),
            vec![self.gene_index().to_string()],
            keys.into_iter().map(|k| vec![k]).collect(),
        );
        self.annotation_state_mut().annotations = Some(table);
    }

    /// The annotation table
    fn get_annotations(&self) -> Result<&Table> {
        self.annotation_state()
            .annotations
            .as_ref()
            .ok_or_else(|| Error::NotInitialized {
                name: self.name().to_string(),
                step: "init_annotations",
            })
    }

    /// Expressions aligned with the annotation index
    fn get_annotation_expressions(&self) -> Result<&Table> {
        self.annotation_state()
            .annotation_expressions
            .as_ref()
            .ok_or_else(|| Error::NotInitialized {
                name: self.name().to_string(),
                step: "annotate_expressions",
            })
    }

    /// Left-join `columns` of `provider`, grouped by `on`, onto the annotations
    fn annotate_attributes<P>(
        &mut self,
        provider: &P,
        on: impl Into<On>,
        columns: &[&str],
        options: &AnnotateOptions,
    ) -> Result<()>
    where
        P: AnnotationProvider + ?Sized,
        Self: Sized,
    {
        let on = on.into();
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let merged = annotate_table(self.get_annotations()?, provider, &on, &columns, options)?;
        self.annotation_state_mut().annotations = Some(merged);
        Ok(())
    }

    /// Assign one sequence per key to the `sequence` column
    fn annotate_sequences<S>(
        &mut self,
        source: &S,
        on: impl Into<On>,
        agg: Aggregator,
        omic: Option<&str>,
    ) -> Result<()>
    where
        S: SequenceSource + ?Sized,
        Self: Sized,
    {
        let on = on.into();
        let omic = omic.unwrap_or(self.name()).to_string();
        let sequences = source.get_sequences(&on, &omic, agg)?;

        let annotations = self.get_annotations()?;
        let values = map_keys(&annotations.key_tuples(on.names())?, &sequences);
        let mut annotations = annotations.clone();
        annotations.assign(SEQUENCE_COL, values)?;
        self.annotation_state_mut().annotations = Some(annotations);
        Ok(())
    }

    /// Join per-gene expressions onto the annotation index
    fn annotate_expressions<E>(&mut self, source: &E, index: &str) -> Result<()>
    where
        E: ExpressionSource + ?Sized,
        Self: Sized,
    {
        let annotations = self.get_annotations()?;
        if annotations.index_name() != Some(index) {
            return Err(Error::IndexMismatch {
                expected: index.to_string(),
                found: annotations.index_names.clone(),
            });
        }

        let expressions = source.get_expressions(index)?;
        let keys: Vec<Vec<Value>> = annotations.rows.iter().map(|r| r.key.clone()).collect();
        let lookup: HashMap<&Vec<Value>, usize> = expressions
            .rows
            .iter()
            .enumerate()
            .map(|(pos, r)| (&r.key, pos))
            .collect();

        let mut joined = Table::with_index(
            self.name(),
            annotations.index_names.clone(),
            keys.clone(),
        );
        for (pos, column) in expressions.columns.iter().enumerate() {
            let values = keys
                .iter()
                .map(|k| {
                    lookup
                        .get(k)
                        .and_then(|&r| expressions.rows[r].cells.get(pos).cloned())
                        .unwrap_or(Value::Empty)
                })
                .collect();
            joined.assign(&column.name, values)?;
        }

        self.annotation_state_mut().annotation_expressions = Some(joined);
        Ok(())
    }

    /// Interaction networks are built by a graph library, not here
    fn annotate_interactions(&mut self, _index: &str) -> Result<()> {
        Err(Error::Unsupported(
            "interaction networks are built from the database edge lists by a graph library"
                .to_string(),
        ))
    }

    /// Assign the list of associated diseases to `disease_associations`
    fn annotate_diseases<D>(&mut self, source: &D, on: impl Into<On>) -> Result<()>
    where
        D: DiseaseSource + ?Sized,
        Self: Sized,
    {
        let on = on.into();
        let assocs = source.get_disease_assocs(&on)?;

        let annotations = self.get_annotations()?;
        let values = map_keys(&annotations.key_tuples(on.names())?, &assocs);
        let mut annotations = annotations.clone();
        annotations.assign(DISEASE_ASSOCIATIONS_COL, values)?;
        self.annotation_state_mut().annotations = Some(annotations);
        Ok(())
    }

    /// Re-index the annotations by `new_index`
    ///
    /// Empty values of `new_index` are filled with the current index label.
    fn set_index(&mut self, new_index: &str) -> Result<()> {
        let mut annotations = self.get_annotations()?.clone();
        if annotations.index_names.len() == 1 && annotations.has_column(new_index) {
            let filled: Vec<Value> = annotations
                .column_values(new_index)?
                .into_iter()
                .zip(&annotations.rows)
                .map(|(v, r)| if v.is_empty() { r.key[0].clone() } else { v })
                .collect();
            annotations.assign(new_index, filled)?;
        }
        let reindexed = annotations.set_index(&[new_index])?;
        self.annotation_state_mut().annotations = Some(reindexed);
        Ok(())
    }

    /// Lookup from `from_index` values to `to_index` values
    fn get_rename_dict(&self, from_index: &str, to_index: &str) -> Result<HashMap<Value, Value>> {
        let annotations = self.get_annotations()?;
        let from = annotations.column_values(from_index)?;
        let to = annotations.column_values(to_index)?;
        Ok(from
            .into_iter()
            .zip(to)
            .filter(|(_, t)| !t.is_empty())
            .collect())
    }
}
