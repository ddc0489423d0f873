//! Expression matrices and multi-omics cohorts

use crate::annotate::{Annotatable, Annotations};
use crate::error::{Error, Result};
use crate::parser::{parse_delimited, ParseOptions};
use crate::table::{Column, Row, Table};
use crate::transforms::Aggregator;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

/// Index name of the sample axis
pub const SAMPLE_INDEX: &str = "sample";

/// How an expression file is laid out
#[derive(Debug, Clone)]
pub struct ExpressionOptions {
    /// File has genes as rows and samples as columns
    pub transposed: bool,
    /// `|`-separated prefixes; only columns starting with one of them are kept
    pub columns: Option<String>,
    /// Name of the gene index, e.g. `gene_name`
    pub gene_index_by: String,
    /// Field delimiter; guessed from the file name when `None`
    pub delimiter: Option<u8>,
}

impl Default for ExpressionOptions {
    fn default() -> Self {
        Self {
            transposed: false,
            columns: None,
            gene_index_by: "gene_name".to_string(),
            delimiter: None,
        }
    }
}

/// Expression values of one omic, samples by genes
#[derive(Debug, Clone)]
pub struct ExpressionData {
    name: String,
    cohort_name: String,
    gene_index: String,
    /// Samples as rows (indexed by [`SAMPLE_INDEX`]), genes as columns
    pub expressions: Table,
    annotations: Annotations,
}

impl ExpressionData {
    /// Load an expression file for the omic `name`
    pub fn load<P: AsRef<Path>>(
        name: impl Into<String>,
        cohort_name: impl Into<String>,
        path: P,
        options: &ExpressionOptions,
    ) -> Result<Self> {
        let parse = ParseOptions {
            delimiter: options.delimiter,
            ..ParseOptions::default()
        };
        let table = parse_delimited(path, &parse)?;
        Self::from_table(name, cohort_name, table, options)
    }

    /// Build from an already parsed table
    ///
    /// The first kept column is the gene column when `transposed`, otherwise
    /// the sample column.
    pub fn from_table(
        name: impl Into<String>,
        cohort_name: impl Into<String>,
        table: Table,
        options: &ExpressionOptions,
    ) -> Result<Self> {
        let name = name.into();
        let table = match &options.columns {
            Some(patterns) => filter_columns(&table, patterns)?,
            None => table,
        };
        let first = table
            .columns
            .first()
            .map(|c| c.name.clone())
            .ok_or_else(|| Error::TableParse {
                path: table.name.clone().into(),
                message: "expression table has no columns".to_string(),
            })?;

        let expressions = if options.transposed {
            transpose(&table.set_index(&[first])?)
        } else {
            let mut samples = table.set_index(&[first])?;
            samples.index_names = vec![SAMPLE_INDEX.to_string()];
            samples
        };

        info!(
            omic = %name,
            samples = expressions.row_count(),
            genes = expressions.column_count(),
            "loaded expressions"
        );

        Ok(Self {
            name,
            cohort_name: cohort_name.into(),
            gene_index: options.gene_index_by.clone(),
            expressions,
            annotations: Annotations::default(),
        })
    }

    /// Cohort the samples belong to
    pub fn cohort_name(&self) -> &str {
        &self.cohort_name
    }

    /// Gene names, in column order
    pub fn get_genes_list(&self) -> Vec<Value> {
        self.expressions
            .columns
            .iter()
            .map(|c| Value::parse(&c.name))
            .collect()
    }

    /// Sample identifiers, in row order
    pub fn get_samples_list(&self) -> Vec<Value> {
        self.expressions
            .rows
            .iter()
            .filter_map(|r| r.key.first().cloned())
            .collect()
    }
}

impl Annotatable for ExpressionData {
    fn name(&self) -> &str {
        &self.name
    }

    fn gene_index(&self) -> &str {
        &self.gene_index
    }

    fn genes_list(&self) -> Vec<Value> {
        self.get_genes_list()
    }

    fn annotation_state(&self) -> &Annotations {
        &self.annotations
    }

    fn annotation_state_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }
}

/// A bare list of genes to annotate, without expression values
#[derive(Debug, Clone)]
pub struct GeneList {
    name: String,
    gene_index: String,
    genes: Vec<Value>,
    annotations: Annotations,
}

impl GeneList {
    /// Duplicate and empty genes are dropped, order is kept
    pub fn new(name: impl Into<String>, gene_index: impl Into<String>, genes: Vec<Value>) -> Self {
        let mut seen = HashSet::new();
        let genes = genes
            .into_iter()
            .filter(|g| !g.is_empty() && seen.insert(g.clone()))
            .collect();
        Self {
            name: name.into(),
            gene_index: gene_index.into(),
            genes,
            annotations: Annotations::default(),
        }
    }
}

impl Annotatable for GeneList {
    fn name(&self) -> &str {
        &self.name
    }

    fn gene_index(&self) -> &str {
        &self.gene_index
    }

    fn genes_list(&self) -> Vec<Value> {
        self.genes.clone()
    }

    fn annotation_state(&self) -> &Annotations {
        &self.annotations
    }

    fn annotation_state_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }
}

/// Keep columns whose name starts with any of the `|`-separated prefixes
fn filter_columns(table: &Table, patterns: &str) -> Result<Table> {
    let patterns: Vec<&str> = patterns.split('|').filter(|p| !p.is_empty()).collect();
    let keep: Vec<&str> = table
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .filter(|n| patterns.iter().any(|p| n.starts_with(p)))
        .collect();
    table.select(&keep)
}

/// Turn a genes-by-samples table into samples by genes
///
/// Genes listed more than once are averaged.
fn transpose(genes: &Table) -> Table {
    let mut gene_order: Vec<String> = Vec::new();
    let mut gene_rows: HashMap<String, Vec<usize>> = HashMap::new();
    for (pos, row) in genes.rows.iter().enumerate() {
        let Some(gene) = row.key.first().filter(|k| !k.is_empty()) else {
            continue;
        };
        let gene = gene.to_string_value();
        gene_rows
            .entry(gene.clone())
            .or_insert_with(|| {
                gene_order.push(gene);
                Vec::new()
            })
            .push(pos);
    }

    let duplicated = gene_rows.values().filter(|r| r.len() > 1).count();
    if duplicated > 0 {
        warn!(duplicated, "averaging duplicated genes");
    }

    let rows = genes
        .columns
        .iter()
        .map(|sample| {
            let cells = gene_order
                .iter()
                .map(|g| {
                    let values: Vec<Value> = gene_rows[g]
                        .iter()
                        .map(|&r| {
                            genes.rows[r]
                                .cells
                                .get(sample.index)
                                .cloned()
                                .unwrap_or(Value::Empty)
                        })
                        .collect();
                    match values.as_slice() {
                        [single] => single.clone(),
                        _ => Aggregator::Mean.apply(&values),
                    }
                })
                .collect();
            Row::new(vec![Value::parse(&sample.name)], cells)
        })
        .collect();

    Table {
        name: genes.name.clone(),
        index_names: vec![SAMPLE_INDEX.to_string()],
        columns: gene_order
            .into_iter()
            .enumerate()
            .map(|(i, g)| Column::new(g, i))
            .collect(),
        rows,
    }
}

/// Several omics measured over one cohort
#[derive(Debug, Clone, Default)]
pub struct MultiOmics {
    pub cohort_name: String,
    omics: BTreeMap<String, ExpressionData>,
    clinical: Option<Table>,
    samples: Vec<Value>,
}

impl MultiOmics {
    pub fn new(cohort_name: impl Into<String>) -> Self {
        Self {
            cohort_name: cohort_name.into(),
            ..Self::default()
        }
    }

    /// Add (or replace) an omic by its name
    pub fn add_omic(&mut self, omic: ExpressionData) {
        if omic.cohort_name() != self.cohort_name {
            warn!(
                omic = omic.name(),
                cohort = omic.cohort_name(),
                expected = %self.cohort_name,
                "omic belongs to another cohort"
            );
        }
        info!(omic = omic.name(), "added omic");
        self.omics.insert(omic.name().to_string(), omic);
    }

    /// Load clinical data indexed by `index_col`
    pub fn add_clinical_data<P: AsRef<Path>>(&mut self, path: P, index_col: &str) -> Result<()> {
        let options = ParseOptions {
            index_col: Some(index_col.to_string()),
            ..ParseOptions::default()
        };
        let clinical = parse_delimited(path, &options)?;
        info!(patients = clinical.row_count(), "added clinical data");
        self.clinical = Some(clinical);
        Ok(())
    }

    /// Names of the added omics
    pub fn get_omics_list(&self) -> Vec<&str> {
        self.omics.keys().map(String::as_str).collect()
    }

    /// Expression table of one omic
    pub fn data(&self, omic: &str) -> Option<&Table> {
        self.omics.get(omic).map(|o| &o.expressions)
    }

    pub fn get(&self, omic: &str) -> Option<&ExpressionData> {
        self.omics.get(omic)
    }

    pub fn get_mut(&mut self, omic: &str) -> Option<&mut ExpressionData> {
        self.omics.get_mut(omic)
    }

    /// Clinical table, if loaded
    pub fn clinical(&self) -> Option<&Table> {
        self.clinical.as_ref()
    }

    /// Collect the union of samples over every omic and the clinical table,
    /// in first-seen order
    pub fn build_samples(&mut self) -> &[Value] {
        let mut seen = HashSet::new();
        let clinical = self
            .clinical
            .iter()
            .flat_map(|t| t.rows.iter().filter_map(|r| r.key.first().cloned()));
        self.samples = self
            .omics
            .values()
            .flat_map(|o| o.get_samples_list())
            .chain(clinical)
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        &self.samples
    }

    /// Samples collected by the last [`MultiOmics::build_samples`]
    pub fn samples(&self) -> &[Value] {
        &self.samples
    }
}
