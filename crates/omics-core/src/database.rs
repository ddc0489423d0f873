//! Database base: loading external resources into a table and serving
//! grouped annotations from it

use crate::error::{Error, Result};
use crate::parser::{parse_delimited_reader, ParseOptions};
use crate::resources::{discover_file_resources, expand_home, load_file_resources, FileResources};
use crate::table::Table;
use crate::transforms::{
    drop_duplicate_columns, get_multi_aggregators, groupby_agg, has_iterables, Aggregator,
};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Number of leading values inspected when checking for list values
const ITERABLE_SAMPLE: usize = 10;

/// Databases known to the upstream annotation pipelines
pub const DEFAULT_LIBRARIES: &[&str] = &[
    "10KImmunomes",
    "BioGRID",
    "CCLE",
    "DisGeNET",
    "ENSEMBL",
    "GENCODE",
    "GeneMania",
    "GeneOntology",
    "GlobalBiobankEngine",
    "GTEx",
    "HMDD_miRNAdisease",
    "HPRD_PPI",
    "HUGO_Gene_names",
    "HumanBodyMapLincRNAs",
    "IntAct",
    "lncBase",
    "LNCipedia",
    "LncReg",
    "lncRInter",
    "lncrna2target",
    "lncRNA_data_repository",
    "lncrnadisease",
    "lncRNome",
    "mirbase",
    "miRTarBase",
    "NHLBI_Exome_Sequencing_Project",
    "NONCODE",
    "NPInter",
    "PIRD",
    "RegNetwork",
    "RISE_RNA_Interactions",
    "RNAcentral",
    "StarBase_v2.0",
    "STRING_PPI",
    "TargetScan",
];

/// Key lookup produced by sequence and disease sources
pub type KeyMap = HashMap<Vec<Value>, Value>;

/// One or more key columns used to align tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct On(Vec<String>);

impl On {
    /// Key column names
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// The column name when there is exactly one key
    pub fn single(&self) -> Option<&str> {
        match self.0.as_slice() {
            [name] => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for On {
    fn from(name: &str) -> Self {
        On(vec![name.to_string()])
    }
}

impl From<String> for On {
    fn from(name: String) -> Self {
        On(vec![name])
    }
}

impl From<Vec<&str>> for On {
    fn from(names: Vec<&str>) -> Self {
        On(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for On {
    fn from(names: Vec<String>) -> Self {
        On(names)
    }
}

impl std::fmt::Display for On {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Turns a database's file resources into a table
pub trait Loader {
    /// Name of the database this loader builds
    fn name(&self) -> &str;

    /// Build the database table from resolved file resources
    fn load_dataframe(&self, resources: &FileResources, options: &DatabaseOptions) -> Result<Table>;
}

/// Options shared by every database
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptions {
    /// Column to index the table by
    pub index_col: Option<String>,
    /// Keep only rows whose `index_col` value is one of these
    pub keys: Option<Vec<Value>>,
    /// Load only these columns
    pub usecols: Option<Vec<String>>,
    /// Rename columns (and index levels) after loading
    pub col_rename: HashMap<String, String>,
    /// Write decompressed resources to disk
    pub write_uncompressed: bool,
}

/// Loader reading one named delimited resource
#[derive(Debug, Clone)]
pub struct DelimitedLoader {
    name: String,
    resource: String,
    parse: ParseOptions,
}

impl DelimitedLoader {
    /// Load `resource` with the default parse options
    pub fn new(name: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            parse: ParseOptions::default(),
        }
    }

    /// Override the parse options
    pub fn with_parse_options(mut self, parse: ParseOptions) -> Self {
        self.parse = parse;
        self
    }
}

impl Loader for DelimitedLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_dataframe(&self, resources: &FileResources, options: &DatabaseOptions) -> Result<Table> {
        // Prefer the decompressed resource when one was registered
        let resource = self.resource.strip_suffix(".gz").unwrap_or(&self.resource);
        let resource = if resources.get(resource).is_some() {
            resource
        } else {
            self.resource.as_str()
        };

        let mut parse = self.parse.clone();
        if options.usecols.is_some() {
            parse.usecols = options.usecols.clone();
        }
        let reader = resources.open(resource)?;
        let mut table = parse_delimited_reader(reader, Path::new(resource), &parse)?;
        table.name = self.name.clone();
        Ok(table)
    }
}

/// An external database loaded into a table
#[derive(Debug, Clone)]
pub struct Database {
    name: String,
    data_path: String,
    file_resources: FileResources,
    options: DatabaseOptions,
    /// The loaded table
    pub data: Table,
}

impl Database {
    /// Load a database from `path` with the given loader
    ///
    /// When `file_resources` is `None` every file under `path` is registered.
    #[instrument(skip(file_resources, loader, options), fields(database = loader.name()))]
    pub fn open(
        path: &str,
        file_resources: Option<&BTreeMap<String, String>>,
        loader: &dyn Loader,
        options: DatabaseOptions,
    ) -> Result<Self> {
        let entries = match file_resources {
            Some(entries) => entries.clone(),
            None => discover_file_resources(expand_home(path))?,
        };
        let file_resources = load_file_resources(path, &entries, options.write_uncompressed)?;

        let mut data = loader.load_dataframe(&file_resources, &options)?;
        if !options.col_rename.is_empty() {
            data.rename_columns(&options.col_rename);
        }
        if let Some(index_col) = &options.index_col {
            data = data.set_index(&[index_col])?;
            if let Some(keys) = &options.keys {
                let keys: HashSet<&Value> = keys.iter().collect();
                data.filter_rows(|r| r.key.first().is_some_and(|k| keys.contains(k)));
            }
        }

        info!(
            rows = data.row_count(),
            columns = data.column_count(),
            "loaded database"
        );

        Ok(Self {
            name: loader.name().to_string(),
            data_path: path.to_string(),
            file_resources,
            options,
            data,
        })
    }

    /// Wrap an already loaded table
    pub fn from_table(name: impl Into<String>, data: Table) -> Self {
        Self {
            name: name.into(),
            data_path: String::new(),
            file_resources: FileResources::new(),
            options: DatabaseOptions::default(),
            data,
        }
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Folder or url the resources were loaded from
    pub fn data_path(&self) -> &str {
        &self.data_path
    }

    /// Resolved file resources
    pub fn file_resources(&self) -> &FileResources {
        &self.file_resources
    }

    /// Options the database was opened with
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Names of databases known upstream
    pub fn list_databases() -> &'static [&'static str] {
        DEFAULT_LIBRARIES
    }

    /// Release in-memory resource buffers
    pub fn close(&mut self) {
        self.file_resources.close();
    }

    /// Pairs of `col_a` → `col_b` values, list values exploded
    ///
    /// The result is indexed by `col_a` and has the single column `col_b`.
    pub fn get_mapper(&self, col_a: &str, col_b: &str) -> Result<Table> {
        let mut df = self
            .data
            .reset_index()
            .select(&[col_a, col_b])?
            .drop_empty(&[col_a, col_b])?;

        for col in [col_a, col_b] {
            if has_iterables(&df.column_values(col)?, ITERABLE_SAMPLE) {
                df = df.explode(col)?.drop_empty(&[col])?;
            }
        }

        df.set_index(&[col_a])
    }

    /// Group the table by `on` and aggregate `columns`
    ///
    /// `keys` restricts the rows to those whose `on` value is listed, unless
    /// the keys themselves hold lists.
    #[instrument(skip(self, agg_for, keys), fields(database = %self.name))]
    pub fn get_annotations(
        &self,
        on: &On,
        columns: &[String],
        agg: Aggregator,
        agg_for: &HashMap<String, Aggregator>,
        keys: Option<&[Vec<Value>]>,
    ) -> Result<Table> {
        annotations_from_table(&self.data, on, columns, agg, agg_for, keys)
    }

    /// Median of every column per `index` value
    pub fn get_expressions(&self, index: &str) -> Result<Table> {
        let columns: Vec<String> = self
            .data
            .reset_index()
            .columns
            .into_iter()
            .map(|c| c.name)
            .filter(|n| n != index)
            .collect();
        let medians = get_multi_aggregators(Aggregator::Median, &HashMap::new(), &columns);
        groupby_agg(&self.data, &[index.to_string()], &columns, &medians)
    }
}

impl std::fmt::Display for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} {:?}",
            self.name,
            self.data.index_names.join(","),
            self.data.column_names()
        )
    }
}

/// Shared body of [`Database::get_annotations`] for any table
pub fn annotations_from_table(
    data: &Table,
    on: &On,
    columns: &[String],
    agg: Aggregator,
    agg_for: &HashMap<String, Aggregator>,
    keys: Option<&[Vec<Value>]>,
) -> Result<Table> {
    data.check_columns(columns)?;
    data.check_columns(on.names())?;

    let mut seen = HashSet::new();
    let repeated: Vec<String> = columns
        .iter()
        .filter(|c| !seen.insert(c.as_str()))
        .cloned()
        .collect();
    if !repeated.is_empty() {
        return Err(Error::DuplicateColumns(repeated));
    }

    // `on` is the group key, never an aggregated column
    let columns: Vec<String> = columns
        .iter()
        .filter(|c| !on.names().contains(c))
        .cloned()
        .collect();

    let mut df = data.reset_index();
    drop_duplicate_columns(&mut df);

    if let Some(keys) = keys {
        let scalar_keys = !keys.iter().flatten().any(Value::is_list);
        if scalar_keys {
            let wanted: HashSet<&Vec<Value>> = keys.iter().collect();
            let tuples = df.key_tuples(on.names())?;
            let before = df.row_count();
            let mut tuples = tuples.into_iter();
            df.filter_rows(|_| tuples.next().is_some_and(|t| wanted.contains(&t)));
            debug!(before, after = df.row_count(), "filtered rows by keys");
        }
    }

    let aggregators = get_multi_aggregators(agg, agg_for, &columns);
    groupby_agg(&df, on.names(), &columns, &aggregators)
}

/// Grouped annotation values, as consumed by the annotation engine
pub trait AnnotationProvider {
    /// Group by `on` and aggregate `columns`, optionally restricted to `keys`
    fn grouped_annotations(
        &self,
        on: &On,
        columns: &[String],
        agg: Aggregator,
        agg_for: &HashMap<String, Aggregator>,
        keys: Option<&[Vec<Value>]>,
    ) -> Result<Table>;
}

impl AnnotationProvider for Database {
    fn grouped_annotations(
        &self,
        on: &On,
        columns: &[String],
        agg: Aggregator,
        agg_for: &HashMap<String, Aggregator>,
        keys: Option<&[Vec<Value>]>,
    ) -> Result<Table> {
        self.get_annotations(on, columns, agg, agg_for, keys)
    }
}

// Plain tables are grouped over every row.
impl AnnotationProvider for Table {
    fn grouped_annotations(
        &self,
        on: &On,
        columns: &[String],
        agg: Aggregator,
        agg_for: &HashMap<String, Aggregator>,
        _keys: Option<&[Vec<Value>]>,
    ) -> Result<Table> {
        annotations_from_table(self, on, columns, agg, agg_for, None)
    }
}

/// Source of per-gene sequences
pub trait SequenceSource {
    fn get_sequences(&self, on: &On, omic: &str, agg: Aggregator) -> Result<KeyMap>;
}

/// Source of per-gene disease associations
pub trait DiseaseSource {
    fn get_disease_assocs(&self, on: &On) -> Result<KeyMap>;
}

/// Source of expression values indexed by gene
pub trait ExpressionSource {
    fn get_expressions(&self, index: &str) -> Result<Table>;
}

impl ExpressionSource for Database {
    fn get_expressions(&self, index: &str) -> Result<Table> {
        Database::get_expressions(self, index)
    }
}

/// A database holding sequences, optionally for several omic types
#[derive(Debug, Clone)]
pub struct SequenceDatabase {
    pub db: Database,
    /// Column holding the sequence strings
    pub sequence_col: String,
    /// Column naming the omic each row belongs to
    pub omic_col: Option<String>,
}

impl SequenceDatabase {
    pub fn new(db: Database, sequence_col: impl Into<String>) -> Self {
        Self {
            db,
            sequence_col: sequence_col.into(),
            omic_col: None,
        }
    }

    /// Restrict lookups to rows whose `omic_col` equals the requested omic
    pub fn with_omic_col(mut self, omic_col: impl Into<String>) -> Self {
        self.omic_col = Some(omic_col.into());
        self
    }
}

impl SequenceSource for SequenceDatabase {
    fn get_sequences(&self, on: &On, omic: &str, agg: Aggregator) -> Result<KeyMap> {
        let mut df = self.db.data.reset_index();
        if let Some(omic_col) = &self.omic_col {
            let omics = df.column_values(omic_col)?;
            let wanted = Value::from(omic);
            let mut omics = omics.into_iter();
            df.filter_rows(|_| omics.next().is_some_and(|o| o == wanted));
        }

        let columns = vec![self.sequence_col.clone()];
        let aggs = get_multi_aggregators(agg, &HashMap::new(), &columns);
        let grouped = groupby_agg(&df, on.names(), &columns, &aggs)?;
        Ok(into_key_map(grouped))
    }
}

/// A database of gene to disease associations
#[derive(Debug, Clone)]
pub struct DiseaseAssociation {
    pub db: Database,
    /// Column holding the disease name or identifier
    pub disease_col: String,
}

impl DiseaseAssociation {
    pub fn new(db: Database, disease_col: impl Into<String>) -> Self {
        Self {
            db,
            disease_col: disease_col.into(),
        }
    }
}

impl DiseaseSource for DiseaseAssociation {
    fn get_disease_assocs(&self, on: &On) -> Result<KeyMap> {
        let columns = vec![self.disease_col.clone()];
        let aggs = get_multi_aggregators(Aggregator::Unique, &HashMap::new(), &columns);
        let grouped = groupby_agg(&self.db.data, on.names(), &columns, &aggs)?;

        // Associations are always lists, even for a single disease
        Ok(into_key_map(grouped)
            .into_iter()
            .map(|(k, v)| match v {
                Value::List(_) | Value::Empty => (k, v),
                scalar => (k, Value::List(vec![scalar])),
            })
            .collect())
    }
}

fn into_key_map(grouped: Table) -> KeyMap {
    grouped
        .rows
        .into_iter()
        .map(|r| {
            let value = r.cells.into_iter().next().unwrap_or(Value::Empty);
            (r.key, value)
        })
        .collect()
}
