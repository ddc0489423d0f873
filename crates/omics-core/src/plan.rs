//! Annotation plans: JSON files describing a whole annotation run
//!
//! A plan names the genes to annotate, the databases to open and the steps
//! that join database columns onto the genes. [`run_plan`] executes it and
//! optionally writes the resulting annotation table.

use crate::annotate::{Annotatable, AnnotateOptions};
use crate::database::{
    Database, DatabaseOptions, DelimitedLoader, DiseaseAssociation, On, SequenceDatabase,
};
use crate::error::{Error, Result};
use crate::omics::GeneList;
use crate::parser::{parse_delimited, write_delimited, write_json, ParseOptions};
use crate::table::Table;
use crate::transforms::df::DEFAULT_FUZZY_CUTOFF;
use crate::transforms::Aggregator;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// A complete annotation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationPlan {
    /// Genes the annotation table is built over
    pub index: IndexSpec,
    /// Databases referenced by the steps
    #[serde(default)]
    pub databases: Vec<DatabaseSpec>,
    /// Annotation steps, applied in order
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Where to write the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSpec>,
}

/// Genes to annotate, given inline or read from a file column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Name of the gene index, e.g. `gene_name`
    pub name: String,
    #[serde(default)]
    pub genes: Vec<Value>,
    /// Delimited file holding more genes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Column of `path` holding the genes; defaults to `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl IndexSpec {
    /// Inline genes followed by those read from `path`
    pub fn resolve(&self) -> Result<Vec<Value>> {
        let mut genes = self.genes.clone();
        if let Some(path) = &self.path {
            let table = parse_delimited(path, &ParseOptions::default())?;
            let column = self.column.as_deref().unwrap_or(&self.name);
            genes.extend(table.column_values(column)?);
        }
        Ok(genes)
    }
}

/// A database read from one delimited resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSpec {
    /// Name the steps refer to
    pub name: String,
    /// Base path or url of the database files
    pub path: String,
    /// Resource holding the table, e.g. `gencode.gtf.tsv.gz`
    pub resource: String,
    /// Resource name to file mapping; every file under `path` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_resources: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    /// Columns holding separated lists, mapped to their separator
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub list_columns: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_col: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub col_rename: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usecols: Option<Vec<String>>,
    #[serde(default)]
    pub write_uncompressed: bool,
}

impl DatabaseSpec {
    /// Open the database with these settings
    pub fn open(&self) -> Result<Database> {
        let delimiter = self
            .delimiter
            .map(|d| {
                u8::try_from(d)
                    .ok()
                    .filter(u8::is_ascii)
                    .ok_or_else(|| {
                        Error::Unsupported(format!("delimiter '{}' is not an ASCII character", d))
                    })
            })
            .transpose()?;
        let parse = ParseOptions {
            delimiter,
            list_columns: self.list_columns.clone(),
            ..ParseOptions::default()
        };
        let loader =
            DelimitedLoader::new(&self.name, &self.resource).with_parse_options(parse);
        let options = DatabaseOptions {
            index_col: self.index_col.clone(),
            keys: None,
            usecols: self.usecols.clone(),
            col_rename: self.col_rename.clone(),
            write_uncompressed: self.write_uncompressed,
        };
        Database::open(&self.path, self.file_resources.as_ref(), &loader, options)
    }
}

/// One key column or several
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySpec {
    One(String),
    Many(Vec<String>),
}

impl From<&KeySpec> for On {
    fn from(spec: &KeySpec) -> Self {
        match spec {
            KeySpec::One(name) => On::from(name.clone()),
            KeySpec::Many(names) => On::from(names.clone()),
        }
    }
}

/// An annotation step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Step {
    /// Join database columns grouped by `on`
    Attributes {
        database: String,
        on: KeySpec,
        columns: Vec<String>,
        #[serde(default)]
        agg: Aggregator,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        agg_for: HashMap<String, Aggregator>,
        #[serde(default)]
        fuzzy_match: bool,
        #[serde(default)]
        list_match: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fuzzy_cutoff: Option<f64>,
    },
    /// Assign one sequence per gene
    Sequences {
        database: String,
        on: KeySpec,
        sequence_col: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        omic_col: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        omic: Option<String>,
        #[serde(default = "default_sequence_agg")]
        agg: Aggregator,
    },
    /// Assign the list of associated diseases
    Diseases {
        database: String,
        on: KeySpec,
        disease_col: String,
    },
}

fn default_sequence_agg() -> Aggregator {
    Aggregator::Longest
}

impl Step {
    /// Database the step reads from
    pub fn database(&self) -> &str {
        match self {
            Step::Attributes { database, .. }
            | Step::Sequences { database, .. }
            | Step::Diseases { database, .. } => database,
        }
    }
}

/// Output file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Tsv,
    Json,
}

impl OutputFormat {
    /// Write `table` in this format
    pub fn write<W: Write>(&self, table: &Table, writer: W) -> Result<()> {
        match self {
            OutputFormat::Csv => write_delimited(table, writer, b','),
            OutputFormat::Tsv => write_delimited(table, writer, b'\t'),
            OutputFormat::Json => write_json(table, writer),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "tsv" => Ok(OutputFormat::Tsv),
            "json" => Ok(OutputFormat::Json),
            other => Err(Error::Unsupported(format!("output format '{}'", other))),
        }
    }
}

/// Output destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub format: OutputFormat,
}

impl AnnotationPlan {
    /// Load a plan from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the plan to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// A starting point for hand-written plans
    pub fn template() -> Self {
        Self {
            index: IndexSpec {
                name: "gene_name".to_string(),
                genes: vec![Value::from("TP53"), Value::from("BRCA1")],
                path: None,
                column: None,
            },
            databases: vec![DatabaseSpec {
                name: "GENCODE".to_string(),
                path: "~/data/gencode".to_string(),
                resource: "gencode.tsv.gz".to_string(),
                file_resources: None,
                delimiter: None,
                list_columns: HashMap::new(),
                index_col: Some("gene_name".to_string()),
                col_rename: HashMap::new(),
                usecols: None,
                write_uncompressed: false,
            }],
            steps: vec![
                Step::Attributes {
                    database: "GENCODE".to_string(),
                    on: KeySpec::One("gene_name".to_string()),
                    columns: vec!["gene_id".to_string(), "gene_type".to_string()],
                    agg: Aggregator::Unique,
                    agg_for: HashMap::new(),
                    fuzzy_match: false,
                    list_match: false,
                    fuzzy_cutoff: None,
                },
                Step::Sequences {
                    database: "GENCODE".to_string(),
                    on: KeySpec::One("gene_name".to_string()),
                    sequence_col: "sequence".to_string(),
                    omic_col: None,
                    omic: None,
                    agg: Aggregator::Longest,
                },
            ],
            output: Some(OutputSpec {
                path: PathBuf::from("annotations.csv"),
                format: OutputFormat::Csv,
            }),
        }
    }

    /// Check that every step names a declared database
    pub fn validate(&self) -> Result<()> {
        for step in &self.steps {
            if !self.databases.iter().any(|d| d.name == step.database()) {
                return Err(Error::UnknownDatabase(step.database().to_string()));
            }
        }
        Ok(())
    }
}

/// Execute `plan` and return the annotation table
///
/// Databases are opened once, in declaration order, before any step runs.
pub fn run_plan(plan: &AnnotationPlan) -> Result<Table> {
    plan.validate()?;

    let mut databases = HashMap::new();
    for spec in &plan.databases {
        databases.insert(spec.name.clone(), spec.open()?);
    }

    let mut genes = GeneList::new("plan", plan.index.name.clone(), plan.index.resolve()?);
    genes.init_annotations(None);

    for (i, step) in plan.steps.iter().enumerate() {
        info!(step = i + 1, database = step.database(), "running annotation step");
        match step {
            Step::Attributes {
                database,
                on,
                columns,
                agg,
                agg_for,
                fuzzy_match,
                list_match,
                fuzzy_cutoff,
            } => {
                let options = AnnotateOptions {
                    agg: *agg,
                    agg_for: agg_for.clone(),
                    fuzzy_match: *fuzzy_match,
                    list_match: *list_match,
                    fuzzy_cutoff: fuzzy_cutoff.unwrap_or(DEFAULT_FUZZY_CUTOFF),
                };
                let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
                let db = lookup(&databases, database)?;
                genes.annotate_attributes(db, On::from(on), &columns, &options)?;
            }
            Step::Sequences {
                database,
                on,
                sequence_col,
                omic_col,
                omic,
                agg,
            } => {
                let db = lookup(&databases, database)?.clone();
                let mut source = SequenceDatabase::new(db, sequence_col);
                if let Some(omic_col) = omic_col {
                    source = source.with_omic_col(omic_col);
                }
                genes.annotate_sequences(&source, On::from(on), *agg, omic.as_deref())?;
            }
            Step::Diseases {
                database,
                on,
                disease_col,
            } => {
                let db = lookup(&databases, database)?.clone();
                let source = DiseaseAssociation::new(db, disease_col);
                genes.annotate_diseases(&source, On::from(on))?;
            }
        }
    }

    let annotations = genes.get_annotations()?.clone();
    if let Some(output) = &plan.output {
        let file = File::create(&output.path).map_err(|e| Error::FileRead {
            path: output.path.clone(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        output.format.write(&annotations, &mut writer)?;
        writer.flush()?;
        info!(path = %output.path.display(), "wrote annotations");
    }
    Ok(annotations)
}

fn lookup<'a>(databases: &'a HashMap<String, Database>, name: &str) -> Result<&'a Database> {
    databases
        .get(name)
        .ok_or_else(|| Error::UnknownDatabase(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_gencode(dir: &Path) {
        fs::write(
            dir.join("gencode.tsv"),
            "gene_id\tgene_name\tgene_type\ttranscript_seq\n\
             ENSG1\tTP53\tprotein_coding\tACGT\n\
             ENSG1\tTP53\tprotein_coding\tACGTACGT\n\
             ENSG2\tBRCA1\tprotein_coding\tGG\n",
        )
        .unwrap();
    }

    fn plan_for(dir: &Path) -> AnnotationPlan {
        let mut plan = AnnotationPlan::template();
        plan.databases[0].path = dir.to_string_lossy().into_owned();
        plan.databases[0].resource = "gencode.tsv".to_string();
        plan.databases[0].index_col = None;
        if let Step::Sequences { sequence_col, .. } = &mut plan.steps[1] {
            *sequence_col = "transcript_seq".to_string();
        }
        plan.output = None;
        plan
    }

    #[test]
    fn test_template_round_trips_through_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.json");
        AnnotationPlan::template().save(&path).unwrap();

        let loaded = AnnotationPlan::load(&path).unwrap();
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(loaded.steps[1].database(), "GENCODE");
        assert_eq!(loaded.output.unwrap().format, OutputFormat::Csv);
    }

    #[test]
    fn test_step_kind_tag() {
        let step: Step = serde_json::from_str(
            r#"{"kind": "diseases", "database": "DisGeNET", "on": ["gene_name"], "disease_col": "disease"}"#,
        )
        .unwrap();
        match step {
            Step::Diseases { on, .. } => assert_eq!(on, KeySpec::Many(vec!["gene_name".into()])),
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_unknown_database_rejected() {
        let mut plan = AnnotationPlan::template();
        plan.databases.clear();
        assert!(matches!(run_plan(&plan), Err(Error::UnknownDatabase(name)) if name == "GENCODE"));
    }

    #[test]
    fn test_run_plan() {
        let dir = TempDir::new().unwrap();
        write_gencode(dir.path());
        let mut plan = plan_for(dir.path());
        plan.output = Some(OutputSpec {
            path: dir.path().join("out.tsv"),
            format: OutputFormat::Tsv,
        });

        let table = run_plan(&plan).unwrap();
        assert_eq!(table.index_name(), Some("gene_name"));
        assert_eq!(
            table.column_values("gene_id").unwrap(),
            vec![Value::from("ENSG1"), Value::from("ENSG2")]
        );
        assert_eq!(
            table.column_values("sequence").unwrap(),
            vec![Value::from("ACGTACGT"), Value::from("GG")]
        );

        let written = fs::read_to_string(dir.path().join("out.tsv")).unwrap();
        assert!(written.starts_with("gene_name\tgene_id\tgene_type\tsequence\n"));
    }

    #[test]
    fn test_index_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("genes.csv");
        fs::write(&path, "symbol\nMYC\nEGFR\n").unwrap();
        let spec = IndexSpec {
            name: "gene_name".to_string(),
            genes: vec![Value::from("TP53")],
            path: Some(path),
            column: Some("symbol".to_string()),
        };
        assert_eq!(
            spec.resolve().unwrap(),
            vec![Value::from("TP53"), Value::from("MYC"), Value::from("EGFR")]
        );
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let mut spec = AnnotationPlan::template().databases.remove(0);
        spec.delimiter = Some('→');
        assert!(matches!(spec.open(), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("TSV".parse::<OutputFormat>().unwrap(), OutputFormat::Tsv);
        assert!("xlsx".parse::<OutputFormat>().is_err());
    }
}
