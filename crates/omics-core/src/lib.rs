//! omics-core: Core library for annotating multi-omics gene tables
//!
//! This library provides functionality to:
//! - Parse delimited (optionally gzipped, local or remote) resources into tables
//! - Group and aggregate database rows per gene key
//! - Align keys exactly, by shared list elements, or by fuzzy string similarity
//! - Left-join database attributes onto an omic's annotation table,
//!   reconciling columns that already exist
//! - Run whole annotation plans described in JSON

pub mod annotate;
pub mod database;
pub mod error;
pub mod omics;
pub mod parser;
pub mod plan;
pub mod resources;
pub mod table;
pub mod transforms;
pub mod value;

pub use annotate::{annotate_table, Annotatable, AnnotateOptions, Annotations};
pub use database::{
    AnnotationProvider, Database, DatabaseOptions, DelimitedLoader, DiseaseAssociation,
    DiseaseSource, ExpressionSource, Loader, On, SequenceDatabase, SequenceSource,
};
pub use error::{Error, Result};
pub use omics::{ExpressionData, ExpressionOptions, GeneList, MultiOmics};
pub use parser::{parse_delimited, write_delimited, write_json, ParseOptions};
pub use plan::{run_plan, AnnotationPlan, OutputFormat, Step};
pub use resources::{load_file_resources, FileResources, Resource};
pub use table::{Column, Row, Table};
pub use transforms::Aggregator;
pub use value::Value;
