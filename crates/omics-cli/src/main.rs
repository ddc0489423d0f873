//! Omics annotation CLI
//!
//! Command-line tool for inspecting omics tables, annotating gene lists with
//! database attributes and running annotation plans.

use clap::{Parser, Subcommand};
use omics_core::{
    parse_delimited, run_plan, Aggregator, Annotatable, AnnotateOptions, AnnotationPlan,
    Database, GeneList, On, OutputFormat, ParseOptions, Table,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "omics")]
#[command(about = "Multi-omics annotation toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and display a delimited table
    Inspect {
        /// Path to the table (csv, tsv, optionally gzipped)
        #[arg(short, long)]
        file: PathBuf,

        /// Column to index the table by
        #[arg(short, long)]
        index_col: Option<String>,

        /// Maximum number of rows to display
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Build a one-to-one mapping between two columns of a table
    Mapper {
        /// Path to the table
        #[arg(short, long)]
        file: PathBuf,

        /// Column mapped from
        #[arg(long)]
        from: String,

        /// Column mapped to
        #[arg(long)]
        to: String,

        /// Output format (csv, tsv or json)
        #[arg(long, default_value = "tsv")]
        format: String,

        /// Output file path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Annotate a list of genes with columns of a database table
    Annotate {
        /// File holding the genes to annotate
        #[arg(short, long)]
        genes: PathBuf,

        /// Column of the gene file, also the name of the annotation index
        #[arg(long, default_value = "gene_name")]
        gene_col: String,

        /// Database table to take annotations from
        #[arg(short, long)]
        database: PathBuf,

        /// Key column(s) to join on (comma-separated)
        #[arg(long)]
        on: String,

        /// Columns to annotate with (comma-separated)
        #[arg(short, long)]
        columns: String,

        /// Aggregation for genes with several database rows
        #[arg(long, default_value = "unique")]
        agg: String,

        /// Align keys by string similarity
        #[arg(long)]
        fuzzy: bool,

        /// Align keys sharing any element of list values
        #[arg(long)]
        list_match: bool,

        /// Output format (csv, tsv or json)
        #[arg(long, default_value = "csv")]
        format: String,

        /// Output file path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run an annotation plan
    Run {
        /// Path to plan file (JSON)
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Create an annotation plan template
    CreatePlan {
        /// Output path for the plan file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the databases known to the annotation pipelines
    ListDatabases,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> omics_core::Result<()> {
    match cli.command {
        Commands::Inspect {
            file,
            index_col,
            limit,
        } => cmd_inspect(&file, index_col, limit),
        Commands::Mapper {
            file,
            from,
            to,
            format,
            output,
        } => cmd_mapper(&file, &from, &to, &format, output.as_deref()),
        Commands::Annotate {
            genes,
            gene_col,
            database,
            on,
            columns,
            agg,
            fuzzy,
            list_match,
            format,
            output,
        } => {
            let options = AnnotateOptions {
                agg: agg.parse::<Aggregator>()?,
                fuzzy_match: fuzzy,
                list_match,
                ..AnnotateOptions::default()
            };
            cmd_annotate(
                &genes,
                &gene_col,
                &database,
                &on,
                &columns,
                &options,
                &format,
                output.as_deref(),
            )
        }
        Commands::Run { plan } => cmd_run(&plan),
        Commands::CreatePlan { output } => cmd_create_plan(&output),
        Commands::ListDatabases => cmd_list_databases(),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn write_output(table: &Table, format: &str, output: Option<&Path>) -> omics_core::Result<()> {
    let format = format.parse::<OutputFormat>()?;
    match output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            format.write(table, &mut writer)?;
            writer.flush()?;
            info!(rows = table.row_count(), path = %path.display(), "wrote table");
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            format.write(table, &mut writer)?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn cmd_inspect(file: &Path, index_col: Option<String>, limit: usize) -> omics_core::Result<()> {
    let options = ParseOptions {
        index_col,
        ..ParseOptions::default()
    };
    let table = parse_delimited(file, &options)?;

    println!("File: {}", file.display());
    if !table.index_names.is_empty() {
        println!("Index: {}", table.index_names.join(", "));
    }
    println!("Columns: {}", table.column_count());
    println!("Rows: {}", table.row_count());
    println!();

    let flat = table.reset_index();
    let header: Vec<&str> = flat.columns.iter().map(|c| c.name.as_str()).collect();
    println!("{}", header.join("\t"));
    println!("{}", "-".repeat(header.len() * 12));

    for row in flat.rows.iter().take(limit) {
        let values: Vec<String> = row.cells.iter().map(|c| c.to_string_value()).collect();
        println!("{}", values.join("\t"));
    }

    if flat.row_count() > limit {
        println!("... ({} more rows)", flat.row_count() - limit);
    }

    Ok(())
}

fn cmd_mapper(
    file: &Path,
    from: &str,
    to: &str,
    format: &str,
    output: Option<&Path>,
) -> omics_core::Result<()> {
    let table = parse_delimited(file, &ParseOptions::default())?;
    let db = Database::from_table(file.display().to_string(), table);
    let mapper = db.get_mapper(from, to)?;
    write_output(&mapper, format, output)
}

#[allow(clippy::too_many_arguments)]
fn cmd_annotate(
    genes_path: &Path,
    gene_col: &str,
    database_path: &Path,
    on: &str,
    columns: &str,
    options: &AnnotateOptions,
    format: &str,
    output: Option<&Path>,
) -> omics_core::Result<()> {
    let genes_table = parse_delimited(genes_path, &ParseOptions::default())?;
    let mut genes = GeneList::new(
        genes_path.display().to_string(),
        gene_col,
        genes_table.column_values(gene_col)?,
    );
    genes.init_annotations(None);

    let table = parse_delimited(database_path, &ParseOptions::default())?;
    let db = Database::from_table(database_path.display().to_string(), table);
    info!(database = %db, "annotating");

    let columns = split_list(columns);
    let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
    genes.annotate_attributes(&db, On::from(split_list(on)), &columns, options)?;

    write_output(genes.get_annotations()?, format, output)
}

fn cmd_run(plan_path: &Path) -> omics_core::Result<()> {
    let plan = AnnotationPlan::load(plan_path)?;
    let table = run_plan(&plan)?;

    println!(
        "Annotated {} genes with {} columns",
        table.row_count(),
        table.column_count()
    );
    match &plan.output {
        Some(output) => println!("Wrote {}", output.path.display()),
        None => write_output(&table, "tsv", None)?,
    }

    Ok(())
}

fn cmd_create_plan(output: &Path) -> omics_core::Result<()> {
    AnnotationPlan::template().save(output)?;
    println!("Created plan template: {}", output.display());
    Ok(())
}

fn cmd_list_databases() -> omics_core::Result<()> {
    let databases = Database::list_databases();
    println!("Databases ({}):", databases.len());
    for name in databases {
        println!("  {}", name);
    }
    Ok(())
}
