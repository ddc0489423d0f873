use flate2::write::GzEncoder;
use flate2::Compression;
use omics_core::{
    run_plan, Annotatable, AnnotateOptions, AnnotationPlan, Database, DatabaseOptions,
    DelimitedLoader, ExpressionData, ExpressionOptions, ParseOptions, Value,
};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn write_gz(path: &Path, content: &str) {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    fs::write(path, encoder.finish().unwrap()).unwrap();
}

fn list(items: &[&str]) -> Value {
    Value::List(items.iter().map(|s| Value::from(*s)).collect())
}

#[test]
fn test_expression_annotated_from_gzipped_database() {
    let dir = TempDir::new().unwrap();
    let expr_path = dir.path().join("geneExp.csv");
    fs::write(
        &expr_path,
        "GeneSymbol,TCGA-A,TCGA-B,Comment\nTP53,1,2,x\nMIRN21,3,4,y\nMYC,5,6,z\n",
    )
    .unwrap();
    let db_dir = dir.path().join("hgnc");
    fs::create_dir(&db_dir).unwrap();
    write_gz(
        &db_dir.join("hgnc.tsv.gz"),
        "gene_name\tlocus_group\tgene_id\n\
         TP53\tprotein-coding\tHGNC:1\n\
         MIR21|MIRN21\tnon-coding RNA\tHGNC:2\n\
         TP53\tprotein-coding\tHGNC:3\n",
    );

    let options = ExpressionOptions {
        transposed: true,
        columns: Some("GeneSymbol|TCGA".to_string()),
        ..ExpressionOptions::default()
    };
    let mut mrna = ExpressionData::load("MessengerRNA", "LUAD", &expr_path, &options).unwrap();
    assert_eq!(mrna.get_samples_list().len(), 2);
    mrna.init_annotations(None);

    let loader = DelimitedLoader::new("HGNC", "hgnc.tsv.gz").with_parse_options(ParseOptions {
        list_columns: HashMap::from([("gene_name".to_string(), "|".to_string())]),
        ..ParseOptions::default()
    });
    let db = Database::open(
        &db_dir.to_string_lossy(),
        None,
        &loader,
        DatabaseOptions::default(),
    )
    .unwrap();

    let list_match = AnnotateOptions {
        list_match: true,
        ..AnnotateOptions::default()
    };
    mrna.annotate_attributes(&db, "gene_name", &["locus_group", "gene_id"], &list_match)
        .unwrap();

    let annotations = mrna.get_annotations().unwrap();
    assert_eq!(
        annotations.column_values("locus_group").unwrap(),
        vec![
            Value::from("protein-coding"),
            Value::from("non-coding RNA"),
            Value::Empty
        ]
    );
    assert_eq!(
        annotations.column_values("gene_id").unwrap()[0],
        list(&["HGNC:1", "HGNC:3"])
    );

    // A second source for an existing column is merged into it
    let extra = omics_core::parser::parse_csv_str(
        "gene_name,gene_id\nMYC,HGNC:9\nTP53,HGNC:1\n",
        "extra.csv",
    )
    .unwrap();
    mrna.annotate_attributes(&extra, "gene_name", &["gene_id"], &AnnotateOptions::default())
        .unwrap();

    let annotations = mrna.get_annotations().unwrap();
    assert_eq!(annotations.column_names(), vec!["locus_group", "gene_id"]);
    assert_eq!(
        annotations.column_values("gene_id").unwrap(),
        vec![
            list(&["HGNC:1", "HGNC:3"]),
            Value::from("HGNC:2"),
            Value::from("HGNC:9")
        ]
    );
}

#[test]
fn test_plan_writes_json_output() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("disgenet.tsv"),
        "gene_symbol\tdisease\nTP53\tLi-Fraumeni\nTP53\tCarcinoma\nEGFR\tCarcinoma\n",
    )
    .unwrap();
    let output = dir.path().join("out.json");

    let plan_json = serde_json::json!({
        "index": {"name": "gene_name", "genes": ["TP53", "MYC"]},
        "databases": [{
            "name": "DisGeNET",
            "path": dir.path().to_string_lossy(),
            "resource": "disgenet.tsv",
            "col_rename": {"gene_symbol": "gene_name"}
        }],
        "steps": [
            {"kind": "diseases", "database": "DisGeNET", "on": "gene_name", "disease_col": "disease"}
        ],
        "output": {"path": output.to_string_lossy(), "format": "json"}
    });
    let plan_path = dir.path().join("plan.json");
    fs::write(&plan_path, plan_json.to_string()).unwrap();

    let plan = AnnotationPlan::load(&plan_path).unwrap();
    let table = run_plan(&plan).unwrap();
    assert_eq!(
        table.column_values("disease_associations").unwrap(),
        vec![list(&["Li-Fraumeni", "Carcinoma"]), Value::Empty]
    );

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(
        written,
        serde_json::json!([
            {"gene_name": "TP53", "disease_associations": ["Li-Fraumeni", "Carcinoma"]},
            {"gene_name": "MYC", "disease_associations": null}
        ])
    );
}
