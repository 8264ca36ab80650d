mod common;

use gridbase::infer::{self, ScanOptions};
use gridbase::repo::{Repository, WriteOptions};
use gridbase::schema::SchemaDoc;
use gridbase::source::{GridSource, Workbook};
use gridbase::value::{Cell, FindOptions, LogicalType};

const ORDERS_CSV: &str = "\
type,number,string,number,date\n\
required,1,1,,\n\
final,1,,,\n\
defaultvalue,,n/a,0,\n\
,Order ID,Customer Name,amount,createdDate\n\
,1,Alice,10,2024-01-02\n\
,2,Bob,20,2024-01-03\n";

fn orders_source() -> GridSource {
    GridSource::from_csv_reader(ORDERS_CSV.as_bytes(), b',').unwrap()
}

#[test]
fn csv_scan_yields_a_typed_definition() {
    let mut workbook = Workbook::new();
    workbook.insert("orders", orders_source());
    let inferred = infer::scan_workbook(&mut workbook, &ScanOptions::default()).unwrap();
    assert_eq!(inferred.len(), 1);
    let def = &inferred[0].definition;

    assert_eq!(
        def.order,
        vec![
            "order_id".to_string(),
            "customer_name".to_string(),
            "amount".to_string(),
            "created_date".to_string(),
        ]
    );
    let order_id = def.column("order_id").unwrap();
    assert_eq!(order_id.column_type, LogicalType::Number);
    assert!(order_id.required);
    assert!(order_id.is_final);

    let name = def.column("customer_name").unwrap();
    assert_eq!(name.column_type, LogicalType::String);
    assert!(name.required);
    assert_eq!(
        name.default.as_ref().unwrap().materialize(),
        Cell::Text("n/a".into())
    );

    assert_eq!(
        def.column("created_date").unwrap().column_type,
        LogicalType::Date
    );
    assert_eq!(def.header_for("order_id"), "Order ID");
}

#[test]
fn schema_doc_survives_a_save_and_load() {
    let mut workbook = Workbook::new();
    workbook.insert("orders", orders_source());
    let doc = infer::workbook_schema_doc(&mut workbook, &ScanOptions::default()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");
    doc.save(&path).unwrap();
    let reloaded = SchemaDoc::load(&path).unwrap();
    assert_eq!(reloaded, doc);
    assert!(reloaded.table("orders").is_some());
}

#[test]
fn inferred_definition_drives_a_repository() {
    let mut workbook = Workbook::new();
    workbook.insert("orders", orders_source());
    let doc = infer::workbook_schema_doc(&mut workbook, &ScanOptions::default()).unwrap();
    let definition = doc.definition("orders").unwrap();
    let source = workbook.remove("orders").unwrap();
    let mut repo = Repository::new(source, definition);

    let all = repo.get_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].get("order_id"), Some(&Cell::Number(1.0)));
    assert_eq!(
        all[0].get("customer_name"),
        Some(&Cell::Text("Alice".into()))
    );

    // Writes go through the physical "Customer Name" header via the rename map.
    let written = repo
        .add(
            common::record(&[
                ("order_id", Cell::Number(3.0)),
                ("amount", Cell::Number(30.0)),
            ]),
            &WriteOptions::default(),
        )
        .unwrap();
    assert_eq!(
        written.get("customer_name"),
        Some(&Cell::Text("n/a".into()))
    );

    let found = repo
        .find_first_by("customer_name", "Bob", FindOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(found.record.get("order_id"), Some(&Cell::Number(2.0)));
}

#[test]
fn sample_limit_bounds_the_value_heuristic() {
    let mut rows = vec![vec![Cell::Text("plain".into())]; 5];
    rows.push(vec![Cell::Text("42".into())]);
    let mut workbook = Workbook::new();
    workbook.insert("t", GridSource::new(vec!["payload".to_string()], rows));

    let opts = ScanOptions {
        sample_rows: 5,
        ..Default::default()
    };
    let inferred = infer::scan_workbook(&mut workbook, &opts).unwrap();
    assert_eq!(
        inferred[0].definition.column("payload").unwrap().column_type,
        LogicalType::String
    );
}
