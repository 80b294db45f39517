//! Loader properties exercised against the in-memory sink.

use std::collections::HashMap;

use scrapebox::testing::{MemorySink, SinkCall};
use scrapebox::{populate, LoadPlan, LoaderError, Payload, Record, TableMode, TableSpec};
use serde_json::json;

fn rec(id: i64, name: &str) -> Record {
    let mut record = Record::new();
    record.insert("id".to_string(), json!(id));
    record.insert("name".to_string(), json!(name));
    record
}

fn rows(n: i64) -> Vec<Record> {
    (0..n).map(|i| rec(i, "row")).collect()
}

fn explicit(table: &str) -> LoadPlan {
    LoadPlan::new(TableMode::Explicit(vec![TableSpec::new(table)]))
}

#[tokio::test]
async fn chunking_makes_ceil_r_over_c_insert_calls() {
    let sink = MemorySink::new().with_table("items");
    let plan = explicit("items").with_chunk_size(3);

    let report = populate(vec![Payload::records("items", rows(10))], &sink, &plan)
        .await
        .unwrap();

    // ceil(10 / 3) = 4
    assert_eq!(sink.insert_calls("items"), 4);
    assert_eq!(report.table("items").unwrap().chunks, 4);
    assert_eq!(report.total_inserted(), 10);
    assert_eq!(sink.rows("items").len(), 10);
}

#[tokio::test]
async fn row_limit_halts_an_infinite_stream() {
    let sink = MemorySink::new().with_table("items");
    let plan = explicit("items").with_chunk_size(1000).with_row_limit(4);

    let infinite = (0i64..).map(|i| rec(i, "endless"));
    let report = populate(vec![Payload::records("items", infinite)], &sink, &plan)
        .await
        .unwrap();

    assert_eq!(report.total_inserted(), 4);
    assert_eq!(sink.rows("items").len(), 4);
    assert_eq!(sink.insert_calls("items"), 1);
}

#[tokio::test]
async fn row_limit_of_zero_processes_the_full_stream() {
    let sink = MemorySink::new().with_table("items");
    let plan = explicit("items").with_chunk_size(2).with_row_limit(0);

    let report = populate(vec![Payload::records("items", rows(5))], &sink, &plan)
        .await
        .unwrap();

    assert_eq!(report.total_inserted(), 5);
}

#[tokio::test]
async fn replace_by_id_is_idempotent() {
    let sink = MemorySink::new().with_table("orgs");
    let plan = LoadPlan::new(TableMode::Explicit(vec![
        TableSpec::new("orgs").with_rid("id"),
    ]));

    populate(vec![Payload::records("orgs", rows(5))], &sink, &plan)
        .await
        .unwrap();
    let second = populate(vec![Payload::records("orgs", rows(5))], &sink, &plan)
        .await
        .unwrap();

    assert_eq!(sink.rows("orgs").len(), 5, "no duplicate rows");
    let report = second.table("orgs").unwrap();
    assert_eq!(report.deleted, 5);
    assert_eq!(report.inserted, 5);
}

#[tokio::test]
async fn no_rid_means_full_replace() {
    let sink = MemorySink::new().with_table("items");
    let plan = explicit("items");

    populate(vec![Payload::records("items", rows(5))], &sink, &plan)
        .await
        .unwrap();
    let second = populate(vec![Payload::records("items", rows(2))], &sink, &plan)
        .await
        .unwrap();

    assert_eq!(sink.rows("items").len(), 2, "prior rows fully replaced");
    assert_eq!(second.table("items").unwrap().deleted, 5);
    assert!(sink
        .calls()
        .iter()
        .any(|call| matches!(call, SinkCall::DeleteAll { table } if table == "items")));
}

#[tokio::test]
async fn dynamic_mode_creates_one_table_per_distinct_key() {
    let sink = MemorySink::new();
    let plan = LoadPlan::new(TableMode::Dynamic {
        key: "category".to_string(),
        rid: None,
        namer: None,
    });

    let records = vec![
        ("Food Shelves", 1),
        ("Housing", 2),
        ("Food Shelves", 3),
        ("Legal Aid", 4),
        ("Housing", 5),
    ]
    .into_iter()
    .map(|(category, id)| {
        let mut record = rec(id, "entry");
        record.insert("category".to_string(), json!(category));
        record
    })
    .collect::<Vec<_>>();

    let report = populate(vec![Payload::unnamed(records)], &sink, &plan)
        .await
        .unwrap();

    assert_eq!(
        sink.table_names(),
        vec!["food_shelves", "housing", "legal_aid"]
    );
    assert_eq!(report.tables.len(), 3);
    assert_eq!(sink.rows("food_shelves").len(), 2);
    assert_eq!(sink.rows("housing").len(), 2);
    assert_eq!(sink.rows("legal_aid").len(), 1);
    for row in sink.rows("food_shelves") {
        assert_eq!(row.get("category"), Some(&json!("Food Shelves")));
    }
}

#[tokio::test]
async fn dynamic_mode_skips_records_missing_the_key() {
    let sink = MemorySink::new();
    let plan = LoadPlan::new(TableMode::Dynamic {
        key: "category".to_string(),
        rid: None,
        namer: None,
    });

    let mut tagged = rec(1, "kept");
    tagged.insert("category".to_string(), json!("known"));
    let untagged = rec(2, "dropped");

    let report = populate(vec![Payload::unnamed(vec![tagged, untagged])], &sink, &plan)
        .await
        .unwrap();

    assert_eq!(report.total_inserted(), 1);
    assert_eq!(sink.table_names(), vec!["known"]);
}

#[tokio::test]
async fn payload_without_records_or_file_is_fatal() {
    let sink = MemorySink::new().with_table("items");
    let plan = explicit("items");

    let empty = Payload {
        table: Some("items".to_string()),
        records: None,
        file: None,
    };

    let result = populate(vec![empty], &sink, &plan).await;
    assert!(matches!(result, Err(LoaderError::EmptyPayload { index: 0 })));
}

#[tokio::test]
async fn unknown_model_name_is_fatal() {
    let sink = MemorySink::new();
    let mut models = HashMap::new();
    models.insert("known".to_string(), TableSpec::new("known"));
    let plan = LoadPlan::new(TableMode::Models(models));

    let result = populate(
        vec![Payload::records("mystery", rows(1))],
        &sink,
        &plan,
    )
    .await;

    assert!(matches!(result, Err(LoaderError::UnknownTable { .. })));
}

#[tokio::test]
async fn missing_table_is_created_lazily_with_zero_deletes() {
    let sink = MemorySink::new();
    let plan = explicit("fresh");

    let report = populate(vec![Payload::records("fresh", rows(3))], &sink, &plan)
        .await
        .unwrap();

    let table = report.table("fresh").unwrap();
    assert_eq!(table.deleted, 0);
    assert_eq!(table.inserted, 3);
    assert_eq!(
        sink.calls()
            .iter()
            .filter(|call| matches!(call, SinkCall::EnsureTable { .. }))
            .count(),
        1
    );
    assert_eq!(sink.rows("fresh").len(), 3);
}

#[tokio::test]
async fn transforms_run_in_normalize_filter_parse_order() {
    let sink = MemorySink::new().with_table("items");
    let plan = explicit("items")
        .with_normalize(|mut record| {
            let name = record
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .trim()
                .to_string();
            record.insert("name".to_string(), json!(name));
            record
        })
        .with_filter(|record| {
            record
                .get("name")
                .and_then(|v| v.as_str())
                .is_some_and(|name| !name.is_empty())
        })
        .with_parse(|mut record| {
            record.insert("loaded".to_string(), json!(true));
            record
        });

    let mut blank = Record::new();
    blank.insert("id".to_string(), json!(99));
    blank.insert("name".to_string(), json!("   "));

    let mut keeper = Record::new();
    keeper.insert("id".to_string(), json!(1));
    keeper.insert("name".to_string(), json!("  shelter  "));

    let report = populate(
        vec![Payload::records("items", vec![blank, keeper])],
        &sink,
        &plan,
    )
    .await
    .unwrap();

    assert_eq!(report.total_inserted(), 1);
    let loaded = sink.rows("items");
    assert_eq!(loaded[0].get("name"), Some(&json!("shelter")));
    assert_eq!(loaded[0].get("loaded"), Some(&json!(true)));
}

#[tokio::test]
async fn file_payloads_read_ndjson_records() {
    let path = std::env::temp_dir().join(format!("scrapebox-load-{}.ndjson", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        "{\"id\": 1, \"name\": \"a\"}\n\n{\"id\": 2, \"name\": \"b\"}\n",
    )
    .unwrap();

    let sink = MemorySink::new().with_table("items");
    let plan = explicit("items");

    let report = populate(vec![Payload::file("items", &path)], &sink, &plan)
        .await
        .unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(report.total_inserted(), 2);
    assert_eq!(sink.rows("items")[1].get("name"), Some(&json!("b")));
}

#[tokio::test]
async fn reflect_mode_reuses_the_schema_cache() {
    // Unique name: the reflection cache is process-wide.
    let table = format!("reflected_{}", uuid::Uuid::new_v4().simple());
    let sink = MemorySink::new().with_table_columns(
        table.as_str(),
        vec![
            scrapebox::ColumnSpec::new("id", scrapebox::ColumnKind::BigInt),
            scrapebox::ColumnSpec::new("name", scrapebox::ColumnKind::Text),
        ],
    );
    let plan = LoadPlan::new(TableMode::Reflect { rid: None });

    populate(vec![Payload::records(table.as_str(), rows(2))], &sink, &plan)
        .await
        .unwrap();
    populate(vec![Payload::records(table.as_str(), rows(2))], &sink, &plan)
        .await
        .unwrap();

    let reflects = sink
        .calls()
        .iter()
        .filter(|call| matches!(call, SinkCall::Reflect { .. }))
        .count();
    assert_eq!(reflects, 1, "second pass should hit the cache");
    assert_eq!(sink.rows(&table).len(), 2);
}
