//! Load sessions against the in-memory fixture engine.

mod common;

use chrono::NaiveDate;
use common::{add_table, attributes, catalog, init_tracing, table_rows, Catalog, FixtureEngine};
use tdbulk::channel::BufferChannel;
use tdbulk::error::{ConfigurationError, DataError, NegotiationError};
use tdbulk::{
    BufferBuilder, Column, ColumnSchema, CompletionCode, Decimal, ExportSession, LoadSession,
    Record, RowEncoder, SessionAttributes, SessionState, TransferError, Value,
};
use tokio::time::{Duration, Instant};

fn customers_schema() -> ColumnSchema {
    ColumnSchema::new(vec![
        Column::integer("id").not_null(),
        Column::varchar("name", 5),
    ])
}

fn customers_catalog() -> Catalog {
    let catalog = catalog();
    add_table(&catalog, "db.customers", customers_schema(), Vec::new());
    catalog
}

async fn open_load(engine: FixtureEngine) -> LoadSession<FixtureEngine> {
    let mut load = LoadSession::open(engine, attributes()).await.unwrap();
    load.set_target("db.customers").await.unwrap();
    load
}

fn customer(id: i64, name: &str) -> Vec<Value> {
    vec![Value::Int(id), Value::from(name)]
}

#[tokio::test]
async fn test_oversized_field_rejects_only_that_row() {
    init_tracing();
    let catalog = customers_catalog();
    let mut load = open_load(FixtureEngine::new(catalog.clone())).await;
    assert_eq!(load.state(), SessionState::SchemaReady);

    let outcome = load
        .put_rows(&[customer(1, "ok"), customer(2, "waytoolong"), customer(3, "fine")])
        .await
        .unwrap();

    assert_eq!(outcome.accepted, 2);
    assert_eq!(outcome.rejected_rows(), vec![1]);
    assert!(matches!(
        &outcome.rejected[0],
        DataError::RowRejected { row_index: 1, reason } if reason.contains("name")
    ));
    assert_eq!(load.state(), SessionState::Transferring);

    let summary = load.close().await.unwrap();
    assert_eq!(summary.code, Some(CompletionCode::Success));
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.rejected, 1);
    assert_eq!(
        table_rows(&catalog, "db.customers"),
        vec![customer(1, "ok"), customer(3, "fine")]
    );
}

#[tokio::test]
async fn test_null_into_not_null_column() {
    let mut load = open_load(FixtureEngine::new(customers_catalog())).await;

    let outcome = load
        .put_rows(&[vec![Value::Null, Value::from("x")], customer(2, "y")])
        .await
        .unwrap();
    assert_eq!(outcome.accepted, 1);
    assert_eq!(outcome.rejected_rows(), vec![0]);
    assert_eq!(outcome.total_accepted, 1);

    // later calls report their own rows plus the running totals
    let outcome = load
        .put_rows(&[customer(3, "z"), customer(4, "w")])
        .await
        .unwrap();
    assert_eq!(outcome.accepted, 2);
    assert!(outcome.rejected.is_empty());
    assert_eq!(outcome.total_accepted, 3);
    assert_eq!(outcome.total_rejected, 1);
}

#[tokio::test]
async fn test_warning_completion_code_fails_job() {
    let mut engine = FixtureEngine::new(customers_catalog());
    engine.completion_code = 4;
    let mut load = open_load(engine).await;
    load.put_rows(&[customer(1, "a")]).await.unwrap();

    let err = load.close().await.unwrap_err();
    match err {
        TransferError::JobFailed { code } => {
            assert_eq!(code, CompletionCode::Warning);
            assert_eq!(code.code(), 4);
        }
        other => panic!("expected JobFailed, got {:?}", other),
    }
    // closing again reports the same outcome
    assert!(matches!(
        load.close().await,
        Err(TransferError::JobFailed { code: CompletionCode::Warning })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_queued_job_waits_for_slot() {
    let mut engine = FixtureEngine::new(customers_catalog());
    engine.queued = 3;

    let started = Instant::now();
    let load = open_load(engine).await;
    assert_eq!(load.state(), SessionState::SchemaReady);
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn test_attribute_rejection_then_retry() {
    let catalog = customers_catalog();
    let mut engine = FixtureEngine::new(catalog.clone());
    engine.reject_attribute = Some(("MaxSessions".to_string(), 2583));

    let mut load = LoadSession::with_transport(engine);
    load.configure(attributes()).unwrap();
    let err = load.initiate().await.unwrap_err();
    assert!(matches!(
        err,
        TransferError::Negotiation(NegotiationError::AttributeRejected { ref key, remote_code: 2583 })
            if key == "max_sessions"
    ));
    assert_eq!(load.state(), SessionState::Configured);

    let attrs = SessionAttributes::builder()
        .host("fixture")
        .username("dbc")
        .sessions(1, 4)
        .build()
        .unwrap();
    load.configure(attrs).unwrap();
    load.initiate().await.unwrap();
    assert_eq!(load.state(), SessionState::Initiated);

    // negotiated twice, once per attempt
    assert_eq!(catalog.lock().unwrap().negotiated.len(), 2);
    assert!(matches!(
        load.configure(attributes()),
        Err(TransferError::Configuration(
            ConfigurationError::InvalidStateTransition { .. }
        ))
    ));
}

#[tokio::test]
async fn test_remote_rejections_map_to_input_rows() {
    let mut engine = FixtureEngine::new(customers_catalog());
    engine.refuse_key = Some(Value::Int(4));

    let attrs = SessionAttributes::builder()
        .host("fixture")
        .username("dbc")
        .buffer_max_size(32)
        .build()
        .unwrap();
    let mut load = LoadSession::open(engine, attrs).await.unwrap();
    load.set_target("db.customers").await.unwrap();

    let rows: Vec<_> = (0..7).map(|id| customer(id, "a")).collect();
    let outcome = load.put_rows(&rows).await.unwrap();

    assert_eq!(outcome.accepted, 6);
    assert_eq!(outcome.rejected_rows(), vec![4]);
    let summary = load.close().await.unwrap();
    // 3 rows per 32-byte buffer
    assert_eq!(summary.buffers, 3);
}

#[tokio::test]
async fn test_put_text_lines() {
    let catalog = customers_catalog();
    let mut load = open_load(FixtureEngine::new(catalog.clone())).await;

    let outcome = load
        .put_text(["1|Alice", "2|NULL", "x|Bob", "4"])
        .await
        .unwrap();
    assert_eq!(outcome.accepted, 2);
    assert_eq!(outcome.rejected_rows(), vec![2, 3]);
    assert_eq!(load.summary().rejected, 2);

    assert_eq!(
        table_rows(&catalog, "db.customers"),
        vec![customer(1, "Alice"), vec![Value::Int(2), Value::Null]]
    );
}

#[tokio::test]
async fn test_drain_buffers_from_channel() {
    let catalog = customers_catalog();
    let mut load = open_load(FixtureEngine::new(catalog.clone())).await;

    let (sender, receiver) = BufferChannel::bounded(2);
    let producer = tokio::spawn(async move {
        let encoder = RowEncoder::new();
        for chunk in [[1, 2], [3, 4], [5, 6]] {
            let mut builder = BufferBuilder::new(1024);
            for id in chunk {
                builder.push(&encoder.encode(&customer(id, "c"), &customers_schema()).unwrap());
            }
            sender.send(builder.finish()).await.unwrap();
        }
    });

    let summary = load.drain(receiver).await.unwrap();
    producer.await.unwrap();
    assert_eq!(summary.accepted, 6);
    assert_eq!(summary.rejected, 0);
    assert_eq!(table_rows(&catalog, "db.customers").len(), 6);
}

#[tokio::test]
async fn test_round_trip_through_engine() {
    let catalog = catalog();
    let schema = ColumnSchema::new(vec![
        Column::integer("id").not_null(),
        Column::char("code", 5),
        Column::varchar("name", 20),
        Column::decimal("balance", 12, 2),
        Column::date("opened"),
        Column::time("cutoff", 0),
        Column::timestamp("updated", 6),
        Column::bigint("visits"),
    ]);
    add_table(&catalog, "db.accounts", schema, Vec::new());

    let opened = NaiveDate::from_ymd_opt(2019, 7, 4).unwrap();
    let rows = vec![
        vec![
            Value::Int(1),
            Value::from("AB"),
            Value::from("Grace Hopper"),
            Value::Decimal(Decimal::new(-12_345_67, 2)),
            Value::Date(opened),
            Value::Time(chrono::NaiveTime::from_hms_opt(17, 30, 0).unwrap()),
            Value::Timestamp(opened.and_hms_micro_opt(8, 15, 1, 250_000).unwrap()),
            Value::Int(9_000_000_000),
        ],
        vec![
            Value::Int(2),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ],
    ];

    let mut load = LoadSession::open(FixtureEngine::new(catalog.clone()), attributes())
        .await
        .unwrap();
    load.set_target("db.accounts").await.unwrap();
    let outcome = load.put_rows(&rows).await.unwrap();
    assert_eq!(outcome.accepted, 2);
    load.close().await.unwrap();

    let mut export = ExportSession::open(FixtureEngine::new(catalog), attributes())
        .await
        .unwrap();
    export.set_query("db.accounts").await.unwrap();
    let exported: Vec<_> = export
        .fetch_all()
        .await
        .unwrap()
        .into_iter()
        .filter_map(Record::into_values)
        .collect();
    export.close().await.unwrap();

    assert_eq!(exported, rows);
}
