//! End-to-end conversions against the simulated lake.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use recast_catalog::{CatalogError, Column};
use recast_convert::{
    ConvertConfig, ConvertError, ConvertOptions, Converter, DatabaseConversion, FailurePolicy,
    TableConversion,
};
use recast_core::StorageFormat;
use recast_query::{
    BatchExecutions, InMemoryQueryService, QueryClient, QueryExecution, QueryService, QueryState, ResultPage,
    StartQueryRequest, WorkGroup, WorkGroupConfig,
};
use recast_test_utils::{
    assert_partition_values, assert_table_absent, assert_table_columns, init_test_logging,
    TestLake, RESULTS_ROOT, TARGET_ROOT,
};

const EVENT_COLUMNS: &[(&str, &str)] = &[("id", "int"), ("name", "string"), ("dt", "string")];
const FILE_BYTES: u64 = 12;

fn converter(lake: &TestLake) -> Converter {
    converter_with(lake, ConvertOptions::new(StorageFormat::Parquet, TARGET_ROOT, lake.destination()))
}

fn converter_with(lake: &TestLake, options: ConvertOptions) -> Converter {
    lake.catalog.insert_database("curated").unwrap();
    Converter::new(lake.catalog_client(), lake.query_client(), options)
}

fn seed_events(lake: &TestLake) {
    lake.seed_table(
        "events",
        EVENT_COLUMNS,
        &["dt"],
        &[&["2024-01-01"], &["2024-01-02"]],
    );
}

fn partitioned(table: &str, columns: &[&str]) -> TableConversion {
    TableConversion::new("raw", "curated", table)
        .with_partition_columns(Some(columns.iter().map(|c| (*c).to_string()).collect()))
}

#[tokio::test(start_paused = true)]
async fn partitioned_table_converts_end_to_end() {
    init_test_logging();
    let lake = TestLake::new();
    seed_events(&lake);

    let scanned = converter(&lake)
        .convert_table(&partitioned("events", &["dt", "not_a_column"]))
        .await
        .unwrap();

    assert_eq!(scanned, 2 * FILE_BYTES);
    let submitted = lake.queries.submitted().unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(
        submitted[0].query,
        "create table curated.ctas_events with (format='parquet',\
         external_location='s3://lake/curated/ctas/ctas_events/',\
         parquet_compression='snappy',partitioned_by=ARRAY['dt']) \
         as select \"id\",\"name\",\"dt\" from raw.events"
    );

    assert_table_columns(
        &lake.catalog,
        "curated",
        "events",
        &[Column::new("id", "int"), Column::new("name", "string")],
    );
    let table = lake.catalog.table("curated", "events").unwrap().unwrap();
    assert_eq!(table.partition_keys, vec![Column::new("dt", "string")]);
    assert_eq!(table.location(), Some("s3://lake/curated/events/"));
    assert_eq!(table.parameters["classification"], "parquet");

    assert_partition_values(&lake.catalog, "curated", "events", &[&["2024-01-01"], &["2024-01-02"]]);
    for partition in lake.catalog.partitions("curated", "events").unwrap() {
        assert!(partition.location().unwrap().starts_with("s3://lake/curated/events/dt="));
    }
    assert_eq!(lake.storage.keys_under("s3://lake/curated/events/").len(), 2);

    assert_table_absent(&lake.catalog, "curated", "ctas_events");
    assert!(lake.catalog.partitions("curated", "ctas_events").unwrap().is_empty());
    // Temporary files are left in place.
    assert_eq!(lake.storage.keys_under("s3://lake/curated/ctas/ctas_events/").len(), 2);
    assert!(lake.storage.keys_under(RESULTS_ROOT).is_empty());
}

#[tokio::test(start_paused = true)]
async fn unpartitioned_table_selects_everything() {
    let lake = TestLake::new();
    lake.seed_table("users", &[("id", "int"), ("email", "string")], &[], &[]);

    let scanned = converter(&lake)
        .convert_table(&TableConversion::new("raw", "curated", "users"))
        .await
        .unwrap();

    assert_eq!(scanned, FILE_BYTES);
    assert!(lake.queries.submitted().unwrap()[0]
        .query
        .ends_with("as select * from raw.users"));
    assert_eq!(
        lake.storage.keys_under("s3://lake/curated/users/"),
        vec!["s3://lake/curated/users/part-00000.csv".to_string()]
    );
    assert_table_absent(&lake.catalog, "curated", "ctas_users");
}

#[tokio::test(start_paused = true)]
async fn converting_twice_is_idempotent() {
    let lake = TestLake::new();
    seed_events(&lake);
    let converter = converter(&lake);

    converter.convert_table(&partitioned("events", &["dt"])).await.unwrap();
    converter.convert_table(&partitioned("events", &["dt"])).await.unwrap();

    assert_partition_values(&lake.catalog, "curated", "events", &[&["2024-01-01"], &["2024-01-02"]]);
    assert_table_absent(&lake.catalog, "curated", "ctas_events");
}

#[tokio::test(start_paused = true)]
async fn failed_query_is_reported_and_cleaned_up() {
    let lake = TestLake::new();
    seed_events(&lake);
    lake.simulator.fail_table("events");

    let err = converter(&lake)
        .convert_table(&partitioned("events", &["dt"]))
        .await
        .unwrap_err();

    let execution = err.failed_execution().expect("query failure");
    assert_eq!(execution.state, QueryState::Failed);
    assert!(lake.catalog.table("curated", "events").unwrap().is_none());
    assert_table_absent(&lake.catalog, "curated", "ctas_events");
    assert!(lake.storage.keys_under(RESULTS_ROOT).is_empty());
}

#[tokio::test(start_paused = true)]
async fn temporary_table_is_deleted_when_the_copy_fails() {
    let lake = TestLake::new();
    seed_events(&lake);
    lake.storage.inject_failure("s3://lake/curated/events/");

    let err = converter(&lake)
        .convert_table(&partitioned("events", &["dt"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConvertError::Catalog(CatalogError::Core(recast_core::Error::Storage { .. }))
    ));
    assert_table_absent(&lake.catalog, "curated", "ctas_events");
    // Metadata only: the converted files stay for a retry.
    assert_eq!(lake.storage.keys_under("s3://lake/curated/ctas/ctas_events/").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn bucketing_without_count_never_submits_a_query() {
    let lake = TestLake::new();
    seed_events(&lake);

    let err = converter(&lake)
        .convert_table(&TableConversion::new("raw", "curated", "events").with_bucketing(vec!["id".into()], None))
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(lake.queries.submitted().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn one_failing_table_does_not_stop_the_batch() {
    let lake = TestLake::new();
    for table in ["alpha", "bravo", "charlie"] {
        lake.seed_table(table, &[("id", "int")], &[], &[]);
    }
    lake.simulator.fail_table("bravo");
    let converter = converter_with(
        &lake,
        ConvertOptions::new(StorageFormat::Parquet, TARGET_ROOT, lake.destination()).with_max_concurrent(2),
    );
    let conversion = DatabaseConversion::new("raw", "curated");

    let report = converter.convert_database_report(&conversion).await.unwrap();
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.tables_converted(), 2);
    assert_eq!(report.failed_tables(), vec!["bravo"]);
    assert_eq!(report.bytes_scanned(), 2 * FILE_BYTES);
    assert!(lake.catalog.table("curated", "alpha").unwrap().is_some());
    assert!(lake.catalog.table("curated", "charlie").unwrap().is_some());
    for table in ["ctas_alpha", "ctas_bravo", "ctas_charlie"] {
        assert_table_absent(&lake.catalog, "curated", table);
    }

    let err = converter.convert_database(&conversion).await.unwrap_err();
    let execution = err.failed_execution().expect("query failure surfaces");
    assert!(execution.query.as_deref().unwrap().contains("from raw.bravo"));
}

/// Query service that tracks how many executions are running at once.
struct InFlight {
    inner: Arc<InMemoryQueryService>,
    running: Mutex<BTreeSet<String>>,
    peak: Mutex<usize>,
}

impl InFlight {
    fn new(inner: Arc<InMemoryQueryService>) -> Self {
        Self {
            inner,
            running: Mutex::new(BTreeSet::new()),
            peak: Mutex::new(0),
        }
    }

    fn peak(&self) -> usize {
        *self.peak.lock().unwrap()
    }
}

#[async_trait]
impl QueryService for InFlight {
    async fn start_query_execution(&self, request: StartQueryRequest) -> recast_query::Result<String> {
        let id = self.inner.start_query_execution(request).await?;
        let mut running = self.running.lock().unwrap();
        running.insert(id.clone());
        let mut peak = self.peak.lock().unwrap();
        *peak = (*peak).max(running.len());
        Ok(id)
    }

    async fn get_query_execution(&self, id: &str) -> recast_query::Result<QueryExecution> {
        let execution = self.inner.get_query_execution(id).await?;
        if execution.is_terminal() {
            self.running.lock().unwrap().remove(id);
        }
        Ok(execution)
    }

    async fn batch_get_query_execution(&self, ids: &[String]) -> recast_query::Result<BatchExecutions> {
        self.inner.batch_get_query_execution(ids).await
    }

    async fn get_query_results(&self, id: &str, page_token: Option<&str>) -> recast_query::Result<ResultPage> {
        self.inner.get_query_results(id, page_token).await
    }

    async fn stop_query_execution(&self, id: &str) -> recast_query::Result<()> {
        self.inner.stop_query_execution(id).await
    }

    async fn get_work_group(&self, name: &str) -> recast_query::Result<Option<WorkGroup>> {
        self.inner.get_work_group(name).await
    }

    async fn create_work_group(&self, config: WorkGroupConfig) -> recast_query::Result<()> {
        self.inner.create_work_group(config).await
    }
}

async fn peak_running(tables: usize, max_concurrent: usize) -> usize {
    let lake = TestLake::new();
    for i in 0..tables {
        lake.seed_table(&format!("table_{i}"), &[("id", "int")], &[], &[]);
    }
    lake.catalog.insert_database("curated").unwrap();
    let tracker = Arc::new(InFlight::new(lake.queries.clone()));
    let converter = Converter::new(
        lake.catalog_client(),
        QueryClient::new(tracker.clone(), Arc::new(lake.storage.clone())),
        ConvertOptions::new(StorageFormat::Parquet, TARGET_ROOT, lake.destination())
            .with_max_concurrent(max_concurrent),
    );

    let summary = converter
        .convert_database(&DatabaseConversion::new("raw", "curated"))
        .await
        .unwrap();
    assert_eq!(summary.tables_converted, tables);
    tracker.peak()
}

#[tokio::test(start_paused = true)]
async fn conversions_never_exceed_the_worker_limit() {
    assert_eq!(peak_running(5, 2).await, 2);
    assert_eq!(peak_running(3, 10).await, 3);
    assert_eq!(peak_running(4, 1).await, 1);
}

#[tokio::test(start_paused = true)]
async fn successful_database_conversion_reports_totals() {
    let lake = TestLake::new();
    seed_events(&lake);
    lake.seed_table("users", &[("id", "int"), ("region", "string")], &[], &[]);
    let config = ConvertConfig::from_json(
        r#"{"tables": {"events": {"partition_by": ["dt"]}}, "default_partition_by": ["region"]}"#,
    )
    .unwrap();
    let converter = converter_with(
        &lake,
        ConvertOptions::from_config(&config, StorageFormat::Parquet, TARGET_ROOT)
            .with_failure_policy(FailurePolicy::FirstErrorWins),
    );

    // No destination in the config: fall back to the lake's result location.
    let converter = Converter::new(
        lake.catalog_client(),
        lake.query_client(),
        ConvertOptions {
            destination: lake.destination(),
            ..converter.options().clone()
        },
    );
    let summary = converter
        .convert_database(&DatabaseConversion::new("raw", "curated").with_config(&config))
        .await
        .unwrap();

    assert_eq!(summary.tables_converted, 2);
    assert_eq!(summary.bytes_scanned, 3 * FILE_BYTES);
    assert!(summary.cost > 0.0);

    let users = lake.catalog.table("curated", "users").unwrap().unwrap();
    assert_eq!(users.partition_keys, vec![Column::new("region", "string")]);
    let events = lake.catalog.table("curated", "events").unwrap().unwrap();
    assert_eq!(events.partition_keys, vec![Column::new("dt", "string")]);
}

#[tokio::test(start_paused = true)]
async fn empty_database_converts_nothing() {
    let lake = TestLake::new();
    lake.catalog.insert_database("empty").unwrap();

    let summary = converter(&lake)
        .convert_database(&DatabaseConversion::new("empty", "curated"))
        .await
        .unwrap();

    assert_eq!(summary.tables_converted, 0);
    assert!(lake.queries.submitted().unwrap().is_empty());
    assert!(lake.catalog.has_database("curated").unwrap());
}

#[tokio::test(start_paused = true)]
async fn missing_destination_fails_every_table_as_configuration() {
    let lake = TestLake::new();
    lake.seed_table("users", &[("id", "int")], &[], &[]);
    let converter = converter_with(
        &lake,
        ConvertOptions::new(StorageFormat::Json, TARGET_ROOT, recast_query::QueryDestination::default()),
    );

    let err = converter
        .convert_database(&DatabaseConversion::new("raw", "curated"))
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}
