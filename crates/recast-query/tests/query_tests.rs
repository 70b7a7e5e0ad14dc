//! Query client, waiter and result pager against the scripted service.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recast_core::{MemoryBackend, StorageBackend};
use recast_query::{
    InMemoryQueryService, QueryClient, QueryDestination, QueryError, QueryService, QueryState,
    QueryWaiter, ScriptedOutcome, StartQueryRequest, WaitOptions,
};

struct Harness {
    client: QueryClient,
    service: Arc<InMemoryQueryService>,
    storage: MemoryBackend,
}

fn harness(service: InMemoryQueryService) -> Harness {
    let storage = MemoryBackend::new();
    let service = Arc::new(service.with_results_storage(storage.clone()));
    let client = QueryClient::new(service.clone(), Arc::new(storage.clone()));
    Harness {
        client,
        service,
        storage,
    }
}

fn destination() -> QueryDestination {
    QueryDestination::location("s3://query-results/recast/")
}

fn values(items: &[&str]) -> Vec<Option<String>> {
    items.iter().map(|v| Some((*v).to_string())).collect()
}

async fn submit(service: &InMemoryQueryService, sql: &str) -> String {
    service
        .start_query_execution(StartQueryRequest {
            database: "analytics".into(),
            query: sql.into(),
            destination: destination(),
        })
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn poll_delays_grow_linearly_up_to_the_cap() {
    let service = Arc::new(InMemoryQueryService::with_handler(|_| {
        ScriptedOutcome::succeeded().with_pending_polls(5)
    }));
    let id = submit(&service, "select 1").await;

    let options = WaitOptions::default().with_max_delay(Duration::from_secs(3));
    let execution = QueryWaiter::new(service.clone())
        .wait_for(&id, &options)
        .await
        .unwrap();
    assert_eq!(execution.state, QueryState::Succeeded);

    let polls = service.polls(&id).unwrap();
    let gaps: Vec<u64> = polls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
    assert_eq!(gaps, vec![1, 2, 3, 3, 3]);
}

#[tokio::test(start_paused = true)]
async fn each_wait_starts_a_fresh_schedule() {
    let service = Arc::new(InMemoryQueryService::with_handler(|_| {
        ScriptedOutcome::succeeded().with_pending_polls(2)
    }));
    let waiter = QueryWaiter::new(service.clone());
    let first = submit(&service, "select 1").await;
    let second = submit(&service, "select 2").await;

    waiter.wait_for(&first, &WaitOptions::default()).await.unwrap();
    waiter.wait_for(&second, &WaitOptions::default()).await.unwrap();

    let polls = service.polls(&second).unwrap();
    let gaps: Vec<u64> = polls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
    assert_eq!(gaps, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn wait_times_out_before_sleeping_past_the_deadline() {
    let service = Arc::new(InMemoryQueryService::with_handler(|_| {
        ScriptedOutcome::succeeded().never_finishes()
    }));
    let id = submit(&service, "select 1").await;

    let options = WaitOptions::default().with_deadline(Duration::from_secs(2));
    let err = QueryWaiter::new(service.clone())
        .wait_for(&id, &options)
        .await
        .unwrap_err();

    match err {
        QueryError::Timeout { waited, pending } => {
            assert_eq!(waited, Duration::from_secs(1));
            assert_eq!(pending, vec![id.clone()]);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    // The deadline stops waiting, not the query.
    assert!(service.stopped().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn wait_for_all_returns_every_final_status() {
    let service = Arc::new(InMemoryQueryService::with_handler(|request| {
        if request.query.contains("broken") {
            ScriptedOutcome::failed("SYNTAX_ERROR").with_pending_polls(1)
        } else {
            ScriptedOutcome::succeeded().with_pending_polls(3)
        }
    }));
    let ok = submit(&service, "select 1").await;
    let broken = submit(&service, "select broken").await;
    let lost = submit(&service, "select 2").await;
    service.mark_unprocessed(&lost, "execution expired").unwrap();

    let ids = vec![ok.clone(), broken.clone(), lost.clone()];
    let done = QueryWaiter::new(service.clone())
        .wait_for_all(&ids, &WaitOptions::default())
        .await
        .unwrap();

    assert_eq!(done.len(), 3);
    assert_eq!(done[&ok].state, QueryState::Succeeded);
    assert_eq!(done[&broken].state, QueryState::Failed);
    assert_eq!(done[&broken].state_change_reason.as_deref(), Some("SYNTAX_ERROR"));
    assert_eq!(done[&lost].state, QueryState::Failed);
    assert_eq!(done[&lost].state_change_reason.as_deref(), Some("execution expired"));
}

#[tokio::test]
async fn submit_without_destination_is_a_configuration_error() {
    let h = harness(InMemoryQueryService::new());
    let err = h
        .client
        .submit("analytics", "select 1", &QueryDestination::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::Core(recast_core::Error::Configuration(_))
    ));
    assert!(h.service.submitted().unwrap().is_empty());
}

#[tokio::test]
async fn run_reports_failed_queries_with_their_status() {
    let h = harness(InMemoryQueryService::with_handler(|_| {
        ScriptedOutcome::failed("TABLE_NOT_FOUND")
    }));
    let err = h
        .client
        .run("analytics", "select * from missing", &destination(), false)
        .await
        .unwrap_err();

    let execution = err.execution().expect("failed execution attached");
    assert_eq!(execution.state, QueryState::Failed);
    assert_eq!(execution.state_change_reason.as_deref(), Some("TABLE_NOT_FOUND"));
}

#[tokio::test]
async fn run_deletes_output_when_asked() {
    let h = harness(InMemoryQueryService::with_handler(|_| {
        ScriptedOutcome::succeeded().with_statistics(1 << 30, 120)
    }));
    let kept = h
        .client
        .run("analytics", "select 1", &destination(), false)
        .await
        .unwrap();
    let deleted = h
        .client
        .run("analytics", "select 2", &destination(), true)
        .await
        .unwrap();

    let keys = h.storage.keys().unwrap();
    assert_eq!(keys, vec![kept.result_location.clone().unwrap()]);
    assert!(!keys.contains(&deleted.result_location.unwrap()));
    assert!(kept.cost() > 0.0);
}

/// Object store whose deletes always fail.
struct UndeletableStorage(MemoryBackend);

#[async_trait]
impl StorageBackend for UndeletableStorage {
    async fn list_prefix(&self, uri: &str) -> recast_core::Result<Vec<String>> {
        self.0.list_prefix(uri).await
    }

    async fn copy_prefix(&self, source_uri: &str, target_uri: &str) -> recast_core::Result<usize> {
        self.0.copy_prefix(source_uri, target_uri).await
    }

    async fn delete_prefix(&self, uri: &str) -> recast_core::Result<()> {
        Err(recast_core::Error::storage(format!("access denied deleting {uri}")))
    }
}

#[tokio::test]
async fn failed_query_is_reported_even_if_output_cannot_be_deleted() {
    let storage = MemoryBackend::new();
    let service = Arc::new(
        InMemoryQueryService::with_handler(|request| {
            if request.query.contains("missing") {
                ScriptedOutcome::failed("TABLE_NOT_FOUND")
            } else {
                ScriptedOutcome::succeeded()
            }
        })
        .with_results_storage(storage.clone()),
    );
    let client = QueryClient::new(service, Arc::new(UndeletableStorage(storage)));

    let err = client
        .run("analytics", "select * from missing", &destination(), true)
        .await
        .unwrap_err();
    let execution = err.execution().expect("failed execution attached");
    assert_eq!(execution.state_change_reason.as_deref(), Some("TABLE_NOT_FOUND"));

    let err = client
        .run("analytics", "select 1", &destination(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Core(_)));
}

#[tokio::test]
async fn results_skip_the_header_and_span_pages() {
    let rows = vec![values(&["1", "a"]), values(&["2", "b"]), vec![Some("3".into()), None]];
    let h = harness(
        InMemoryQueryService::with_handler(move |_| {
            ScriptedOutcome::succeeded().with_rows(&["id", "name"], rows.clone())
        })
        .with_page_size(2),
    );
    let execution = h
        .client
        .run("analytics", "select id, name from t", &destination(), false)
        .await
        .unwrap();

    let rows = h.client.collect_results(&execution.id, None, false).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["id"].as_deref(), Some("1"));
    assert_eq!(rows[1]["name"].as_deref(), Some("b"));
    assert_eq!(rows[2]["name"], None);
}

#[tokio::test]
async fn first_row_is_kept_when_it_is_not_the_header() {
    let service = InMemoryQueryService::new();
    service
        .register(
            "seeded",
            ScriptedOutcome::succeeded().with_rows(&["n"], vec![values(&["n"]), values(&["7"])]),
        )
        .unwrap();
    let h = harness(service);

    // Header row plus a data row that happens to equal the header.
    let rows = h.client.collect_results("seeded", None, false).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["n"].as_deref(), Some("7"));
}

#[tokio::test]
async fn max_rows_stops_early_and_deletes_output() {
    let rows: Vec<_> = (0..10).map(|i| values(&[&i.to_string()])).collect();
    let h = harness(InMemoryQueryService::with_handler(move |_| {
        ScriptedOutcome::succeeded().with_rows(&["n"], rows.clone())
    }));
    let execution = h
        .client
        .run("analytics", "select n from t", &destination(), false)
        .await
        .unwrap();
    assert_eq!(h.storage.keys().unwrap().len(), 1);

    let rows = h.client.collect_results(&execution.id, Some(4), true).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3]["n"].as_deref(), Some("3"));
    assert!(h.storage.keys().unwrap().is_empty());
}

#[tokio::test]
async fn show_partitions_flattens_rows_and_cleans_up() {
    let h = harness(InMemoryQueryService::with_handler(|_| {
        ScriptedOutcome::succeeded().with_rows(
            &["partition"],
            vec![values(&["dt=2024-01-01"]), values(&["dt=2024-01-02"])],
        )
    }));
    let partitions = h
        .client
        .show_partitions("analytics", "events", &destination())
        .await
        .unwrap();

    assert_eq!(partitions, vec!["dt=2024-01-01", "dt=2024-01-02"]);
    assert_eq!(
        h.service.submitted().unwrap()[0].query,
        "show partitions analytics.events"
    );
    assert!(h.storage.keys().unwrap().is_empty());
}

#[tokio::test]
async fn repair_partitions_issues_msck() {
    let h = harness(InMemoryQueryService::new());
    h.client
        .repair_partitions("analytics", "events", &QueryDestination::workgroup("etl"))
        .await
        .unwrap();
    let submitted = h.service.submitted().unwrap();
    assert_eq!(submitted[0].query, "msck repair table analytics.events");
    assert_eq!(submitted[0].destination.workgroup.as_deref(), Some("etl"));
    assert!(h.storage.keys().unwrap().is_empty());
}

#[tokio::test]
async fn cancel_stops_the_execution() {
    let h = harness(InMemoryQueryService::with_handler(|_| {
        ScriptedOutcome::succeeded().never_finishes()
    }));
    let id = h.client.submit("analytics", "select 1", &destination()).await.unwrap();
    h.client.cancel(&id).await.unwrap();
    assert_eq!(h.client.status(&id).await.unwrap().state, QueryState::Cancelled);
}

#[tokio::test]
async fn ensure_workgroup_is_idempotent() {
    let h = harness(InMemoryQueryService::new());
    assert!(h
        .client
        .ensure_workgroup("etl", "s3://query-results/etl/", None)
        .await
        .unwrap());
    assert!(!h
        .client
        .ensure_workgroup("etl", "s3://query-results/etl/", Some("ETL jobs".into()))
        .await
        .unwrap());
}

#[tokio::test]
async fn disabled_workgroup_is_an_error() {
    let service = InMemoryQueryService::new();
    service.insert_disabled_work_group("etl").unwrap();
    let h = harness(service);
    let err = h
        .client
        .ensure_workgroup("etl", "s3://query-results/etl/", None)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Service { .. }));
}
