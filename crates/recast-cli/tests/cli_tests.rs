//! Commands run end to end against the simulated lake.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use clap::Parser;

use recast_cli::commands::{convert_database, convert_table, copy_table, partitions, workgroup};
use recast_cli::{Cli, Commands, Context, OutputFormat, Settings};
use recast_test_utils::{assert_partition_values, assert_table_absent, TestLake, RESULTS_ROOT};

fn context(lake: &TestLake, format: OutputFormat) -> Context {
    lake.catalog.insert_database("curated").unwrap();
    let mut settings = Settings {
        format,
        ..Settings::default()
    };
    settings.convert.query_result_location = Some(RESULTS_ROOT.to_string());
    Context::new(lake.catalog_client(), lake.query_client(), settings)
}

fn parse(args: &[&str]) -> Commands {
    Cli::parse_from(std::iter::once("recast").chain(args.iter().copied())).command
}

fn seed_events(lake: &TestLake) {
    lake.seed_table(
        "events",
        &[("id", "int"), ("name", "string"), ("dt", "string")],
        &["dt"],
        &[&["2024-01-01"], &["2024-01-02"]],
    );
}

#[tokio::test(start_paused = true)]
async fn convert_table_command_partitions_the_copy() {
    let lake = TestLake::new();
    seed_events(&lake);
    let ctx = context(&lake, OutputFormat::Json);

    let Commands::ConvertTable(args) = parse(&[
        "convert-table",
        "raw",
        "curated",
        "events",
        "--target-uri",
        "s3://lake/curated/",
        "--partition-by",
        "dt",
    ]) else {
        panic!("expected convert-table");
    };
    convert_table::execute(args, &ctx).await.unwrap();

    assert_partition_values(&lake.catalog, "curated", "events", &[&["2024-01-01"], &["2024-01-02"]]);
    assert_table_absent(&lake.catalog, "curated", "ctas_events");
}

#[tokio::test(start_paused = true)]
async fn convert_database_command_fails_when_a_table_fails() {
    let lake = TestLake::new();
    lake.seed_table("alpha", &[("id", "int")], &[], &[]);
    lake.seed_table("bravo", &[("id", "int")], &[], &[]);
    lake.simulator.fail_table("bravo");
    let ctx = context(&lake, OutputFormat::Table);

    let Commands::ConvertDatabase(args) = parse(&[
        "convert-database",
        "raw",
        "curated",
        "--target-uri",
        "s3://lake/curated/",
        "--max-concurrent",
        "1",
    ]) else {
        panic!("expected convert-database");
    };
    let err = convert_database::execute(args, &ctx).await.unwrap_err();

    assert!(err.to_string().contains("1 of 2 tables failed"));
    assert!(lake.catalog.table("curated", "alpha").unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn copy_table_command_can_skip_files() {
    let lake = TestLake::new();
    seed_events(&lake);
    let ctx = context(&lake, OutputFormat::Text);

    let Commands::CopyTable(args) = parse(&[
        "copy-table",
        "raw",
        "curated",
        "events",
        "events_copy",
        "--target-location",
        "s3://lake/copies/events/",
        "--target-format",
        "csv",
        "--partition-by",
        "dt",
        "--skip-files",
    ]) else {
        panic!("expected copy-table");
    };
    copy_table::execute(args, &ctx).await.unwrap();

    let copy = lake.catalog.table("curated", "events_copy").unwrap().unwrap();
    assert_eq!(copy.location(), Some("s3://lake/copies/events/"));
    assert_partition_values(&lake.catalog, "curated", "events_copy", &[&["2024-01-01"], &["2024-01-02"]]);
    assert!(lake.storage.keys_under("s3://lake/copies/").is_empty());
}

#[tokio::test(start_paused = true)]
async fn partition_and_workgroup_commands_run_queries() {
    let lake = TestLake::new();
    seed_events(&lake);
    let ctx = context(&lake, OutputFormat::Text);

    let Commands::RepairPartitions(args) = parse(&["repair-partitions", "raw", "events"]) else {
        panic!("expected repair-partitions");
    };
    partitions::repair(args, &ctx).await.unwrap();

    let Commands::ShowPartitions(args) = parse(&["show-partitions", "raw", "events"]) else {
        panic!("expected show-partitions");
    };
    partitions::show(args, &ctx).await.unwrap();

    let queries: Vec<String> = lake.queries.submitted().unwrap().into_iter().map(|r| r.query).collect();
    assert_eq!(queries, vec!["msck repair table raw.events", "show partitions raw.events"]);
    assert!(lake.storage.keys_under(RESULTS_ROOT).is_empty());

    let Commands::EnsureWorkgroup(args) = parse(&["ensure-workgroup", "etl", "--output-location", RESULTS_ROOT]) else {
        panic!("expected ensure-workgroup");
    };
    workgroup::execute(args, &ctx).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn missing_destination_is_reported() {
    let lake = TestLake::new();
    seed_events(&lake);
    let ctx = Context::new(lake.catalog_client(), lake.query_client(), Settings::default());

    let Commands::ShowPartitions(args) = parse(&["show-partitions", "raw", "events"]) else {
        panic!("expected show-partitions");
    };
    let err = partitions::show(args, &ctx).await.unwrap_err();
    assert!(format!("{err:#}").contains("missing output location"));
}
