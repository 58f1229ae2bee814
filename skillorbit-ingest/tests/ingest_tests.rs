//! End-to-end tests for the catalog refresh
//!
//! Real `.xlsx` bytes in, on-disk SQLite out.

mod helpers;

use std::time::Duration;

use chrono::NaiveDate;
use helpers::*;
use skillorbit_common::config::UnparsableDatePolicy;
use skillorbit_ingest::{IngestOptions, IngestionError, Ingestor};
use tokio_util::sync::CancellationToken;

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

#[tokio::test]
async fn test_refresh_loads_valid_rows_and_reports_dropped_ones() {
    let (_dir, pool) = test_pool().await;
    seed_prior_catalog(&pool).await;

    let result = Ingestor::default()
        .ingest(source(catalog_workbook()), &pool)
        .await
        .expect("refresh should succeed");

    assert_eq!(result.trainers_loaded, 2);
    assert_eq!(result.trainings_loaded, 2);
    assert_eq!(result.warnings.len(), 1, "warnings: {:?}", result.warnings);
    assert!(result.warnings[0].contains("trainer row 3"), "{}", result.warnings[0]);
    assert!(result.warnings[0].contains("'competency'"), "{}", result.warnings[0]);

    let after = snapshot(&pool).await;
    let names: Vec<_> = after.trainers.iter().map(|t| t.trainer_name.as_deref()).collect();
    assert_eq!(names, vec![Some("Ferris"), Some("Corro")]);
    assert!(
        after.trainers.iter().all(|t| t.competency != "COBOL"),
        "prior trainer survived the refresh"
    );
}

#[tokio::test]
async fn test_date_cells_and_date_text_store_calendar_dates() {
    let (_dir, pool) = test_pool().await;

    Ingestor::default()
        .ingest(source(catalog_workbook()), &pool)
        .await
        .unwrap();

    let trainings = snapshot(&pool).await.trainings;
    assert_eq!(trainings[0].training_name, "Async Rust");
    assert_eq!(trainings[0].training_date, date(2024, 3, 15));
    assert_eq!(trainings[1].training_date, date(2024, 4, 2));
}

#[tokio::test]
async fn test_numeric_fields_stored_as_text() {
    let (_dir, pool) = test_pool().await;

    Ingestor::default()
        .ingest(source(catalog_workbook()), &pool)
        .await
        .unwrap();

    let trainings = snapshot(&pool).await.trainings;
    assert_eq!(trainings[0].duration.as_deref(), Some("8"));
    assert_eq!(trainings[0].seats.as_deref(), Some("20"));
    assert_eq!(trainings[1].duration, None);
    assert_eq!(trainings[1].seats.as_deref(), Some("12"));
}

#[tokio::test]
async fn test_string_date_and_date_cell_agree() {
    let (_dir, pool) = test_pool().await;
    let bytes = workbook_bytes(&[
        trainers_sheet(vec![trainer_row("s", "c", "t", "l")]),
        trainings_sheet(vec![
            training_row("From cell", Value::Date(2024, 3, 15), Value::Blank, Value::Blank),
            training_row("From text", text("2024-03-15"), Value::Blank, Value::Blank),
        ]),
    ]);

    Ingestor::default().ingest(source(bytes), &pool).await.unwrap();

    let trainings = snapshot(&pool).await.trainings;
    assert_eq!(trainings[0].training_date, trainings[1].training_date);
    assert_eq!(trainings[0].training_date, date(2024, 3, 15));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (_dir, pool) = test_pool().await;
    let ingestor = Ingestor::default();

    let first = ingestor.ingest(source(catalog_workbook()), &pool).await.unwrap();
    let after_first = snapshot(&pool).await;
    let second = ingestor.ingest(source(catalog_workbook()), &pool).await.unwrap();
    let after_second = snapshot(&pool).await;

    assert_eq!(first, second);
    assert_eq!(after_first.trainers, after_second.trainers);
    assert_eq!(after_first.trainings, after_second.trainings);
}

#[tokio::test]
async fn test_fault_after_deletes_rolls_back_everything() {
    let (_dir, pool) = test_pool().await;
    seed_prior_catalog(&pool).await;
    sqlx::query(
        r#"
        CREATE TRIGGER fail_training_insert BEFORE INSERT ON training_details
        BEGIN
            SELECT RAISE(ABORT, 'injected fault');
        END
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();
    let before = snapshot(&pool).await;

    let err = Ingestor::default()
        .ingest(source(catalog_workbook()), &pool)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::StoreTransaction(_)), "got {:?}", err);
    assert!(err.to_string().contains("injected fault"), "{}", err);
    assert_eq!(snapshot(&pool).await, before);
}

#[tokio::test]
async fn test_assignments_cleared_without_dangling_references() {
    let (_dir, pool) = test_pool().await;
    seed_prior_catalog(&pool).await;

    Ingestor::default()
        .ingest(source(catalog_workbook()), &pool)
        .await
        .unwrap();

    let after = snapshot(&pool).await;
    assert!(after.assignments.is_empty());

    let dangling: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM training_assignments a
        LEFT JOIN training_details t ON a.training_id = t.id
        WHERE t.id IS NULL
        "#,
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(dangling, 0);
}

#[tokio::test]
async fn test_missing_sheet_leaves_store_untouched() {
    let (_dir, pool) = test_pool().await;
    seed_prior_catalog(&pool).await;
    let before = snapshot(&pool).await;
    let bytes = workbook_bytes(&[trainers_sheet(vec![trainer_row("s", "c", "t", "l")])]);

    let err = Ingestor::default().ingest(source(bytes), &pool).await.unwrap_err();

    match err {
        IngestionError::SheetMissing(sheet) => assert_eq!(sheet, "Training Details"),
        other => panic!("expected SheetMissing, got {:?}", other),
    }
    assert_eq!(snapshot(&pool).await, before);
}

#[tokio::test]
async fn test_non_workbook_source_rejected() {
    let (_dir, pool) = test_pool().await;
    seed_prior_catalog(&pool).await;
    let before = snapshot(&pool).await;

    let err = Ingestor::default()
        .ingest(source(b"skill,competency\nRust,Ownership\n".to_vec()), &pool)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::SourceRead(_)), "got {:?}", err);
    assert_eq!(snapshot(&pool).await, before);
}

#[tokio::test]
async fn test_blank_rows_are_padding() {
    let (_dir, pool) = test_pool().await;
    let bytes = workbook_bytes(&[
        trainers_sheet(vec![
            trainer_row("s", "First", "t", "l"),
            vec![Value::Blank; 4],
            trainer_row("s", "Second", "t", "l"),
        ]),
        trainings_sheet(vec![training_row("Only", Value::Blank, Value::Blank, Value::Blank)]),
    ]);

    let result = Ingestor::default().ingest(source(bytes), &pool).await.unwrap();

    assert_eq!(result.trainers_loaded, 2);
    assert!(result.warnings.is_empty(), "warnings: {:?}", result.warnings);
}

#[tokio::test]
async fn test_unparsable_date_policies() {
    let bytes = || {
        workbook_bytes(&[
            trainers_sheet(vec![trainer_row("s", "c", "t", "l")]),
            trainings_sheet(vec![
                training_row("Scheduled", text("2024-03-15"), Value::Blank, Value::Blank),
                training_row("Unscheduled", text("TBD"), Value::Blank, Value::Blank),
            ]),
        ])
    };

    let (_dir, pool) = test_pool().await;
    let kept = Ingestor::default().ingest(source(bytes()), &pool).await.unwrap();
    assert_eq!(kept.trainings_loaded, 2);
    assert_eq!(kept.warnings.len(), 1);
    assert_eq!(snapshot(&pool).await.trainings[1].training_date, None);

    let reject = Ingestor::new(IngestOptions {
        on_unparsable_date: UnparsableDatePolicy::RejectRow,
        ..IngestOptions::default()
    });
    let rejected = reject.ingest(source(bytes()), &pool).await.unwrap();
    assert_eq!(rejected.trainings_loaded, 1);
    assert!(rejected.warnings[0].contains("training row 3"), "{}", rejected.warnings[0]);
    assert!(rejected.warnings[0].contains("TBD"));
}

#[tokio::test]
async fn test_cancelled_refresh_changes_nothing() {
    let (_dir, pool) = test_pool().await;
    seed_prior_catalog(&pool).await;
    let before = snapshot(&pool).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Ingestor::default()
        .ingest_with_cancel(source(catalog_workbook()), &pool, cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::Cancelled), "got {:?}", err);
    assert_eq!(snapshot(&pool).await, before);
}

#[tokio::test]
async fn test_store_timeout_rolls_back() {
    let (_dir, pool) = test_pool().await;
    seed_prior_catalog(&pool).await;
    let before = snapshot(&pool).await;

    // Another writer holds the database lock for longer than the bound
    let mut blocker = pool.acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *blocker).await.unwrap();

    let ingestor = Ingestor::new(IngestOptions {
        store_timeout: Duration::from_millis(300),
        ..IngestOptions::default()
    });
    let err = ingestor
        .ingest(source(catalog_workbook()), &pool)
        .await
        .unwrap_err();

    sqlx::query("ROLLBACK").execute(&mut *blocker).await.unwrap();
    drop(blocker);

    assert!(matches!(err, IngestionError::StoreTimeout(_)), "got {:?}", err);
    assert_eq!(snapshot(&pool).await, before);
}

/// Hold a SHARED lock on a rollback-journal store so the refresh's COMMIT
/// waits until the returned connection ends its read
async fn hold_read_lock(pool: &sqlx::SqlitePool) -> sqlx::pool::PoolConnection<sqlx::Sqlite> {
    let mut reader = pool.acquire().await.unwrap();
    sqlx::query("BEGIN").execute(&mut *reader).await.unwrap();
    let _: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trainers")
        .fetch_one(&mut *reader)
        .await
        .unwrap();
    reader
}

#[tokio::test]
async fn test_cancel_during_commit_reports_what_the_store_did() {
    let (_dir, pool) = delete_journal_pool().await;
    seed_prior_catalog(&pool).await;
    let mut reader = hold_read_lock(&pool).await;

    let cancel = CancellationToken::new();
    let refresh = tokio::spawn({
        let pool = pool.clone();
        let cancel = cancel.clone();
        async move {
            Ingestor::default()
                .ingest_with_cancel(source(catalog_workbook()), &pool, cancel)
                .await
        }
    });

    // Parse, deletes and inserts are done; COMMIT is waiting on the reader
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!refresh.is_finished(), "refresh finished while the reader held its lock");
    cancel.cancel();
    tokio::time::sleep(Duration::from_millis(200)).await;

    sqlx::query("COMMIT").execute(&mut *reader).await.unwrap();
    drop(reader);

    let result = refresh.await.unwrap().expect("commit was already under way");
    assert_eq!(result.trainers_loaded, 2);

    let after = snapshot(&pool).await;
    assert_eq!(after.trainers.len(), 2);
    assert!(after.assignments.is_empty());
    assert!(after.trainers.iter().all(|t| t.competency != "COBOL"));
}

#[tokio::test]
async fn test_slow_commit_is_not_cut_short_by_store_timeout() {
    let (_dir, pool) = delete_journal_pool().await;
    seed_prior_catalog(&pool).await;
    let mut reader = hold_read_lock(&pool).await;

    let store_timeout = Duration::from_millis(300);
    let ingestor = Ingestor::new(IngestOptions {
        store_timeout,
        ..IngestOptions::default()
    });
    let refresh = tokio::spawn({
        let pool = pool.clone();
        async move { ingestor.ingest(source(catalog_workbook()), &pool).await }
    });

    tokio::time::sleep(store_timeout * 4).await;
    assert!(!refresh.is_finished(), "refresh finished while the reader held its lock");

    sqlx::query("COMMIT").execute(&mut *reader).await.unwrap();
    drop(reader);

    let result = refresh.await.unwrap().expect("commit outlasting the bound still counts");
    assert_eq!(result.trainings_loaded, 2);

    let after = snapshot(&pool).await;
    let names: Vec<_> = after.trainings.iter().map(|t| t.training_name.as_str()).collect();
    assert_eq!(names, vec!["Async Rust", "Error Handling"]);
}

#[tokio::test]
async fn test_concurrent_refreshes_never_interleave() {
    let (_dir, pool) = test_pool().await;
    let ingestor = Ingestor::default();

    let workbook_a = workbook_bytes(&[
        trainers_sheet((0..50).map(|i| trainer_row("a", &format!("A{}", i), "t", "l")).collect()),
        trainings_sheet(vec![training_row("A", Value::Blank, Value::Blank, Value::Blank)]),
    ]);
    let workbook_b = workbook_bytes(&[
        trainers_sheet((0..30).map(|i| trainer_row("b", &format!("B{}", i), "t", "l")).collect()),
        trainings_sheet(vec![training_row("B", Value::Blank, Value::Blank, Value::Blank)]),
    ]);

    let other = ingestor.clone();
    let (a, b) = tokio::join!(
        ingestor.ingest(source(workbook_a), &pool),
        other.ingest(source(workbook_b), &pool),
    );
    a.unwrap();
    b.unwrap();

    let after = snapshot(&pool).await;
    let skills: Vec<_> = after.trainers.iter().filter_map(|t| t.skill.clone()).collect();
    let all_a = skills.iter().all(|s| s == "a") && skills.len() == 50;
    let all_b = skills.iter().all(|s| s == "b") && skills.len() == 30;
    assert!(all_a || all_b, "mixed catalog: {} trainers", skills.len());

    assert_eq!(after.trainings.len(), 1);
    let expected = if all_a { "A" } else { "B" };
    assert_eq!(after.trainings[0].training_name, expected);
}
