//! Shared fixtures for skillorbit-ingest integration tests
//!
//! Workbooks are built in memory with rust_xlsxwriter so every test goes
//! through the same calamine read path as production uploads.

#![allow(dead_code)]

use std::io::Cursor;
use std::time::Duration;

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet};
use skillorbit_common::db::{
    fetch_trainers, fetch_trainings, init_database, init_schema, TrainerRecord, TrainingRecord,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tempfile::TempDir;

pub const TRAINER_HEADERS: [&str; 4] = ["Skill", "Competency*", "Trainer Name", "Expertise Level"];

pub const TRAINING_HEADERS: [&str; 16] = [
    "Division",
    "Department",
    "Competency",
    "Skill",
    "TrainingName/Program",
    "TrainingTopics/ Material",
    "Perquisites",
    "Skill Category (L1 - L5)",
    "Trainer Name",
    "Email ID",
    "Training Dates",
    "Duration (in hrs)",
    "Time",
    "Training Type",
    "No. of Seats",
    "Assessment Details",
];

/// One cell as written into a test workbook
#[derive(Debug, Clone)]
pub enum Value {
    Blank,
    Text(String),
    Number(f64),
    /// Real date cell with a yyyy-mm-dd number format
    Date(u16, u8, u8),
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

/// A sheet: name, header labels, data rows
pub struct SheetFixture {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl SheetFixture {
    pub fn new(name: &str, headers: &[&str], rows: Vec<Vec<Value>>) -> Self {
        Self {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }
}

/// Serialize sheets into `.xlsx` bytes
pub fn workbook_bytes(sheets: &[SheetFixture]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    for fixture in sheets {
        let mut sheet = Worksheet::new();
        sheet.set_name(&fixture.name).unwrap();

        for (col, header) in fixture.headers.iter().enumerate() {
            sheet.write_string(0, col as u16, header).unwrap();
        }

        for (i, row) in fixture.rows.iter().enumerate() {
            let r = (i + 1) as u32;
            for (col, value) in row.iter().enumerate() {
                let c = col as u16;
                match value {
                    Value::Blank => {}
                    Value::Text(s) => {
                        sheet.write_string(r, c, s).unwrap();
                    }
                    Value::Number(n) => {
                        sheet.write_number(r, c, *n).unwrap();
                    }
                    Value::Date(y, m, d) => {
                        let date = ExcelDateTime::from_ymd(*y, *m, *d).unwrap();
                        sheet.write_datetime_with_format(r, c, &date, &date_format).unwrap();
                    }
                }
            }
        }

        workbook.push_worksheet(sheet);
    }

    workbook.save_to_buffer().unwrap()
}

/// Training row with only name, date, duration and seats filled
pub fn training_row(name: &str, date: Value, duration: Value, seats: Value) -> Vec<Value> {
    let mut row = vec![Value::Blank; TRAINING_HEADERS.len()];
    row[4] = text(name);
    row[10] = date;
    row[11] = duration;
    row[14] = seats;
    row
}

pub fn trainer_row(skill: &str, competency: &str, name: &str, level: &str) -> Vec<Value> {
    vec![text(skill), text(competency), text(name), text(level)]
}

pub fn trainers_sheet(rows: Vec<Vec<Value>>) -> SheetFixture {
    SheetFixture::new("Trainers Details", &TRAINER_HEADERS, rows)
}

pub fn trainings_sheet(rows: Vec<Vec<Value>>) -> SheetFixture {
    SheetFixture::new("Training Details", &TRAINING_HEADERS, rows)
}

/// Three trainers (the middle one has no competency) and two trainings
pub fn catalog_workbook() -> Vec<u8> {
    workbook_bytes(&[
        trainers_sheet(vec![
            trainer_row("Ownership", "Rust", "Ferris", "L4"),
            trainer_row("Goroutines", "", "Gopher", "L3"),
            trainer_row("Async", "Rust", "Corro", "L5"),
        ]),
        trainings_sheet(vec![
            training_row("Async Rust", Value::Date(2024, 3, 15), Value::Number(8.0), text("20")),
            training_row("Error Handling", text("2024-04-02"), Value::Blank, Value::Number(12.0)),
        ]),
    ])
}

pub fn source(bytes: Vec<u8>) -> Cursor<Vec<u8>> {
    Cursor::new(bytes)
}

/// On-disk database with the full schema; keep the `TempDir` alive
pub async fn test_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("skillorbit.db")).await.unwrap();
    (dir, pool)
}

/// Rollback-journal store: a reader holding a SHARED lock makes COMMIT wait
/// for it, which WAL never does
pub async fn delete_journal_pool() -> (TempDir, SqlitePool) {
    let dir = TempDir::new().unwrap();
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("skillorbit.db"))
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Delete)
        .busy_timeout(Duration::from_secs(10));
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    (dir, pool)
}

/// A prior catalog with one assignment pointing at the prior training
pub async fn seed_prior_catalog(pool: &SqlitePool) {
    sqlx::query(
        r#"
        INSERT INTO users (username, hashed_password) VALUES ('M001', 'x'), ('E001', 'x');
        INSERT INTO trainers (skill, competency, trainer_name) VALUES ('Legacy', 'COBOL', 'Grace');
        INSERT INTO training_details (id, training_name, seats) VALUES (41, 'Legacy Training', '5');
        INSERT INTO training_assignments (training_id, employee_empid, manager_empid)
            VALUES (41, 'E001', 'M001');
        "#,
    )
    .execute(pool)
    .await
    .unwrap();
}

/// Full contents of the three catalog tables, ids included
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub trainer_ids: Vec<i64>,
    pub trainers: Vec<TrainerRecord>,
    pub training_ids: Vec<i64>,
    pub trainings: Vec<TrainingRecord>,
    pub assignments: Vec<(i64, i64, String, String)>,
}

pub async fn snapshot(pool: &SqlitePool) -> Snapshot {
    Snapshot {
        trainer_ids: sqlx::query_scalar("SELECT id FROM trainers ORDER BY id")
            .fetch_all(pool)
            .await
            .unwrap(),
        trainers: fetch_trainers(pool).await.unwrap(),
        training_ids: sqlx::query_scalar("SELECT id FROM training_details ORDER BY id")
            .fetch_all(pool)
            .await
            .unwrap(),
        trainings: fetch_trainings(pool).await.unwrap(),
        assignments: sqlx::query_as(
            "SELECT id, training_id, employee_empid, manager_empid \
             FROM training_assignments ORDER BY id",
        )
        .fetch_all(pool)
        .await
        .unwrap(),
    }
}
