//! Full replace of the catalog tables
//!
//! Runs on a connection that is already inside a transaction; committing
//! or rolling back is the caller's job. Deletes go child-first so no
//! foreign key is ever violated mid-transaction:
//! training_assignments → training_details → trainers, then the new
//! trainer batch and the new training batch are inserted.

use skillorbit_common::db::{TrainerRecord, TrainingRecord};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::debug;

/// Tables cleared by a refresh, in delete order
pub const DELETE_ORDER: [&str; 3] = ["training_assignments", "training_details", "trainers"];

/// SQLite's bound-parameter limit for the bundled library
const SQLITE_MAX_VARIABLES: usize = 32766;

const TRAINER_COLUMNS: usize = 4;
const TRAINING_COLUMNS: usize = 16;

/// Row counts touched by one replace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub assignments_removed: u64,
    pub trainings_removed: u64,
    pub trainers_removed: u64,
    pub trainers_inserted: usize,
    pub trainings_inserted: usize,
}

/// Delete every catalog row and insert the new batches
pub async fn replace_catalog(
    conn: &mut SqliteConnection,
    trainers: &[TrainerRecord],
    trainings: &[TrainingRecord],
) -> sqlx::Result<ReplaceSummary> {
    let mut removed = [0u64; 3];
    for (table, count) in DELETE_ORDER.iter().zip(removed.iter_mut()) {
        *count = sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *conn)
            .await?
            .rows_affected();
        debug!(table, rows = *count, "Cleared table");
    }

    insert_trainers(conn, trainers).await?;
    insert_trainings(conn, trainings).await?;

    Ok(ReplaceSummary {
        assignments_removed: removed[0],
        trainings_removed: removed[1],
        trainers_removed: removed[2],
        trainers_inserted: trainers.len(),
        trainings_inserted: trainings.len(),
    })
}

/// Multi-row insert, split only where SQLite's parameter limit forces it
async fn insert_trainers(
    conn: &mut SqliteConnection,
    trainers: &[TrainerRecord],
) -> sqlx::Result<()> {
    for chunk in trainers.chunks(SQLITE_MAX_VARIABLES / TRAINER_COLUMNS) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO trainers (skill, competency, trainer_name, expertise_level) ",
        );
        builder.push_values(chunk, |mut row, trainer| {
            row.push_bind(trainer.skill.clone())
                .push_bind(trainer.competency.clone())
                .push_bind(trainer.trainer_name.clone())
                .push_bind(trainer.expertise_level.clone());
        });
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

async fn insert_trainings(
    conn: &mut SqliteConnection,
    trainings: &[TrainingRecord],
) -> sqlx::Result<()> {
    for chunk in trainings.chunks(SQLITE_MAX_VARIABLES / TRAINING_COLUMNS) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            INSERT INTO training_details (
                division, department, competency, skill, training_name,
                training_topics, prerequisites, skill_category, trainer_name,
                email, training_date, duration, time, training_type, seats,
                assessment_details
            )
            "#,
        );
        builder.push_values(chunk, |mut row, training| {
            row.push_bind(training.division.clone())
                .push_bind(training.department.clone())
                .push_bind(training.competency.clone())
                .push_bind(training.skill.clone())
                .push_bind(training.training_name.clone())
                .push_bind(training.training_topics.clone())
                .push_bind(training.prerequisites.clone())
                .push_bind(training.skill_category.clone())
                .push_bind(training.trainer_name.clone())
                .push_bind(training.email.clone())
                .push_bind(training.training_date)
                .push_bind(training.duration.clone())
                .push_bind(training.time.clone())
                .push_bind(training.training_type.clone())
                .push_bind(training.seats.clone())
                .push_bind(training.assessment_details.clone());
        });
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}
