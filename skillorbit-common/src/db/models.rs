//! Trainer and training catalog records
//!
//! Both tables are owned by the catalog refresh: every refresh replaces
//! their full contents. Records carry no identity beyond the surrogate row
//! id assigned on insert.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// One row of the "Trainers Details" sheet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TrainerRecord {
    pub skill: Option<String>,
    pub competency: String,
    pub trainer_name: Option<String>,
    pub expertise_level: Option<String>,
}

/// One row of the "Training Details" sheet
///
/// `duration` and `seats` are numeric in the workbook but persisted as text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TrainingRecord {
    pub division: Option<String>,
    pub department: Option<String>,
    pub competency: Option<String>,
    pub skill: Option<String>,
    pub training_name: String,
    pub training_topics: Option<String>,
    pub prerequisites: Option<String>,
    pub skill_category: Option<String>,
    pub trainer_name: Option<String>,
    pub email: Option<String>,
    pub training_date: Option<NaiveDate>,
    pub duration: Option<String>,
    pub time: Option<String>,
    pub training_type: Option<String>,
    pub seats: Option<String>,
    pub assessment_details: Option<String>,
}

/// Load all trainers in insertion order
///
/// Read side of the catalog for the dashboards, which only ever see
/// committed refreshes.
pub async fn fetch_trainers(pool: &SqlitePool) -> sqlx::Result<Vec<TrainerRecord>> {
    sqlx::query_as::<_, TrainerRecord>(
        "SELECT skill, competency, trainer_name, expertise_level FROM trainers ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

/// Load all trainings in insertion order, same visibility as
/// [`fetch_trainers`]
pub async fn fetch_trainings(pool: &SqlitePool) -> sqlx::Result<Vec<TrainingRecord>> {
    sqlx::query_as::<_, TrainingRecord>(
        r#"
        SELECT division, department, competency, skill, training_name,
               training_topics, prerequisites, skill_category, trainer_name,
               email, training_date, duration, time, training_type, seats,
               assessment_details
        FROM training_details
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
}
