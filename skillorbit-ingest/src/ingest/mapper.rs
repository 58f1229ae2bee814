//! Row validation and record mapping
//!
//! Turns one workbook row into zero or one catalog record plus zero or one
//! warning. A row that fails its sheet's required-field rule is dropped and
//! the batch carries on; nothing in here can abort a refresh.

use std::fmt;

use skillorbit_common::config::UnparsableDatePolicy;
use skillorbit_common::db::{TrainerRecord, TrainingRecord};
use tracing::warn;

use super::coercion::{coerce_date, coerce_numeric_text, coerce_text, present, Cell, DateCoercion};

/// Which catalog sheet a row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetKind {
    Trainer,
    Training,
}

impl SheetKind {
    /// Field whose absence drops the row
    fn required_field(&self) -> &'static str {
        match self {
            SheetKind::Trainer => "competency",
            SheetKind::Training => "training_name",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SheetKind::Trainer => "trainer",
            SheetKind::Training => "training",
        }
    }
}

// Lookup keys per training field, first present key wins. The production
// workbook uses the first spelling of each.
const TRAINING_NAME_KEYS: &[&str] = &["trainingname_program", "training_name"];
const TRAINING_TOPICS_KEYS: &[&str] = &["trainingtopics__material", "training_topics"];
const PREREQUISITES_KEYS: &[&str] = &["perquisites", "prerequisites"];
const SKILL_CATEGORY_KEYS: &[&str] = &["skill_category_(l1_-_l5)", "skill_category"];
const EMAIL_KEYS: &[&str] = &["email_id", "email"];
const TRAINING_DATE_KEYS: &[&str] = &["training_dates", "training_date"];
const DURATION_KEYS: &[&str] = &["duration_(in_hrs)", "duration"];
const SEATS_KEYS: &[&str] = &["no._of_seats", "seats"];

/// A data row keyed by canonical header, in column order
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Spreadsheet row number (header row is 1)
    pub position: usize,
    cells: Vec<(String, Cell)>,
}

impl RawRow {
    /// Pair normalized headers with cells; missing trailing cells are empty
    pub fn new(position: usize, headers: &[String], cells: Vec<Cell>) -> Self {
        let mut cells = cells.into_iter();
        let cells = headers
            .iter()
            .map(|h| (h.clone(), cells.next().unwrap_or(Cell::Empty)))
            .collect();
        Self { position, cells }
    }

    /// Cell under `key`; the first column wins on duplicate headers
    pub fn get(&self, key: &str) -> Option<&Cell> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }

    /// Cell under the first of `keys` that is a column of this sheet
    pub fn lookup(&self, keys: &[&str]) -> Option<&Cell> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// True when every cell is a missing value
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, c)| present(Some(c)).is_none())
    }
}

impl fmt::Display for RawRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, cell)) in self.cells.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "'{}': {}", key, cell)?;
        }
        write!(f, "}}")
    }
}

/// Result of mapping one row
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRow<T> {
    pub record: Option<T>,
    pub warning: Option<String>,
}

impl<T> MappedRow<T> {
    fn accepted(record: T) -> Self {
        Self { record: Some(record), warning: None }
    }

    fn dropped(warning: String) -> Self {
        Self { record: None, warning: Some(warning) }
    }
}

/// Every accepted record of one sheet plus the warnings raised on the way
#[derive(Debug, Clone, PartialEq)]
pub struct SheetBatch<T> {
    pub records: Vec<T>,
    pub warnings: Vec<String>,
}

impl<T> Default for SheetBatch<T> {
    fn default() -> Self {
        Self { records: Vec::new(), warnings: Vec::new() }
    }
}

impl<T> SheetBatch<T> {
    fn push(&mut self, mapped: MappedRow<T>) {
        if let Some(warning) = mapped.warning {
            warn!("{}", warning);
            self.warnings.push(warning);
        }
        if let Some(record) = mapped.record {
            self.records.push(record);
        }
    }
}

/// Row mapper for both catalog sheets
#[derive(Debug, Clone, Copy, Default)]
pub struct RowMapper {
    on_unparsable_date: UnparsableDatePolicy,
}

impl RowMapper {
    pub fn new(on_unparsable_date: UnparsableDatePolicy) -> Self {
        Self { on_unparsable_date }
    }

    pub fn map_trainer_row(&self, row: &RawRow) -> MappedRow<TrainerRecord> {
        let Some(competency) = coerce_text(row.get("competency")) else {
            return MappedRow::dropped(missing_required(SheetKind::Trainer, row));
        };

        MappedRow::accepted(TrainerRecord {
            skill: coerce_text(row.get("skill")),
            competency,
            trainer_name: coerce_text(row.get("trainer_name")),
            expertise_level: coerce_text(row.get("expertise_level")),
        })
    }

    pub fn map_training_row(&self, row: &RawRow) -> MappedRow<TrainingRecord> {
        let Some(training_name) = coerce_text(row.lookup(TRAINING_NAME_KEYS)) else {
            return MappedRow::dropped(missing_required(SheetKind::Training, row));
        };

        let mut warning = None;
        let training_date = match coerce_date(row.lookup(TRAINING_DATE_KEYS)) {
            DateCoercion::Date(date) => Some(date),
            DateCoercion::Absent => None,
            DateCoercion::Unparsable(raw) => match self.on_unparsable_date {
                UnparsableDatePolicy::RejectRow => {
                    return MappedRow::dropped(format!(
                        "Skipping training row {} due to unparsable 'training_date' value '{}': {}",
                        row.position, raw, row
                    ));
                }
                UnparsableDatePolicy::DropField => {
                    warning = Some(format!(
                        "Training row {}: unparsable 'training_date' value '{}' stored as empty",
                        row.position, raw
                    ));
                    None
                }
            },
        };

        let record = TrainingRecord {
            division: coerce_text(row.get("division")),
            department: coerce_text(row.get("department")),
            competency: coerce_text(row.get("competency")),
            skill: coerce_text(row.get("skill")),
            training_name,
            training_topics: coerce_text(row.lookup(TRAINING_TOPICS_KEYS)),
            prerequisites: coerce_text(row.lookup(PREREQUISITES_KEYS)),
            skill_category: coerce_text(row.lookup(SKILL_CATEGORY_KEYS)),
            trainer_name: coerce_text(row.get("trainer_name")),
            email: coerce_text(row.lookup(EMAIL_KEYS)),
            training_date,
            duration: coerce_numeric_text(row.lookup(DURATION_KEYS)),
            time: coerce_text(row.get("time")),
            training_type: coerce_text(row.get("training_type")),
            seats: coerce_numeric_text(row.lookup(SEATS_KEYS)),
            assessment_details: coerce_text(row.get("assessment_details")),
        };

        MappedRow { record: Some(record), warning }
    }

    /// Map a whole trainer sheet, skipping padding rows
    pub fn map_trainers<'a, I>(&self, rows: I) -> SheetBatch<TrainerRecord>
    where
        I: IntoIterator<Item = &'a RawRow>,
    {
        let mut batch = SheetBatch::default();
        for row in rows.into_iter().filter(|r| !r.is_blank()) {
            batch.push(self.map_trainer_row(row));
        }
        batch
    }

    /// Map a whole training sheet, skipping padding rows
    pub fn map_trainings<'a, I>(&self, rows: I) -> SheetBatch<TrainingRecord>
    where
        I: IntoIterator<Item = &'a RawRow>,
    {
        let mut batch = SheetBatch::default();
        for row in rows.into_iter().filter(|r| !r.is_blank()) {
            batch.push(self.map_training_row(row));
        }
        batch
    }
}

fn missing_required(kind: SheetKind, row: &RawRow) -> String {
    format!(
        "Skipping {} row {} due to missing '{}': {}",
        kind.label(),
        row.position,
        kind.required_field(),
        row
    )
}
