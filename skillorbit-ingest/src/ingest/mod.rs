//! Catalog ingestion pipeline
//!
//! Workbook bytes in, committed trainer/training catalog out:
//! `workbook` reads sheets, `headers` canonicalizes column labels,
//! `coercion` and `mapper` turn rows into records, `replacer` swaps the
//! tables, and `orchestrator` sequences it all under one transaction.

pub mod coercion;
pub mod headers;
pub mod mapper;
pub mod orchestrator;
pub mod replacer;
pub mod workbook;

pub use mapper::RowMapper;
pub use orchestrator::{build_batch, CatalogBatch, IngestOptions, IngestResult, Ingestor};
pub use replacer::{replace_catalog, ReplaceSummary};
pub use workbook::{TRAINERS_SHEET, TRAININGS_SHEET};
