//! # SkillOrbit Common Library
//!
//! Shared code for the SkillOrbit services:
//! - Error type and result alias
//! - Configuration file resolution
//! - SQLite schema initialization
//! - Trainer and training catalog records

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
