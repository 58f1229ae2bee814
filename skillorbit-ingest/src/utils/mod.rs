//! Database utilities

pub mod pool_monitor;

pub use pool_monitor::{begin_scoped, ScopedTransaction};
