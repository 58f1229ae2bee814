//! Scoped, instrumented transactions
//!
//! A `ScopedTransaction` is released exactly once: by `commit`, by
//! `rollback`, or by being dropped. Dropping it without committing rolls
//! the transaction back (sqlx issues the ROLLBACK when the connection goes
//! back to the pool), which is what makes task cancellation safe. Every
//! release is logged with how long the connection was held.

use std::time::Instant;

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use uuid::Uuid;

/// Held longer than this is logged at WARN
const LONG_HOLD_MS: u128 = 2000;

/// Connection wait longer than this is logged at WARN
const SLOW_ACQUIRE_MS: u128 = 1000;

/// Release bookkeeping; logs from `Drop` when the owner never committed or
/// rolled back explicitly
struct HoldTimer {
    caller: &'static str,
    run_id: Uuid,
    acquired_at: Instant,
    released: bool,
}

impl HoldTimer {
    fn release(&mut self, mode: &'static str) {
        self.released = true;
        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > LONG_HOLD_MS {
            tracing::warn!(
                caller = self.caller,
                run_id = %self.run_id,
                held_ms,
                mode,
                "LONG TRANSACTION - connection held for extended period"
            );
        } else {
            tracing::debug!(
                caller = self.caller,
                run_id = %self.run_id,
                held_ms,
                mode,
                "Connection released"
            );
        }
    }
}

impl Drop for HoldTimer {
    fn drop(&mut self) {
        if !self.released {
            // Error path or cancelled task; sqlx rolls the transaction back
            tracing::warn!(
                caller = self.caller,
                run_id = %self.run_id,
                held_ms = self.acquired_at.elapsed().as_millis(),
                "Transaction dropped before commit, rolling back"
            );
        }
    }
}

/// Transaction guard that rolls back unless committed
pub struct ScopedTransaction {
    tx: Transaction<'static, Sqlite>,
    timer: HoldTimer,
}

impl ScopedTransaction {
    /// Connection to run statements on inside the transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit and log release timing
    pub async fn commit(self) -> sqlx::Result<()> {
        let ScopedTransaction { tx, mut timer } = self;
        tx.commit().await?;
        timer.release("commit");
        Ok(())
    }

    /// Roll back and log release timing
    pub async fn rollback(self) -> sqlx::Result<()> {
        let ScopedTransaction { tx, mut timer } = self;
        tx.rollback().await?;
        timer.release("rollback");
        Ok(())
    }
}

/// Begin a transaction with connection acquisition timing logs
///
/// # Example
/// ```ignore
/// let mut tx = begin_scoped(&pool, "ingest::replace_catalog", run_id).await?;
/// sqlx::query("DELETE FROM trainers").execute(tx.conn()).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_scoped(
    pool: &SqlitePool,
    caller: &'static str,
    run_id: Uuid,
) -> sqlx::Result<ScopedTransaction> {
    let start = Instant::now();
    tracing::debug!(caller, run_id = %run_id, "Connection acquisition requested");

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > SLOW_ACQUIRE_MS {
        tracing::warn!(
            caller,
            run_id = %run_id,
            wait_ms,
            "SLOW CONNECTION ACQUISITION - pool may be saturated"
        );
    } else {
        tracing::debug!(caller, run_id = %run_id, wait_ms, "Connection acquired");
    }

    Ok(ScopedTransaction {
        tx,
        timer: HoldTimer {
            caller,
            run_id,
            acquired_at: Instant::now(),
            released: false,
        },
    })
}
