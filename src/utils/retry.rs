//! Retry utilities: backoff builders and transient error classification.
//!
//! Writes to the primary store retry a fixed number of times with a constant
//! pause between attempts. Only connectivity failures are retried.

use std::time::Duration;

use backon::ConstantBuilder;

/// Backoff for writes to the primary store.
///
/// `max_tries` counts attempts, so it yields `max_tries - 1` delays of
/// `wait` each. A single try never sleeps.
pub fn failover_backoff(max_tries: u32, wait: Duration) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(wait)
        .with_max_times(max_tries.saturating_sub(1) as usize)
}

/// SQLite result codes that clear up on their own (busy, locked, cantopen).
const SQLITE_TRANSIENT_CODES: &[&str] = &["5", "6", "14"];

/// PostgreSQL SQLSTATEs for a server going away (admin/crash/cannot connect now).
const PG_SHUTDOWN_STATES: &[&str] = &["57P01", "57P02", "57P03"];

/// Determines if a database error means the store could not be reached.
///
/// Transient:
/// - I/O and TLS failures, pool acquire timeouts, crashed connection workers
/// - PostgreSQL connection exceptions (SQLSTATE class `08`) and shutdowns
/// - SQLite busy/locked/cantopen
///
/// Non-transient: everything else, including a closed pool. Retrying those
/// cannot succeed.
pub fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => {
            if let Some(code) = db.code() {
                let code = code.as_ref();
                if code.starts_with("08")
                    || PG_SHUTDOWN_STATES.contains(&code)
                    || SQLITE_TRANSIENT_CODES.contains(&code)
                {
                    return true;
                }
            }
            db.message().contains("terminating connection")
        }
        _ => false,
    }
}
