//! Database layer
//!
//! SQLite access for the Folio content service:
//! - connection pool creation (`pool`)
//! - embedded code-based migrations (`migrations`)
//! - per-entity repositories (`repositories`)

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool};

/// Whether an error is a store-level unique constraint violation.
///
/// Slug insertion races are resolved by retrying against this error; the
/// unique index is the final arbiter of slug ownership.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if let Some(sqlx::Error::Database(db_err)) = cause.downcast_ref::<sqlx::Error>() {
            if db_err.message().contains("UNIQUE constraint failed") {
                return true;
            }
        }
    }
    false
}
