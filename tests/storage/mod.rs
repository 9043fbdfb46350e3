//! Shared storage integration tests.
//!
//! Tests the RowStore interface against all SQL implementations.
//! Each implementation module imports these test functions and runs them.

pub mod row_store_tests;
