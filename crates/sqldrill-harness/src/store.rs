//! Boundary between the harness and the relational store.
//!
//! The harness never interprets SQL itself. Everything it knows about the
//! store goes through [`SqlStore`] sessions opened by a [`StoreConnector`].

use std::time::Duration;

use sqldrill_error::QueryError;

use crate::value::{ResultSet, SqlValue};

/// What a session is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Fixture writer: DDL and seed inserts.
    ReadWrite,
    /// Case sessions: any write is refused by the store.
    ReadOnly,
}

/// One open session against the store.
pub trait SqlStore: Send {
    /// Short engine label for logs and reports.
    fn engine_name(&self) -> &'static str;

    /// Run one or more statements that return no rows (DDL, transaction
    /// control).
    fn execute(&mut self, statements: &str) -> Result<(), QueryError>;

    /// Run a query and capture its full result set.
    ///
    /// The statement is interrupted once `timeout` has elapsed and the call
    /// returns [`QueryError::Timeout`].
    fn query(&mut self, sql: &str, timeout: Duration) -> Result<ResultSet, QueryError>;

    /// Insert `rows` into `table` inside a single transaction.
    ///
    /// Returns the number of rows written.
    fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Vec<SqlValue>],
    ) -> Result<usize, QueryError>;

    /// Open a read transaction so every query of a case sees one snapshot.
    fn begin_read(&mut self) -> Result<(), QueryError> {
        self.execute("BEGIN")
    }

    /// Close the read transaction opened by [`SqlStore::begin_read`].
    fn end_read(&mut self) -> Result<(), QueryError> {
        self.execute("ROLLBACK")
    }
}

/// Opens sessions. Shared by reference across runner workers.
pub trait StoreConnector: Send + Sync {
    type Store: SqlStore;

    fn connect(&self, mode: AccessMode) -> Result<Self::Store, QueryError>;

    /// Human-readable target description (never includes credentials).
    fn describe(&self) -> String;
}
