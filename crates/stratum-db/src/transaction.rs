//! Explicit transaction scope for SurrealDB.
//!
//! A [`SurrealTransaction`] collects statements and their bound parameters.
//! [`SurrealTransaction::commit`] wraps them in
//! `BEGIN TRANSACTION … COMMIT TRANSACTION` and sends the batch as a single
//! request, so either every statement is applied or none is. Parameters are
//! named `$p0`, `$p1`, … in staging order; statements must only refer to
//! the names returned by [`SurrealTransaction::param`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use tracing::debug;

use crate::error::DbError;

/// A typed value bound to a transaction parameter.
#[derive(Debug, Clone)]
pub enum BindValue {
    Str(String),
    OptStr(Option<String>),
    Int(i64),
    OptInt(Option<i64>),
    DateTime(DateTime<Utc>),
    OptDateTime(Option<DateTime<Utc>>),
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        BindValue::Str(v)
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        BindValue::Str(v.to_string())
    }
}

impl From<Option<String>> for BindValue {
    fn from(v: Option<String>) -> Self {
        BindValue::OptStr(v)
    }
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        BindValue::Int(v)
    }
}

impl From<u32> for BindValue {
    fn from(v: u32) -> Self {
        BindValue::Int(i64::from(v))
    }
}

impl From<Option<u32>> for BindValue {
    fn from(v: Option<u32>) -> Self {
        BindValue::OptInt(v.map(i64::from))
    }
}

impl From<DateTime<Utc>> for BindValue {
    fn from(v: DateTime<Utc>) -> Self {
        BindValue::DateTime(v)
    }
}

impl From<Option<DateTime<Utc>>> for BindValue {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        BindValue::OptDateTime(v)
    }
}

/// Statements staged for one atomic commit.
#[derive(Debug, Default)]
pub struct SurrealTransaction {
    statements: Vec<String>,
    bindings: Vec<(String, BindValue)>,
}

impl SurrealTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Number of staged statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Bind a value and return its placeholder (e.g. `$p3`).
    pub fn param(&mut self, value: impl Into<BindValue>) -> String {
        let name = format!("p{}", self.bindings.len());
        let placeholder = format!("${name}");
        self.bindings.push((name, value.into()));
        placeholder
    }

    /// Append a statement (without trailing `;`).
    pub fn push(&mut self, statement: impl Into<String>) {
        self.statements.push(statement.into());
    }

    fn render(&self) -> String {
        let mut query = String::from("BEGIN TRANSACTION;\n");
        for statement in &self.statements {
            query.push_str(statement);
            query.push_str(";\n");
        }
        query.push_str("COMMIT TRANSACTION;");
        query
    }

    /// Send the batch. An empty transaction is a no-op.
    pub async fn commit<C: Connection>(self, db: &Surreal<C>) -> Result<(), DbError> {
        if self.is_empty() {
            return Ok(());
        }

        let query = self.render();
        debug!(statements = self.statements.len(), "Committing transaction");

        let mut builder = db.query(query);
        for (name, value) in self.bindings {
            builder = match value {
                BindValue::Str(v) => builder.bind((name, v)),
                BindValue::OptStr(v) => builder.bind((name, v)),
                BindValue::Int(v) => builder.bind((name, v)),
                BindValue::OptInt(v) => builder.bind((name, v)),
                BindValue::DateTime(v) => builder.bind((name, v)),
                BindValue::OptDateTime(v) => builder.bind((name, v)),
            };
        }

        let mut response = builder.await?;
        let errors = response.take_errors();
        if errors.is_empty() {
            return Ok(());
        }

        // Statements that never ran report a generic "failed transaction"
        // error; the root cause is whichever statement says something else.
        let mut indexed: Vec<(usize, String)> = errors
            .into_iter()
            .map(|(idx, err)| (idx, err.to_string()))
            .collect();
        indexed.sort_by_key(|(idx, _)| *idx);
        let message = indexed
            .iter()
            .map(|(_, msg)| msg)
            .find(|msg| !msg.contains("not executed due to a failed transaction"))
            .or_else(|| indexed.first().map(|(_, msg)| msg))
            .cloned()
            .unwrap_or_default();

        Err(DbError::from_statement_error(message))
    }
}
