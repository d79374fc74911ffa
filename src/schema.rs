//! The slice of the EasyWorship schedule database this tool is allowed to edit.
//!
//! A schedule's `main.db` holds one `presentation` row per schedule item, the
//! `slide` rows belonging to it, and the `element` rows that carry each
//! slide's RTF text. Only the user-facing text columns listed in
//! [`DEFAULT_FIELDS`] are touched unless the caller supplies its own set.

use std::fmt;
use std::str::FromStr;

use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;

use crate::error::{Error, Result};

/// `(table, column)` pairs edited when no override is configured.
pub const DEFAULT_FIELDS: &[(&str, &str)] = &[
    ("presentation", "title"),
    ("presentation", "author"),
    ("presentation", "copyright"),
    ("slide", "title"),
    ("element", "rtf"),
];

/// A `(table, column)` pair whose text values are subject to search/replace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct EligibleField {
    pub table: String,
    pub column: String,
}

impl EligibleField {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for EligibleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

impl FromStr for EligibleField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((table, column))
                if !table.trim().is_empty()
                    && !column.trim().is_empty()
                    && !column.contains('.') =>
            {
                Ok(Self::new(table.trim(), column.trim()))
            }
            _ => Err(format!("expected TABLE.COLUMN, got {s:?}")),
        }
    }
}

impl TryFrom<String> for EligibleField {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

pub fn default_fields() -> Vec<EligibleField> {
    DEFAULT_FIELDS
        .iter()
        .map(|(t, c)| EligibleField::new(*t, *c))
        .collect()
}

/// Drop repeated pairs while keeping the first occurrence's position.
pub fn dedup_fields(fields: Vec<EligibleField>) -> Vec<EligibleField> {
    let mut out: Vec<EligibleField> = Vec::with_capacity(fields.len());
    for field in fields {
        if !out.contains(&field) {
            out.push(field);
        }
    }
    out
}

/// Quote an SQL identifier for direct interpolation into a statement.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Fails with a single error listing every eligible field the database lacks.
pub fn verify(conn: &Connection, fields: &[EligibleField]) -> Result<()> {
    if fields.is_empty() {
        return Err(Error::Schema("no eligible fields to edit were configured".into()));
    }
    let mut missing = Vec::new();
    for field in fields {
        if !table_exists(conn, &field.table)? {
            missing.push(format!("table `{}`", field.table));
        } else if !column_exists(conn, &field.table, &field.column)? {
            missing.push(format!("column `{field}`"));
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema(format!(
            "missing {} (unsupported schedule version?)",
            missing.join(", ")
        )))
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
    .map_err(|e| Error::db(format!("looking up table `{table}`"), e))
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
        [table, column],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
    .map_err(|e| Error::db(format!("inspecting columns of `{table}`"), e))
}
