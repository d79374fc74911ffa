//! Search/replace over the eligible text columns of a schedule database.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params};

use crate::error::{Error, Result};
use crate::pattern::{Substitute, Substitution};
use crate::schema::{self, EligibleField, quote_ident};

/// A proposed (or applied) edit of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: EligibleField,
    pub rowid: i64,
    pub before: String,
    pub after: Substitution,
}

pub struct Editor<'f> {
    conn: Connection,
    fields: &'f [EligibleField],
}

impl<'f> Editor<'f> {
    /// Open the working copy for editing. The schema is verified up front.
    pub fn open(path: &Path, fields: &'f [EligibleField]) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| Error::db(format!("opening {}", path.display()), e))?;
        Self::from_connection(conn, fields)
    }

    /// Open the working copy without write access (dry runs).
    pub fn open_read_only(path: &Path, fields: &'f [EligibleField]) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| Error::db(format!("opening {}", path.display()), e))?;
        Self::from_connection(conn, fields)
    }

    pub fn from_connection(conn: Connection, fields: &'f [EligibleField]) -> Result<Self> {
        schema::verify(&conn, fields)?;
        Ok(Self { conn, fields })
    }

    /// Number of rows that will be visited by [`Editor::scan`].
    pub fn candidate_rows(&self) -> Result<u64> {
        let mut total = 0u64;
        for field in self.fields {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} IS NOT NULL",
                quote_ident(&field.table),
                quote_ident(&field.column)
            );
            let n: i64 = self
                .conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(|e| Error::db(format!("counting rows of {field}"), e))?;
            total += n.max(0) as u64;
        }
        Ok(total)
    }

    /// Visit every non-null text value of every eligible field and collect
    /// the values the pattern would change. `on_row` fires once per row read.
    pub fn scan<P, F>(&self, pattern: &P, mut on_row: F) -> Result<Vec<FieldChange>>
    where
        P: Substitute + ?Sized,
        F: FnMut(),
    {
        let mut changes = Vec::new();
        for field in self.fields {
            let sql = format!(
                "SELECT rowid, {col} FROM {table} WHERE {col} IS NOT NULL ORDER BY rowid",
                col = quote_ident(&field.column),
                table = quote_ident(&field.table),
            );
            let mut stmt = self
                .conn
                .prepare(&sql)
                .map_err(|e| Error::db(format!("preparing scan of {field}"), e))?;
            let mut rows = stmt
                .query([])
                .map_err(|e| Error::db(format!("scanning {field}"), e))?;

            while let Some(row) = rows
                .next()
                .map_err(|e| Error::db(format!("reading {field}"), e))?
            {
                on_row();
                let rowid: i64 = row
                    .get(0)
                    .map_err(|e| Error::db(format!("reading rowid of {field}"), e))?;
                let value = row
                    .get_ref(1)
                    .map_err(|e| Error::db(format!("reading {field}"), e))?;
                // Only text participates; numbers and blobs are left alone.
                let ValueRef::Text(bytes) = value else {
                    continue;
                };
                let Ok(text) = std::str::from_utf8(bytes) else {
                    continue;
                };
                if let Some(after) = pattern.substitute(text) {
                    changes.push(FieldChange {
                        field: field.clone(),
                        rowid,
                        before: text.to_string(),
                        after,
                    });
                }
            }
        }
        Ok(changes)
    }

    /// Write all changes inside one transaction. Nothing is committed unless
    /// every update lands on exactly one row.
    pub fn apply(&mut self, changes: &[FieldChange]) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| Error::db("starting transaction", e))?;
        for change in changes {
            let sql = format!(
                "UPDATE {} SET {} = ?1 WHERE rowid = ?2",
                quote_ident(&change.field.table),
                quote_ident(&change.field.column)
            );
            let updated = tx
                .prepare_cached(&sql)
                .and_then(|mut stmt| stmt.execute(params![change.after.value, change.rowid]))
                .map_err(|e| {
                    Error::db(format!("updating {} rowid {}", change.field, change.rowid), e)
                })?;
            if updated != 1 {
                return Err(Error::Schema(format!(
                    "{} rowid {} matched {updated} rows on update",
                    change.field, change.rowid
                )));
            }
        }
        tx.commit()
            .map_err(|e| Error::db("committing changes", e))?;
        Ok(changes.len())
    }

    /// Close the connection so every page is on disk before repacking.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| Error::db("closing database", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pattern::{EditOperation, Pattern};

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE presentation (rowid INTEGER PRIMARY KEY, title TEXT, author TEXT);
             CREATE TABLE slide (rowid INTEGER PRIMARY KEY, title, note TEXT);
             INSERT INTO presentation (title, author) VALUES ('Amazing Grace', 'John Newton');
             INSERT INTO presentation (title, author) VALUES ('How Great Thou Art', NULL);
             INSERT INTO slide (title, note) VALUES ('Verse 1', 'Grace note');
             INSERT INTO slide (title, note) VALUES (NULL, NULL);
             INSERT INTO slide (title, note) VALUES (42, NULL);
             INSERT INTO slide (title, note) VALUES ('Chorus: Grace', NULL);",
        )
        .unwrap();
        conn
    }

    fn fields() -> Vec<EligibleField> {
        vec![
            EligibleField::new("presentation", "title"),
            EligibleField::new("presentation", "author"),
            EligibleField::new("slide", "title"),
        ]
    }

    fn literal(search: &str, replace: &str) -> Pattern {
        Pattern::compile(&EditOperation {
            search: search.into(),
            replace: replace.into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn scan_finds_only_eligible_text_fields() {
        let fields = fields();
        let editor = Editor::from_connection(fixture(), &fields).unwrap();
        let mut visited = 0;
        let changes = editor.scan(&literal("Grace", "Love"), || visited += 1).unwrap();

        // slide.note also contains "Grace" but is not eligible.
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field.to_string(), "presentation.title");
        assert_eq!(changes[0].rowid, 1);
        assert_eq!(changes[0].after.value, "Amazing Love");
        assert_eq!(changes[1].field.to_string(), "slide.title");
        assert_eq!(changes[1].rowid, 4);
        assert_eq!(changes[1].after.value, "Chorus: Love");

        // NULLs are not visited at all; the integer title is visited but skipped.
        assert_eq!(visited, editor.candidate_rows().unwrap());
        assert_eq!(visited, 2 + 1 + 3);
    }

    #[test]
    fn apply_writes_exactly_the_scanned_changes() {
        let fields = fields();
        let mut editor = Editor::from_connection(fixture(), &fields).unwrap();
        let changes = editor.scan(&literal("Grace", "Love"), || {}).unwrap();
        assert_eq!(editor.apply(&changes).unwrap(), 2);

        let titles: Vec<Option<String>> = editor
            .conn
            .prepare("SELECT title FROM slide ORDER BY rowid")
            .unwrap()
            .query_map([], |row| row.get::<_, Option<rusqlite::types::Value>>(0))
            .unwrap()
            .map(|v| {
                v.unwrap().map(|v| match v {
                    rusqlite::types::Value::Text(s) => s,
                    other => format!("{other:?}"),
                })
            })
            .collect();
        assert_eq!(
            titles,
            vec![
                Some("Verse 1".to_string()),
                None,
                Some("Integer(42)".to_string()),
                Some("Chorus: Love".to_string()),
            ]
        );
        let note: String = editor
            .conn
            .query_row("SELECT note FROM slide WHERE rowid = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(note, "Grace note");

        // A second pass has nothing left to do.
        assert!(editor.scan(&literal("Grace", "Love"), || {}).unwrap().is_empty());
    }

    #[test]
    fn failed_update_rolls_back_everything() {
        let fields = fields();
        let mut editor = Editor::from_connection(fixture(), &fields).unwrap();
        let mut changes = editor.scan(&literal("Grace", "Love"), || {}).unwrap();
        changes[1].rowid = 999;

        let err = editor.apply(&changes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);

        let title: String = editor
            .conn
            .query_row("SELECT title FROM presentation WHERE rowid = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(title, "Amazing Grace");
    }

    #[test]
    fn empty_tables_are_a_successful_noop() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE slide (title TEXT);").unwrap();
        let fields = vec![EligibleField::new("slide", "title")];
        let mut editor = Editor::from_connection(conn, &fields).unwrap();
        let changes = editor.scan(&literal("Grace", "Love"), || {}).unwrap();
        assert!(changes.is_empty());
        assert_eq!(editor.apply(&changes).unwrap(), 0);
    }

    #[test]
    fn missing_schema_is_refused_before_scanning() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE slide (title TEXT);").unwrap();
        let fields = fields();
        let err = Editor::from_connection(conn, &fields).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Database);
    }
}
