//! Shared fixtures: real `.ewsx` schedules built with rusqlite + zip.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ewsx_replace::pattern::EditOperation;
use ewsx_replace::schema;
use ewsx_replace::utils::ReplaceConfig;
use ewsx_replace::{Error, ErrorKind};
use rusqlite::Connection;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const SCHEDULE_SQL: &str = r#"
CREATE TABLE presentation (rowid INTEGER PRIMARY KEY, title TEXT, author TEXT, copyright TEXT);
CREATE TABLE slide (rowid INTEGER PRIMARY KEY, presentation_id INTEGER, title TEXT);
CREATE TABLE element (rowid INTEGER PRIMARY KEY, slide_id INTEGER, rtf TEXT);
CREATE TABLE resource (rowid INTEGER PRIMARY KEY, path TEXT);
INSERT INTO presentation (title, author, copyright) VALUES ('Amazing Grace', 'John Newton', NULL);
INSERT INTO presentation (title, author, copyright) VALUES ('Doe, John', 'Public Domain', 'grace notes ltd');
INSERT INTO slide (presentation_id, title) VALUES (1, 'Verse 1');
INSERT INTO slide (presentation_id, title) VALUES (1, NULL);
INSERT INTO element (slide_id, rtf) VALUES (1, '{\rtf1 Amazing grace how sweet the sound}');
INSERT INTO resource (path) VALUES ('Grace.jpg');
"#;

pub const BACKGROUND: &[u8] = b"\x89PNG\r\n\x1a\n not really an image, Grace";
pub const NOTES: &[u8] = b"<notes>Amazing Grace</notes>";

pub fn write_database(path: &Path, sql: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(sql).unwrap();
    conn.close().unwrap();
}

/// Build an archive from `(member name, bytes)` pairs; names ending in `/`
/// become directory entries.
pub fn write_archive(path: &Path, members: &[(&str, Vec<u8>)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, bytes) in members {
        if name.ends_with('/') {
            zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            continue;
        }
        let method = if name.ends_with(".db") {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        zip.start_file(*name, SimpleFileOptions::default().compression_method(method))
            .unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

pub fn database_bytes(dir: &Path, sql: &str) -> Vec<u8> {
    let path = dir.join(format!("fixture-{}.db", fs::read_dir(dir).unwrap().count()));
    write_database(&path, sql);
    fs::read(&path).unwrap()
}

/// `schedule.ewsx` with the standard schedule database and two resources.
pub fn standard_schedule(dir: &Path) -> PathBuf {
    schedule_with_sql(dir, SCHEDULE_SQL)
}

pub fn schedule_with_sql(dir: &Path, sql: &str) -> PathBuf {
    let db = database_bytes(dir, sql);
    let path = dir.join("schedule.ewsx");
    write_archive(
        &path,
        &[
            ("resources/", Vec::new()),
            ("resources/background.png", BACKGROUND.to_vec()),
            ("main.db", db),
            ("notes.xml", NOTES.to_vec()),
        ],
    );
    path
}

pub fn config(input: &Path, output: &Path, search: &str, replace: &str) -> ReplaceConfig {
    ReplaceConfig {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        operation: EditOperation {
            search: search.into(),
            replace: replace.into(),
            ..Default::default()
        },
        fields: schema::default_fields(),
        force: false,
        json: false,
        verbose: false,
        quiet: true,
    }
}

pub fn read_member(archive: &Path, name: &str) -> Vec<u8> {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    let mut entry = zip.by_name(name).unwrap();
    let mut out = Vec::new();
    entry.read_to_end(&mut out).unwrap();
    out
}

pub fn member_names(archive: &Path) -> Vec<String> {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index_raw(i).unwrap().name().to_string())
        .collect()
}

/// Extract `main.db` from `archive` next to it and open it.
pub fn open_database(archive: &Path) -> Connection {
    let bytes = read_member(archive, "main.db");
    let path = archive.with_extension("check.db");
    fs::write(&path, bytes).unwrap();
    Connection::open(path).unwrap()
}

pub fn text(conn: &Connection, sql: &str) -> Option<String> {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

pub fn kind_of(report: &eyre::Report) -> ErrorKind {
    report
        .downcast_ref::<Error>()
        .unwrap_or_else(|| panic!("not a typed error: {report:?}"))
        .kind()
}
