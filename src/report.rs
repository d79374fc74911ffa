use std::collections::BTreeMap;
use std::io::{self, Write};
use std::ops::Range;

use console::Style;
use serde::Serialize;

use crate::editor::FieldChange;
use crate::pattern::EditOperation;

#[derive(Serialize)]
struct ChangeRecord<'a> {
    table: &'a str,
    column: &'a str,
    rowid: i64,
    before: &'a str,
    after: &'a str,
}

#[derive(Serialize)]
struct SummaryRecord<'a> {
    operation: &'a EditOperation,
    changes: usize,
    tables: BTreeMap<&'a str, BTreeMap<&'a str, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
}

/// Occurrences per table and column, in name order.
pub fn tally(changes: &[FieldChange]) -> BTreeMap<&str, BTreeMap<&str, usize>> {
    let mut tables: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for change in changes {
        *tables
            .entry(change.field.table.as_str())
            .or_default()
            .entry(change.field.column.as_str())
            .or_default() += 1;
    }
    tables
}

/// Human summary of where matches were found.
pub fn write_tally<W: Write>(writer: &mut W, changes: &[FieldChange]) -> io::Result<()> {
    let tables = tally(changes);
    if tables.is_empty() {
        return writeln!(writer, "Nothing to do here: no eligible field matches.");
    }
    writeln!(
        writer,
        "Found {} occurrence(s) in {} table(s):",
        changes.len(),
        tables.len()
    )?;
    for (table, columns) in &tables {
        let cols: Vec<String> = columns
            .iter()
            .map(|(column, n)| format!("{column} ({n})"))
            .collect();
        writeln!(writer, "\t{table}: {}", cols.join(", "))?;
    }
    Ok(())
}

/// A `- before` / `+ after` pair with the affected spans highlighted.
pub fn write_diff<W: Write>(writer: &mut W, change: &FieldChange, color: bool) -> io::Result<()> {
    let (removed, added, header) = if color {
        (
            Style::new().red().force_styling(true),
            Style::new().green().force_styling(true),
            Style::new().blue().force_styling(true),
        )
    } else {
        (Style::new(), Style::new(), Style::new())
    };

    writeln!(
        writer,
        "{}",
        header.apply_to(format!("{} (rowid {})", change.field, change.rowid))
    )?;

    let before_spans: Vec<Range<usize>> = change
        .after
        .replacements
        .iter()
        .map(|r| r.before.clone())
        .collect();
    let after_spans: Vec<Range<usize>> = change
        .after
        .replacements
        .iter()
        .map(|r| r.after.clone())
        .collect();

    write!(writer, "{}", removed.apply_to("- "))?;
    write_highlighted(writer, &change.before, &before_spans, &removed)?;
    writeln!(writer)?;
    write!(writer, "{}", added.apply_to("+ "))?;
    write_highlighted(writer, &change.after.value, &after_spans, &added)?;
    writeln!(writer)?;
    writeln!(writer)
}

fn write_highlighted<W: Write>(
    writer: &mut W,
    text: &str,
    spans: &[Range<usize>],
    style: &Style,
) -> io::Result<()> {
    let mut last = 0;
    for span in spans {
        write!(writer, "{}", &text[last..span.start])?;
        write!(writer, "{}", style.apply_to(&text[span.clone()]))?;
        last = span.end;
    }
    write!(writer, "{}", &text[last..])
}

/// One JSON object per line.
pub fn write_json<W: Write>(writer: &mut W, change: &FieldChange) -> io::Result<()> {
    let record = ChangeRecord {
        table: &change.field.table,
        column: &change.field.column,
        rowid: change.rowid,
        before: &change.before,
        after: &change.after.value,
    };
    serde_json::to_writer(&mut *writer, &record).map_err(io::Error::other)?;
    writeln!(writer)
}

pub fn write_json_summary<W: Write>(
    writer: &mut W,
    operation: &EditOperation,
    changes: &[FieldChange],
    output: Option<&std::path::Path>,
) -> io::Result<()> {
    let record = SummaryRecord {
        operation,
        changes: changes.len(),
        tables: tally(changes),
        output: output.map(|p| p.display().to_string()),
    };
    serde_json::to_writer(&mut *writer, &record).map_err(io::Error::other)?;
    writeln!(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Pattern, Substitute};
    use crate::schema::EligibleField;

    fn change(table: &str, column: &str, rowid: i64, before: &str) -> FieldChange {
        let pattern = Pattern::compile(&EditOperation {
            search: "Grace".into(),
            replace: "Love".into(),
            ..Default::default()
        })
        .unwrap();
        FieldChange {
            field: EligibleField::new(table, column),
            rowid,
            before: before.into(),
            after: pattern.substitute(before).unwrap(),
        }
    }

    #[test]
    fn plain_diff_shows_both_versions() {
        let mut out = Vec::new();
        write_diff(&mut out, &change("presentation", "title", 3, "Amazing Grace"), false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "presentation.title (rowid 3)\n- Amazing Grace\n+ Amazing Love\n\n"
        );
    }

    #[test]
    fn colored_diff_highlights_only_the_spans() {
        let mut out = Vec::new();
        write_diff(&mut out, &change("slide", "title", 1, "Grace, Grace"), true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\u{1b}["));
        assert!(text.contains("Love"));
        assert!(text.contains(", "));
    }

    #[test]
    fn json_lines_carry_coordinates() {
        let mut out = Vec::new();
        write_json(&mut out, &change("slide", "title", 7, "Grace")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["table"], "slide");
        assert_eq!(value["column"], "title");
        assert_eq!(value["rowid"], 7);
        assert_eq!(value["before"], "Grace");
        assert_eq!(value["after"], "Love");
    }

    #[test]
    fn tally_groups_by_table_and_column() {
        let changes = vec![
            change("slide", "title", 1, "Grace"),
            change("slide", "title", 2, "Grace"),
            change("presentation", "title", 1, "Grace"),
        ];
        let mut out = Vec::new();
        write_tally(&mut out, &changes).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Found 3 occurrence(s) in 2 table(s):"));
        assert!(text.contains("\tpresentation: title (1)"));
        assert!(text.contains("\tslide: title (2)"));

        let mut out = Vec::new();
        write_tally(&mut out, &[]).unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("Nothing to do here"));
    }
}
