//! The linear unpack → edit → repack run.
//!
//! Every stage finishes before the next begins and the first failure ends the
//! run. The working copy of the database lives in a temporary directory that
//! is removed on every exit path, and the output archive only appears once it
//! is completely written.

use std::io::{self, Write};
use std::path::PathBuf;

use eyre::{Context, Result};

use crate::archive::{ScheduleArchive, WorkingDatabase};
use crate::editor::{Editor, FieldChange};
use crate::error::Error;
use crate::pattern::Pattern;
use crate::report;
use crate::utils::{self, ReplaceConfig};

/// What a finished run did.
#[derive(Debug)]
pub struct RunSummary {
    pub changes: Vec<FieldChange>,
    pub rows_scanned: u64,
    /// The archive that was written; `None` for dry runs.
    pub output: Option<PathBuf>,
}

pub fn execute(config: &ReplaceConfig) -> Result<RunSummary> {
    let op = &config.operation;

    let pattern = Pattern::compile(op).wrap_err("Compiling the search pattern failed")?;
    utils::check_input(&config.input).wrap_err("Checking the input schedule failed")?;
    if !op.dry_run {
        utils::check_output(&config.input, &config.output, config.force)
            .wrap_err("Checking the output path failed")?;
    }

    let spinner = utils::spinner("Unpacking schedule...", config.quiet);
    let (mut archive, working) = utils::with_progress(&spinner, || {
        let mut archive = ScheduleArchive::open(&config.input)?;
        let working = archive.extract_database()?;
        Ok::<_, Error>((archive, working))
    })
    .wrap_err_with(|| format!("Unpacking {} failed", config.input.display()))?;
    if config.verbose && !config.quiet {
        eprintln!(
            "Extracted {} from {} to {}",
            archive.member().name,
            archive.path().display(),
            working.dir().display()
        );
    }

    let (changes, rows_scanned) = edit(config, &pattern, &working)
        .wrap_err("Editing the schedule database failed")?;

    report_changes(config, &changes).wrap_err("Writing the change report failed")?;

    if op.dry_run {
        finish(config, &changes, None).wrap_err("Writing the change report failed")?;
        return Ok(RunSummary {
            changes,
            rows_scanned,
            output: None,
        });
    }

    let spinner = utils::spinner("Repacking schedule...", config.quiet);
    utils::with_progress(&spinner, || {
        archive.repack(&working, !changes.is_empty(), &config.output, config.force)
    })
    .wrap_err_with(|| format!("Repacking into {} failed", config.output.display()))?;
    drop(working);

    finish(config, &changes, Some(&config.output)).wrap_err("Writing the change report failed")?;
    Ok(RunSummary {
        changes,
        rows_scanned,
        output: Some(config.output.clone()),
    })
}

fn edit(
    config: &ReplaceConfig,
    pattern: &Pattern,
    working: &WorkingDatabase,
) -> crate::error::Result<(Vec<FieldChange>, u64)> {
    let dry_run = config.operation.dry_run;
    let mut editor = if dry_run {
        Editor::open_read_only(working.path(), &config.fields)?
    } else {
        Editor::open(working.path(), &config.fields)?
    };

    let total = editor.candidate_rows()?;
    let pb = utils::progress_bar(total, config.quiet);
    let mut scanned = 0u64;
    let changes = utils::with_progress(&pb, || {
        editor.scan(pattern, || {
            scanned += 1;
            pb.inc(1);
        })
    })?;

    if !dry_run && !changes.is_empty() {
        editor.apply(&changes)?;
    }
    editor.close()?;
    Ok((changes, scanned))
}

/// Tally on stderr; individual changes on stdout for dry runs and `--verbose`.
fn report_changes(config: &ReplaceConfig, changes: &[FieldChange]) -> io::Result<()> {
    if !config.quiet && !config.json {
        report::write_tally(&mut io::stderr().lock(), changes)?;
    }
    if !(config.operation.dry_run || config.verbose) {
        return Ok(());
    }

    let color = !config.json && console::colors_enabled();
    let mut out = io::stdout().lock();
    for change in changes {
        if config.json {
            report::write_json(&mut out, change)?;
        } else {
            report::write_diff(&mut out, change, color)?;
        }
    }
    out.flush()
}

fn finish(
    config: &ReplaceConfig,
    changes: &[FieldChange],
    output: Option<&std::path::Path>,
) -> io::Result<()> {
    if config.json {
        let mut out = io::stdout().lock();
        report::write_json_summary(&mut out, &config.operation, changes, output)?;
        return out.flush();
    }
    if config.quiet {
        return Ok(());
    }
    match output {
        Some(path) => eprintln!(
            "Done. {} field(s) replaced. The updated schedule is at {}",
            changes.len(),
            path.display()
        ),
        None => eprintln!(
            "Dry run: {} field(s) would change; nothing was written.",
            changes.len()
        ),
    }
    Ok(())
}
