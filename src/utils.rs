use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};
use crate::pattern::EditOperation;
use crate::schema::EligibleField;

/// Extension EasyWorship uses for schedule files.
pub const SCHEDULE_EXTENSION: &str = "ewsx";

/// Configuration required to run one search/replace pass.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Debug, Clone)]
pub struct ReplaceConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub operation: EditOperation,
    pub fields: Vec<EligibleField>,
    pub force: bool,
    pub json: bool,
    pub verbose: bool,
    pub quiet: bool,
}

pub fn has_schedule_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(SCHEDULE_EXTENSION))
}

/// Append `.ewsx` unless the path already carries it.
pub fn normalize_output(path: &Path) -> PathBuf {
    if has_schedule_extension(path) {
        return path.to_path_buf();
    }
    let mut raw = path.as_os_str().to_owned();
    raw.push(".");
    raw.push(SCHEDULE_EXTENSION);
    PathBuf::from(raw)
}

/// Refuse input files that are not schedules.
pub fn check_input(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::io(
            format!("input file {} could not be found", path.display()),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }
    if !has_schedule_extension(path) {
        return Err(Error::Format(format!(
            "{} does not have the .{SCHEDULE_EXTENSION} extension of a schedule file",
            path.display()
        )));
    }
    Ok(())
}

/// Check the destination before any work is done, so a doomed run fails
/// without touching anything.
pub fn check_output(input: &Path, output: &Path, overwrite: bool) -> Result<()> {
    if same_file(input, output) {
        return Err(Error::OutputIsInput(output.to_path_buf()));
    }
    if output.exists() && !overwrite {
        return Err(Error::OutputExists(output.to_path_buf()));
    }
    if output.is_dir() {
        return Err(Error::io(
            format!("output path {} is a directory", output.display()),
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        ));
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub fn spinner(message: &'static str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let s = ProgressBar::new_spinner();
    s.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    s.set_message(message);
    s.enable_steady_tick(Duration::from_millis(80));
    s
}

pub fn progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%)",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    bar
}

/// Run one stage under `bar` and clear the bar however the stage ends.
pub fn with_progress<T, E>(
    bar: &ProgressBar,
    stage: impl FnOnce() -> std::result::Result<T, E>,
) -> std::result::Result<T, E> {
    let result = stage();
    bar.finish_and_clear();
    result
}
