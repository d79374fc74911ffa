use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ewsx_replace::pattern::EditOperation;
use ewsx_replace::schema::{self, EligibleField};
use ewsx_replace::{Error, pipeline, utils};

/// Replace text in an EasyWorship schedule file (.ewsx).
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The schedule to update.
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Where to write the updated schedule (".ewsx" is appended if missing).
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// The text to look for.
    #[arg(value_name = "SEARCH")]
    search: String,

    /// The text to put in its place.
    #[arg(value_name = "REPLACE")]
    replace: String,

    /// Treat SEARCH as a regular expression; REPLACE may use groups ($1, \1, \g<name>).
    #[arg(short, long)]
    regex: bool,

    /// Ignore case while searching.
    #[arg(short, long, overrides_with = "no_ignore_case")]
    ignore_case: bool,

    /// Match case exactly, even if the config file sets `ignore_case`.
    #[arg(long, overrides_with = "ignore_case")]
    no_ignore_case: bool,

    /// Print the changes instead of writing an output schedule.
    #[arg(short, long)]
    dry_run: bool,

    /// Replace OUTPUT if it already exists.
    #[arg(short, long)]
    force: bool,

    /// Edit this TABLE.COLUMN instead of the built-in set (repeatable).
    #[arg(long = "field", value_name = "TABLE.COLUMN")]
    fields: Vec<EligibleField>,

    /// Print changes and the summary as JSON lines.
    #[arg(long)]
    json: bool,

    /// Print every applied change.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress bars and status messages.
    #[arg(short, long)]
    quiet: bool,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/ewsx-replace/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    force: Option<bool>,
    ignore_case: Option<bool>,
    fields: Option<Vec<EligibleField>>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("ewsx-replace/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("Error: {report:?}");
            ExitCode::from(exit_code(&report))
        }
    }
}

/// Exit status for a failed run: the kind of the first typed error in the
/// chain, or 1 when none is present.
fn exit_code(report: &eyre::Report) -> u8 {
    report
        .chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(1, |e| e.kind().exit_code())
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve eligible fields (CLI > Config > built-in)
    let fields = if !cli.fields.is_empty() {
        cli.fields
    } else {
        file_cfg.fields.unwrap_or_else(schema::default_fields)
    };

    // 3. Resolve case sensitivity (CLI > Config > case-sensitive)
    let ignore_case = if cli.ignore_case {
        true
    } else if cli.no_ignore_case {
        false
    } else {
        file_cfg.ignore_case.unwrap_or(false)
    };

    // 4. Build the run config
    let config = utils::ReplaceConfig {
        input: cli.input,
        output: utils::normalize_output(&cli.output),
        operation: EditOperation {
            search: cli.search,
            replace: cli.replace,
            regex: cli.regex,
            ignore_case,
            dry_run: cli.dry_run,
        },
        fields: schema::dedup_fields(fields),
        force: cli.force || file_cfg.force.unwrap_or(false),
        json: cli.json,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    // 5. Run the pipeline
    pipeline::execute(&config)?;
    Ok(())
}
