//! # ewsx-replace
//!
//! A CLI tool that bulk-edits the text inside [EasyWorship](https://www.easyworship.com)
//! schedule files (`.ewsx`), e.g. to fix a word across every song lyric before
//! re-importing the schedule.
//!
//! ## What it does
//!
//! A schedule is a zip container holding a SQLite database (`main.db`) plus
//! resource files. This tool extracts the database to a private temporary
//! directory, runs a literal or regex search/replace over a fixed set of
//! user-facing text columns, and writes a new schedule with the edited database
//! and every other member copied through unchanged.
//!
//! The input file is **never** modified. With `--dry-run` nothing is written at
//! all; the proposed changes are printed as a diff instead.
//!
//! ## Usage
//!
//! ```sh
//! # Replace a word everywhere
//! ewsx-replace sunday.ewsx sunday-fixed.ewsx "Grace" "Love"
//!
//! # Preview a regex edit that swaps "Last, First" author names
//! ewsx-replace sunday.ewsx out.ewsx '(\w+), (\w+)' '\2 \1' --regex --dry-run
//! ```
//!
//! ## Exit status
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success (including a dry run or a run that changed nothing) |
//! | 1 | any other failure, e.g. an unreadable config file |
//! | 2 | invalid command line |
//! | 3 | malformed schedule: wrong extension, not a zip, no or ambiguous database |
//! | 4 | unusable search pattern or replacement template |
//! | 5 | incompatible or failing schedule database |
//! | 6 | filesystem problem: missing input, output exists, output is the input |
//!
//! See [`ErrorKind::exit_code`].
//!
//! Preferences can be persisted in `~/.config/ewsx-replace/config.toml`.
//!
//! ## Compatibility
//!
//! The editable columns are declared in [`schema::DEFAULT_FIELDS`]. If a
//! schedule lacks any of them the run stops before anything is written; use
//! `--field TABLE.COLUMN` to point the tool at a different layout.

pub mod archive;
pub mod editor;
pub mod error;
pub mod pattern;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod utils;

pub use error::{Error, ErrorKind};
