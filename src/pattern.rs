//! Search pattern compilation and substitution.
//!
//! The search input is compiled once into a [`Pattern`], either a literal
//! needle or a regular expression. Both variants implement [`Substitute`], so
//! the database editor never branches on the user's flags.

use std::iter::Peekable;
use std::ops::Range;
use std::str::Chars;

use regex::{Captures, Regex, RegexBuilder};
use serde::Serialize;

use crate::error::{Error, Result};

/// One run's search/replace request. Immutable for the whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EditOperation {
    pub search: String,
    pub replace: String,
    pub regex: bool,
    pub ignore_case: bool,
    pub dry_run: bool,
}

/// Where a single match sat in the original text and where its replacement
/// landed in the new text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub before: Range<usize>,
    pub after: Range<usize>,
}

/// The outcome of applying a pattern to a value that it changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub value: String,
    pub replacements: Vec<Replacement>,
}

pub trait Substitute {
    /// Returns `None` when nothing matched or the result equals the input.
    fn substitute(&self, text: &str) -> Option<Substitution>;
}

/// Plain-text search. The replacement is inserted verbatim.
#[derive(Debug, Clone)]
pub struct LiteralPattern {
    matcher: Regex,
    replacement: String,
}

impl LiteralPattern {
    pub fn new(needle: &str, replacement: &str, ignore_case: bool) -> Result<Self> {
        if needle.is_empty() {
            return Err(Error::Pattern("search string must not be empty".into()));
        }
        let matcher = RegexBuilder::new(&regex::escape(needle))
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| Error::Pattern(e.to_string()))?;
        Ok(Self {
            matcher,
            replacement: replacement.to_string(),
        })
    }
}

impl Substitute for LiteralPattern {
    fn substitute(&self, text: &str) -> Option<Substitution> {
        substitute_with(&self.matcher, text, |_, dst| dst.push_str(&self.replacement))
    }
}

/// Regular-expression search with capture-group expansion in the replacement.
#[derive(Debug, Clone)]
pub struct RegexPattern {
    regex: Regex,
    template: String,
}

impl RegexPattern {
    pub fn new(search: &str, replacement: &str, ignore_case: bool) -> Result<Self> {
        if search.is_empty() {
            return Err(Error::Pattern("search string must not be empty".into()));
        }
        let regex = RegexBuilder::new(search)
            .case_insensitive(ignore_case)
            .build()
            .map_err(|e| Error::Pattern(e.to_string()))?;
        let template = translate_template(replacement, &regex)?;
        Ok(Self { regex, template })
    }
}

impl Substitute for RegexPattern {
    fn substitute(&self, text: &str) -> Option<Substitution> {
        substitute_with(&self.regex, text, |caps, dst| caps.expand(&self.template, dst))
    }
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(LiteralPattern),
    Regex(RegexPattern),
}

impl Pattern {
    pub fn compile(op: &EditOperation) -> Result<Self> {
        if op.regex {
            RegexPattern::new(&op.search, &op.replace, op.ignore_case).map(Pattern::Regex)
        } else {
            LiteralPattern::new(&op.search, &op.replace, op.ignore_case).map(Pattern::Literal)
        }
    }
}

impl Substitute for Pattern {
    fn substitute(&self, text: &str) -> Option<Substitution> {
        match self {
            Pattern::Literal(p) => p.substitute(text),
            Pattern::Regex(p) => p.substitute(text),
        }
    }
}

fn substitute_with<F>(regex: &Regex, text: &str, mut expand: F) -> Option<Substitution>
where
    F: FnMut(&Captures<'_>, &mut String),
{
    let mut value = String::with_capacity(text.len());
    let mut replacements = Vec::new();
    let mut last = 0;

    for caps in regex.captures_iter(text) {
        let Some(m) = caps.get(0) else { continue };
        value.push_str(&text[last..m.start()]);
        let start = value.len();
        expand(&caps, &mut value);
        replacements.push(Replacement {
            before: m.range(),
            after: start..value.len(),
        });
        last = m.end();
    }

    if replacements.is_empty() {
        return None;
    }
    value.push_str(&text[last..]);
    if value == text {
        return None;
    }
    Some(Substitution {
        value,
        replacements,
    })
}

/// Rewrites every group reference (`$1`, `$name`, `${name}`, `\1`,
/// `\g<name>`, `\g<1>`) into the braced `${..}` form understood by
/// [`Captures::expand`], rejecting groups the regex does not define. A `$`
/// that starts no reference, and `$$`, become a literal `$`.
fn translate_template(template: &str, regex: &Regex) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            translate_dollar(&mut chars, &mut out, regex)?;
            continue;
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                    group.push(d);
                    chars.next();
                }
                push_group(&mut out, &group, regex)?;
            }
            Some('g') => {
                chars.next();
                if chars.next() != Some('<') {
                    return Err(Error::Pattern(
                        "malformed group reference in replacement: expected \\g<name>".into(),
                    ));
                }
                let mut group = String::new();
                loop {
                    match chars.next() {
                        Some('>') => break,
                        Some(ch) => group.push(ch),
                        None => {
                            return Err(Error::Pattern(
                                "unterminated \\g<...> group reference in replacement".into(),
                            ));
                        }
                    }
                }
                push_group(&mut out, &group, regex)?;
            }
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some('n') => {
                chars.next();
                out.push('\n');
            }
            Some('t') => {
                chars.next();
                out.push('\t');
            }
            _ => out.push('\\'),
        }
    }
    Ok(out)
}

/// Handles what follows a `$`, using the same rules as the regex crate: `$$`
/// is a dollar, `${..}` takes everything up to the brace, and a bare name is
/// the longest run of `[_0-9A-Za-z]`.
fn translate_dollar(
    chars: &mut Peekable<Chars<'_>>,
    out: &mut String,
    regex: &Regex,
) -> Result<()> {
    match chars.peek().copied() {
        Some('$') => {
            chars.next();
            out.push_str("$$");
        }
        Some('{') => {
            let mut lookahead = chars.clone();
            lookahead.next();
            let mut group = String::new();
            let mut closed = false;
            for ch in lookahead.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                group.push(ch);
            }
            if closed {
                *chars = lookahead;
                push_group(out, &group, regex)?;
            } else {
                out.push_str("$$");
            }
        }
        _ => {
            let mut group = String::new();
            while let Some(ch) = chars
                .peek()
                .copied()
                .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            {
                group.push(ch);
                chars.next();
            }
            if group.is_empty() {
                out.push_str("$$");
            } else {
                push_group(out, &group, regex)?;
            }
        }
    }
    Ok(())
}

fn push_group(out: &mut String, group: &str, regex: &Regex) -> Result<()> {
    let known = match group.parse::<usize>() {
        Ok(index) => index < regex.captures_len(),
        Err(_) => regex.capture_names().flatten().any(|n| n == group),
    };
    if !known {
        return Err(Error::Pattern(format!(
            "replacement references unknown group `{group}`"
        )));
    }
    out.push_str("${");
    out.push_str(group);
    out.push('}');
    Ok(())
}
