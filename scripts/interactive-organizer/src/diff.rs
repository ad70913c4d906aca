use std::collections::BTreeSet;
use std::path::Path;

use colored::Colorize;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::normalize;
use crate::tokens::{letter_runs, new_name_tokens, old_name_tokens, year_pattern};

static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Classification of the original filename's tokens against the current filename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub preserved: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No sidecar, nothing to compare against.
    NoMetadata,
    /// Original-cased tokens of the old name not found in the new one.
    HasMissingTokens(BTreeSet<String>),
    Clean,
}

impl Verdict {
    pub fn from_reconciliation(reconciliation: Option<&Reconciliation>) -> Self {
        match reconciliation {
            None => Verdict::NoMetadata,
            Some(r) if !r.missing.is_empty() => Verdict::HasMissingTokens(r.missing.clone()),
            Some(_) => Verdict::Clean,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Verdict::Clean)
    }
}

/// An old token is preserved when its normalized form occurs inside the
/// normalized form of any new token. Containment, not equality: "Physic" is
/// found in "Physics", and a short token may also hit an unrelated longer word.
pub fn diff(old_tokens: &[String], new_tokens: &[String]) -> Reconciliation {
    let corpus: Vec<String> = new_tokens.iter().map(|t| normalize(t)).collect();
    let mut result = Reconciliation::default();
    for token in old_tokens {
        let needle = normalize(token);
        if corpus.iter().any(|candidate| candidate.contains(&needle)) {
            result.preserved.insert(token.clone());
        } else {
            result.missing.insert(token.clone());
        }
    }
    result
}

fn stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Tokenizes both filenames (extensions dropped) and diffs them.
pub fn reconcile(old_name: &str, new_name: &str, ignore: &Regex, min_length: usize) -> Reconciliation {
    let old_tokens = old_name_tokens(stem(old_name), ignore, min_length);
    let new_tokens = new_name_tokens(stem(new_name), ignore);
    diff(&old_tokens, &new_tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Plain,
    Missing,
    Preserved,
    Year,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub mark: Mark,
}

/// Splits an old filename into display segments marked by token class and
/// publication year.
pub struct Highlighter {
    year: Regex,
}

impl Highlighter {
    pub fn new(current_year: i32) -> Self {
        let year = Regex::new(&format!("^{}$", year_pattern(current_year))).unwrap();
        Self { year }
    }

    pub fn segments(&self, old_name: &str, reconciliation: &Reconciliation) -> Vec<Segment> {
        let mut spans: Vec<(usize, usize, Mark)> = Vec::new();
        for run in DIGIT_RUN_RE.find_iter(old_name) {
            if self.year.is_match(run.as_str()) {
                spans.push((run.start(), run.end(), Mark::Year));
            }
        }
        // Tokens come from the stripped stem, so one may sit inside a longer
        // run such as "Physicsbook"; the longest token at each position wins.
        let tokens: Vec<(&str, Mark)> = reconciliation
            .missing
            .iter()
            .map(|t| (t.as_str(), Mark::Missing))
            .chain(reconciliation.preserved.iter().map(|t| (t.as_str(), Mark::Preserved)))
            .filter(|(t, _)| !t.is_empty())
            .collect();
        for run in letter_runs(old_name) {
            let text = run.as_str();
            let mut pos = 0;
            while pos < text.len() {
                let rest = &text[pos..];
                let best = tokens
                    .iter()
                    .filter(|(t, _)| rest.starts_with(t))
                    .max_by_key(|(t, _)| t.len());
                match best {
                    Some(&(token, mark)) => {
                        let start = run.start() + pos;
                        spans.push((start, start + token.len(), mark));
                        pos += token.len();
                    }
                    None => pos += rest.chars().next().map_or(1, char::len_utf8),
                }
            }
        }
        spans.sort_by_key(|(start, _, _)| *start);

        let mut segments = Vec::new();
        let mut cursor = 0;
        for (start, end, mark) in spans {
            if start > cursor {
                segments.push(Segment {
                    text: old_name[cursor..start].to_string(),
                    mark: Mark::Plain,
                });
            }
            segments.push(Segment {
                text: old_name[start..end].to_string(),
                mark,
            });
            cursor = end;
        }
        if cursor < old_name.len() {
            segments.push(Segment {
                text: old_name[cursor..].to_string(),
                mark: Mark::Plain,
            });
        }
        segments
    }

    pub fn paint(&self, old_name: &str, reconciliation: &Reconciliation) -> String {
        self.segments(old_name, reconciliation)
            .into_iter()
            .map(|segment| match segment.mark {
                Mark::Plain => segment.text,
                Mark::Missing => segment.text.red().to_string(),
                Mark::Preserved => segment.text.green().to_string(),
                Mark::Year => segment.text.blue().to_string(),
            })
            .collect()
    }
}
