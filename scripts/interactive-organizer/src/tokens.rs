use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::normalize::normalize;

/// Words shorter than this (after normalization) are not compared.
pub const TOKEN_MIN_LENGTH: usize = 3;

/// Lowest year considered a plausible publication year.
const YEAR_LOWER_BOUND: i32 = 1000;

static LETTER_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{M}]+").unwrap());

/// Regex alternation matching the four-digit years 1000..=`current_year`.
///
/// The alternation has no anchors; callers decide what may surround a year.
pub fn year_pattern(current_year: i32) -> String {
    let year = current_year.clamp(YEAR_LOWER_BOUND, 9999);
    let digits: Vec<u8> = year
        .to_string()
        .bytes()
        .map(|b| b - b'0')
        .collect();
    let mut alternatives = Vec::new();
    let lead = digits[0];
    if lead > 1 {
        alternatives.push(format!("{}[0-9][0-9][0-9]", digit_class(1, lead - 1)));
    }
    upto(&lead.to_string(), &digits[1..], &mut alternatives);
    format!("(?:{})", alternatives.join("|"))
}

fn digit_class(lo: u8, hi: u8) -> String {
    if lo == hi {
        lo.to_string()
    } else {
        format!("[{lo}-{hi}]")
    }
}

// Every number starting with `prefix` whose remaining digits are <= `rest`.
fn upto(prefix: &str, rest: &[u8], out: &mut Vec<String>) {
    let Some((&first, tail)) = rest.split_first() else {
        out.push(prefix.to_string());
        return;
    };
    if tail.is_empty() {
        out.push(format!("{prefix}{}", digit_class(0, first)));
        return;
    }
    if first > 0 {
        out.push(format!(
            "{prefix}{}{}",
            digit_class(0, first - 1),
            "[0-9]".repeat(tail.len())
        ));
    }
    upto(&format!("{prefix}{first}"), tail, out);
}

/// Year pattern bounded by the current calendar year.
pub fn current_year_pattern() -> String {
    year_pattern(chrono::Local::now().year())
}

/// Default boilerplate filter: filler words, edition/volume markers and years.
///
/// `ed(ition)` and `vol(ume)` are anchored so that words like "Structured" keep their ending.
pub fn default_tokens_to_ignore() -> String {
    format!(
        "ebook|book|novel|series|^ed(ition)?$|^vol(ume)?$|{}",
        current_year_pattern()
    )
}

/// Compiles a boilerplate filter: case-sensitive, `^`/`$` match at line boundaries.
pub fn compile_ignore_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .with_context(|| format!("invalid tokens-to-ignore pattern {pattern:?}"))
}

/// Maximal runs of letters in `s`; digits and punctuation separate tokens.
pub fn letter_runs(s: &str) -> impl Iterator<Item = regex::Match<'_>> {
    LETTER_RUN_RE.find_iter(s)
}

fn strip_boilerplate(stem: &str, ignore: &Regex) -> String {
    ignore.replace_all(stem, "").into_owned()
}

/// Tokens of an original filename stem that take part in the comparison.
///
/// Boilerplate is removed first, then tokens whose normalized form is shorter
/// than `min_length` are dropped. Order of first appearance is kept, duplicates
/// are not.
pub fn old_name_tokens(stem: &str, ignore: &Regex, min_length: usize) -> Vec<String> {
    let stripped = strip_boilerplate(stem, ignore);
    let mut seen = HashSet::new();
    letter_runs(&stripped)
        .map(|m| m.as_str())
        .filter(|token| normalize(token).chars().count() >= min_length)
        .filter(|token| seen.insert(token.to_string()))
        .map(str::to_string)
        .collect()
}

/// Tokens of the current filename stem. Not length-filtered: they only serve as
/// the corpus old tokens are searched in.
pub fn new_name_tokens(stem: &str, ignore: &Regex) -> Vec<String> {
    let stripped = strip_boilerplate(stem, ignore);
    letter_runs(&stripped)
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_ignore() -> Regex {
        compile_ignore_pattern(&format!(
            "ebook|book|novel|series|^ed(ition)?$|^vol(ume)?$|{}",
            year_pattern(2026)
        ))
        .unwrap()
    }

    #[test]
    fn year_pattern_bounds() {
        let re = Regex::new(&format!("^{}$", year_pattern(2026))).unwrap();
        for ok in ["1000", "1492", "1999", "2000", "2019", "2020", "2026"] {
            assert!(re.is_match(ok), "{ok}");
        }
        for bad in ["0999", "2027", "2030", "2100", "3000", "999"] {
            assert!(!re.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn year_pattern_in_another_decade() {
        let re = Regex::new(&format!("^{}$", year_pattern(2031))).unwrap();
        assert!(re.is_match("2029"));
        assert!(re.is_match("2031"));
        assert!(!re.is_match("2032"));
    }

    #[test]
    fn short_tokens_are_dropped_from_old_names() {
        let tokens = old_name_tokens("An Introduction to Go", &default_ignore(), 3);
        assert_eq!(tokens, vec!["Introduction"]);
        for token in &tokens {
            assert!(normalize(token).chars().count() >= 3);
        }
    }

    #[test]
    fn boilerplate_is_removed_regardless_of_punctuation() {
        let tokens = old_name_tokens(
            "Physics_ebook-(series).novel[book] 2009",
            &default_ignore(),
            3,
        );
        assert_eq!(tokens, vec!["Physics"]);
    }

    #[test]
    fn edition_marker_only_matches_whole_stem() {
        let ignore = default_ignore();
        assert_eq!(old_name_tokens("Structured", &ignore, 3), vec!["Structured"]);
        assert!(old_name_tokens("edition", &ignore, 3).is_empty());
    }

    #[test]
    fn digits_split_tokens() {
        let tokens = new_name_tokens("Vol2Physics 3rd", &default_ignore());
        assert_eq!(tokens, vec!["Vol", "Physics", "rd"]);
    }

    #[test]
    fn new_tokens_keep_short_words() {
        let tokens = new_name_tokens("Go in Action", &default_ignore());
        assert_eq!(tokens, vec!["Go", "in", "Action"]);
    }

    #[test]
    fn duplicates_are_collapsed() {
        let tokens = old_name_tokens("Physics and Physics", &default_ignore(), 3);
        assert_eq!(tokens, vec!["Physics", "and"]);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(compile_ignore_pattern("book|(").is_err());
    }
}
