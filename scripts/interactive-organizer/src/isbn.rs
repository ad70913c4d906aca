use once_cell::sync::Lazy;
use regex::Regex;

// Digits with optional dashes, possibly ending in an ISBN-10 check character.
static CANDIDATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9][0-9\-]{8,}[0-9Xx]").unwrap());

fn is_blacklisted(isbn: &str) -> bool {
    if isbn == "0123456789" {
        return true;
    }
    let mut chars = isbn.chars();
    match chars.next() {
        Some(first) => chars.all(|c| c == first),
        None => true,
    }
}

fn valid_isbn10(isbn: &str) -> bool {
    let chars: Vec<char> = isbn.chars().collect();
    if chars.len() != 10 || !chars[..9].iter().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let mut sum = 0u32;
    for (i, c) in chars.iter().enumerate() {
        let value = match c {
            'X' | 'x' if i == 9 => 10,
            c => match c.to_digit(10) {
                Some(d) => d,
                None => return false,
            },
        };
        sum += (10 - i as u32) * value;
    }
    sum % 11 == 0
}

fn valid_isbn13(isbn: &str) -> bool {
    if isbn.len() != 13 || !(isbn.starts_with("978") || isbn.starts_with("979")) {
        return false;
    }
    let mut sum = 0u32;
    for (i, c) in isbn.chars().enumerate() {
        let Some(d) = c.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 0 { d } else { 3 * d };
    }
    sum % 10 == 0
}

/// Valid ISBN-10 and ISBN-13 numbers found in `text`, dashes removed, in order
/// of appearance and without duplicates.
pub fn find_isbns(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for candidate in CANDIDATE_RE.find_iter(text) {
        let isbn: String = candidate
            .as_str()
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if (valid_isbn10(&isbn) || valid_isbn13(&isbn))
            && !is_blacklisted(&isbn)
            && !found.contains(&isbn)
        {
            found.push(isbn);
        }
    }
    found
}

/// `find_isbns` joined with `separator`; empty when nothing was found.
pub fn find_isbns_joined(text: &str, separator: &str) -> String {
    find_isbns(text).join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_dashed_and_plain_isbns() {
        let text = "Cormen ISBN 978-0-262-03384-8, also 0262033844 and 080442957x";
        assert_eq!(
            find_isbns(text),
            vec!["9780262033848", "0262033844", "080442957X"]
        );
    }

    #[test]
    fn rejects_bad_checksums_and_blacklist() {
        assert!(find_isbns("9780262033849").is_empty());
        assert!(find_isbns("0123456789").is_empty());
        assert!(find_isbns("1111111111").is_empty());
        assert!(find_isbns("published 2009-07-31").is_empty());
    }

    #[test]
    fn joins_with_separator_and_dedupes() {
        assert_eq!(
            find_isbns_joined("9780262033848 978-0-262-03384-8 0262033844", " - "),
            "9780262033848 - 0262033844"
        );
        assert_eq!(find_isbns_joined("no numbers here", "\n"), "");
    }
}
