use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Letters that canonical decomposition leaves alone, with their ASCII spelling.
const TRANSLITERATIONS: &[(char, &str)] = &[
    ('ä', "ae"),
    ('æ', "ae"),
    ('ǽ', "ae"),
    ('đ', "d"),
    ('ð', "d"),
    ('ƒ', "f"),
    ('ħ', "h"),
    ('ı', "i"),
    ('ł', "l"),
    ('ø', "o"),
    ('ǿ', "o"),
    ('ö', "oe"),
    ('œ', "oe"),
    ('ß', "ss"),
    ('ŧ', "t"),
    ('ü', "ue"),
];

/// Comparison form of a token: lower-cased, transliterated, combining marks removed.
///
/// Only ever used to compare tokens; displayed names keep their original spelling.
pub fn normalize(token: &str) -> String {
    let lower = token.to_lowercase();
    let mut translated = String::with_capacity(lower.len());
    for ch in lower.chars() {
        match TRANSLITERATIONS.iter().find(|(latin, _)| *latin == ch) {
            Some((_, ascii)) => translated.push_str(ascii),
            None => translated.push(ch),
        }
    }
    translated.nfd().filter(|ch| !is_combining_mark(*ch)).collect()
}
