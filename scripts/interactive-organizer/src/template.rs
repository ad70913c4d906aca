use anyhow::{bail, Result};

use crate::sidecar::lookup;

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

pub const DEFAULT_TEMPLATE: &str = "{authors} - {series}{title}{year}{isbn}.{ext}";

/// Filename pattern for files organized from fetched metadata.
///
/// Placeholders: `{authors}` (comma separated), `{series}` (rendered as
/// `[series] - `), `{title}`, `{year}` (` (yyyy)`), `{isbn}` (` [isbn]`) and
/// `{ext}`. Optional parts render as nothing when the field is absent.
#[derive(Debug, Clone)]
pub struct FilenameTemplate {
    pattern: String,
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

fn field<'a>(metadata: &'a str, key: &str) -> Option<&'a str> {
    lookup(metadata, key).filter(|v| !v.is_empty())
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| {
            if INVALID_FILENAME_CHARS.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    cleaned
        .trim_matches(|ch: char| ch == '.' || ch.is_whitespace())
        .to_string()
}

impl FilenameTemplate {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
        }
    }

    /// Builds a file name from `Key : value` metadata. Fails without a title.
    pub fn render(&self, metadata: &str, extension: &str) -> Result<String> {
        let Some(title) = field(metadata, "Title") else {
            bail!("fetched metadata has no title");
        };
        let title = title.replacen(':', " -", 1);
        let authors = field(metadata, "Author(s)")
            .or_else(|| field(metadata, "Authors"))
            .map(|a| a.replace(" & ", ", "))
            .unwrap_or_default();
        let series = field(metadata, "Series")
            .map(|s| format!("[{s}] - "))
            .unwrap_or_default();
        let year = field(metadata, "Published")
            .and_then(|p| p.split('-').next())
            .filter(|y| !y.is_empty())
            .map(|y| format!(" ({y})"))
            .unwrap_or_default();
        let isbn = field(metadata, "ISBN")
            .map(|i| format!(" [{i}]"))
            .unwrap_or_default();

        let stem_and_ext = self
            .pattern
            .replace("{authors}", &sanitize(&authors))
            .replace("{series}", &sanitize_keep_edges(&series))
            .replace("{title}", &sanitize(&title))
            .replace("{year}", &year)
            .replace("{isbn}", &sanitize_keep_edges(&isbn));
        let rendered = if extension.is_empty() {
            stem_and_ext.replace(".{ext}", "").replace("{ext}", "")
        } else {
            stem_and_ext.replace("{ext}", extension)
        };
        let rendered = rendered.trim_start_matches(" - ").trim().to_string();
        if rendered.is_empty() {
            bail!("filename template {:?} rendered an empty name", self.pattern);
        }
        Ok(rendered)
    }
}

// optional parts carry their own separators, only replace the characters
fn sanitize_keep_edges(part: &str) -> String {
    part.chars()
        .map(|ch| {
            if matches!(ch, '/' | '\\' | '<' | '>' | '"' | '|' | '?' | '*') || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_full_metadata() {
        let meta = "Title               : Dune: Deluxe Edition\n\
                    Author(s)           : Frank Herbert\n\
                    Series              : Dune #1\n\
                    Published           : 1965-08-01T00:00:00+00:00\n\
                    ISBN                : 9780441013593\n";
        let name = FilenameTemplate::default().render(meta, "epub").unwrap();
        assert_eq!(
            name,
            "Frank Herbert - [Dune #1] - Dune - Deluxe Edition (1965) [9780441013593].epub"
        );
    }

    #[test]
    fn optional_parts_disappear() {
        let meta = "Title : Notes\nAuthor(s) : A & B\n";
        let name = FilenameTemplate::default().render(meta, "pdf").unwrap();
        assert_eq!(name, "A, B - Notes.pdf");
    }

    #[test]
    fn path_separators_are_replaced() {
        let meta = "Title : Input/Output\nAuthor(s) : X\n";
        let name = FilenameTemplate::default().render(meta, "pdf").unwrap();
        assert_eq!(name, "X - Input_Output.pdf");
    }

    #[test]
    fn missing_title_is_an_error() {
        assert!(FilenameTemplate::default()
            .render("Author(s) : X\n", "pdf")
            .is_err());
    }

    #[test]
    fn custom_pattern_without_authors() {
        let meta = "Title : Notes\n";
        let name = FilenameTemplate::new("{title}{year}.{ext}")
            .render(meta, "")
            .unwrap();
        assert_eq!(name, "Notes");
    }
}
