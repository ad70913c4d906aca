use std::path::PathBuf;

use anyhow::{Context, Result};
use regex::Regex;

use crate::relocate::TransferMode;
use crate::template::FilenameTemplate;
use crate::tokens::{compile_ignore_pattern, default_tokens_to_ignore, TOKEN_MIN_LENGTH};
use crate::tools::ConvertMethods;

pub const ISBN_METADATA_FETCH_ORDER: &[&str] = &[
    "Goodreads",
    "Amazon.com",
    "Google",
    "ISBNDB",
    "WorldCat xISBN",
    "OZON.ru",
];
pub const ORGANIZE_WITHOUT_ISBN_SOURCES: &[&str] = &["Goodreads", "Amazon.com", "Google"];
pub const OUTPUT_METADATA_EXTENSION: &str = "meta";
pub const ISBN_DIRECT_FILES: &str = "^text/(plain|xml|html)$";

/// Run-wide settings, fixed for the whole batch.
#[derive(Debug, Clone)]
pub struct Config {
    pub folder_to_organize: PathBuf,
    pub output_folders: Vec<PathBuf>,
    pub mode: TransferMode,
    pub quick_mode: bool,
    pub token_min_length: usize,
    pub tokens_to_ignore: String,
    pub custom_move_base_dir: Option<PathBuf>,
    pub restore_original_base_dir: Option<PathBuf>,
    pub isbn_metadata_fetch_order: Vec<String>,
    pub organize_without_isbn_sources: Vec<String>,
    pub convert_methods: ConvertMethods,
    pub output_metadata_extension: String,
    pub filename_template: FilenameTemplate,
    /// MIME types that the pager can show without conversion.
    pub isbn_direct_files: Regex,
    pub journal: Option<PathBuf>,
}

impl Config {
    /// Defaults for everything but the folder to organize.
    pub fn new(folder_to_organize: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            folder_to_organize: folder_to_organize.into(),
            output_folders: Vec::new(),
            mode: TransferMode::default(),
            quick_mode: false,
            token_min_length: TOKEN_MIN_LENGTH,
            tokens_to_ignore: default_tokens_to_ignore(),
            custom_move_base_dir: None,
            restore_original_base_dir: None,
            isbn_metadata_fetch_order: to_strings(ISBN_METADATA_FETCH_ORDER),
            organize_without_isbn_sources: to_strings(ORGANIZE_WITHOUT_ISBN_SOURCES),
            convert_methods: ConvertMethods::default(),
            output_metadata_extension: OUTPUT_METADATA_EXTENSION.to_string(),
            filename_template: FilenameTemplate::default(),
            isbn_direct_files: Regex::new(ISBN_DIRECT_FILES)?,
            journal: None,
        })
    }

    pub fn validate(&self) -> Result<()> {
        compile_ignore_pattern(&self.tokens_to_ignore)
            .context("invalid --tokens-to-ignore pattern")?;
        if !self.folder_to_organize.is_dir() {
            anyhow::bail!(
                "folder to organize {:?} does not exist or is not a folder",
                self.folder_to_organize
            );
        }
        Ok(())
    }
}

pub fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Settings the operator may change while reviewing; they carry over to the
/// following files of the batch.
#[derive(Debug, Clone)]
pub struct SessionState {
    tokens_to_ignore: String,
    ignore: Regex,
}

impl SessionState {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            ignore: compile_ignore_pattern(&config.tokens_to_ignore)?,
            tokens_to_ignore: config.tokens_to_ignore.clone(),
        })
    }

    pub fn tokens_to_ignore(&self) -> &str {
        &self.tokens_to_ignore
    }

    pub fn ignore(&self) -> &Regex {
        &self.ignore
    }

    /// Keeps the previous pattern when `pattern` does not compile.
    pub fn set_tokens_to_ignore(&mut self, pattern: &str) -> Result<()> {
        self.ignore = compile_ignore_pattern(pattern)?;
        self.tokens_to_ignore = pattern.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new("/books").unwrap();
        assert_eq!(config.token_min_length, 3);
        assert_eq!(config.output_metadata_extension, "meta");
        assert_eq!(config.isbn_metadata_fetch_order[0], "Goodreads");
        assert_eq!(config.organize_without_isbn_sources.len(), 3);
        assert!(config.isbn_direct_files.is_match("text/plain"));
        assert!(!config.isbn_direct_files.is_match("application/pdf"));
    }

    #[test]
    fn missing_folder_fails_validation() {
        let config = Config::new("/definitely/not/here").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_ignore_pattern_fails_validation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::new(tmp.path()).unwrap();
        config.tokens_to_ignore = "book|(".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_session_edit_keeps_previous_pattern() {
        let config = Config::new("/books").unwrap();
        let mut session = SessionState::new(&config).unwrap();
        assert!(session.set_tokens_to_ignore("[").is_err());
        assert_eq!(session.tokens_to_ignore(), config.tokens_to_ignore);
        session.set_tokens_to_ignore("foo").unwrap();
        assert!(session.ignore().is_match("foo"));
    }
}
