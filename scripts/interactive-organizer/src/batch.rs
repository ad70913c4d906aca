use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use colored::Colorize;
use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::console::Console;
use crate::journal::Journal;
use crate::review::{Outcome, Reviewer};
use crate::tools::Toolbox;

const SEPARATOR: &str = "=====================================================";

/// Files under `folder` to review, sorted by file name. Hidden files and
/// sidecars are left out.
pub fn collect_files(folder: &Path, metadata_extension: &str) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        bail!("folder to organize {:?} does not exist", folder);
    }
    let sidecar_suffix = format!(".{metadata_extension}");
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(folder) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || name.ends_with(&sidecar_suffix) {
            continue;
        }
        files.push(entry.into_path());
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub found: usize,
    pub reviewed: usize,
    pub quit: bool,
}

/// Reviews every eligible file of the configured folder in turn, stopping
/// early when the operator quits.
pub fn organize<C: Console, T: Toolbox>(config: &Config, console: C, tools: T) -> Result<BatchSummary> {
    let files = collect_files(&config.folder_to_organize, &config.output_metadata_extension)?;
    info!(
        "Found {} ebook(s) to organize in '{}'",
        files.len(),
        config.folder_to_organize.display()
    );
    if files.is_empty() {
        let folder = &config.folder_to_organize;
        let bare = fs::read_dir(folder).map_or(false, |mut entries| entries.next().is_none());
        if bare {
            warn!("Folder is empty: '{}'", folder.display());
        } else {
            warn!("No ebooks found in folder: '{}'", folder.display());
        }
    }
    let mut journal = config.journal.as_deref().map(Journal::open).transpose()?;
    let mut reviewer = Reviewer::new(config, console, tools)?;
    let mut summary = BatchSummary {
        found: files.len(),
        ..Default::default()
    };

    println!("{SEPARATOR}");
    for file in &files {
        // an earlier action (shell, manual rename) may have removed it
        if file.symlink_metadata().is_err() {
            warn!("'{}' no longer exists, skipping it", file.display());
            continue;
        }
        match reviewer.review(file)? {
            Outcome::Quit => {
                debug!("Quitting");
                println!("{}", "Quitting!".blue());
                summary.quit = true;
                return Ok(summary);
            }
            Outcome::Disposed(disposition) => {
                summary.reviewed += 1;
                if let Some(journal) = journal.as_mut() {
                    journal.record(file, &disposition)?;
                }
            }
        }
        println!("{SEPARATOR}");
    }
    println!("{}", "No more ebooks to organize!".blue());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn skips_hidden_files_and_sidecars_and_sorts_by_name() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("b.pdf"), "").unwrap();
        fs::write(root.join("b.pdf.meta"), "").unwrap();
        fs::write(root.join(".hidden.pdf"), "").unwrap();
        fs::write(root.join("sub/a.epub"), "").unwrap();
        fs::write(root.join("c.djvu"), "").unwrap();

        let files = collect_files(root, "meta").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.epub", "b.pdf", "c.djvu"]);
    }

    #[test]
    fn missing_folder_is_an_error() {
        assert!(collect_files(Path::new("/no/such/folder"), "meta").is_err());
    }
}
