use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Datelike;
use colored::Colorize;
use log::{debug, error, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::config::{Config, SessionState};
use crate::console::{expand_home, Console};
use crate::diff::{reconcile, Highlighter, Verdict};
use crate::isbn::{find_isbns, find_isbns_joined};
use crate::keymap::{command_for, describe, Command};
use crate::relocate::{move_or_link_file, move_to_path, organize_with_metadata, relocate};
use crate::sidecar::{
    append_fields, sidecar_path, write_old_path, Sidecar, ISBN, METADATA_SOURCE, OLD_FILE_PATH,
};
use crate::signal;
use crate::tools::{detect_mime, MetadataQuery, Toolbox};

const WRAP_WIDTH: usize = 100;
const MIB: f64 = 1024.0 * 1024.0;

/// How a file left the review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Sent to the output folder with this index.
    Filed { slot: usize, dest: PathBuf },
    /// Clean verdict in quick mode, sent to the first output folder.
    QuickFiled { dest: PathBuf },
    /// Moved to an operator-typed path (`m` or `r`).
    Moved { dest: PathBuf },
    Skipped,
    /// Quick mode without any output folder.
    Unfiled,
}

impl Disposition {
    pub fn action(&self) -> &'static str {
        match self {
            Disposition::Filed { .. } => "filed",
            Disposition::QuickFiled { .. } => "quick-filed",
            Disposition::Moved { .. } => "moved",
            Disposition::Skipped => "skipped",
            Disposition::Unfiled => "unfiled",
        }
    }

    pub fn destination(&self) -> Option<&Path> {
        match self {
            Disposition::Filed { dest, .. }
            | Disposition::QuickFiled { dest }
            | Disposition::Moved { dest } => Some(dest),
            Disposition::Skipped | Disposition::Unfiled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Disposed(Disposition),
    /// The operator asked to stop the whole batch.
    Quit,
}

enum Step {
    Stay,
    /// Keep reviewing, now under a new path.
    Continue(PathBuf),
    Done(Outcome),
}

struct Presentation {
    verdict: Verdict,
    sidecar: Option<Sidecar>,
    old_path: PathBuf,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().nfkc().collect())
        .unwrap_or_default()
}

/// Greedy word wrap; a word longer than `width` gets a line of its own.
pub fn wrap(line: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn print_wrapped(text: &str, prefix: &str) {
    for line in text.lines() {
        for (i, wrapped) in wrap(line, WRAP_WIDTH).iter().enumerate() {
            if i == 0 {
                println!("{prefix}{wrapped}");
            } else {
                println!("{prefix}   {wrapped}");
            }
        }
    }
}

/// Per-file review loop: shows how the current name compares to the recorded
/// original one, then runs operator commands until the file is disposed of or
/// the batch is abandoned.
pub struct Reviewer<'a, C, T> {
    config: &'a Config,
    session: SessionState,
    highlighter: Highlighter,
    console: C,
    tools: T,
}

impl<'a, C: Console, T: Toolbox> Reviewer<'a, C, T> {
    pub fn new(config: &'a Config, console: C, tools: T) -> Result<Self> {
        Ok(Self {
            config,
            session: SessionState::new(config)?,
            highlighter: Highlighter::new(chrono::Local::now().year()),
            console,
            tools,
        })
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    fn metadata_path(&self, file: &Path) -> PathBuf {
        sidecar_path(file, &self.config.output_metadata_extension)
    }

    fn load_sidecar(&self, file: &Path) -> Option<Sidecar> {
        match Sidecar::load(&self.metadata_path(file)) {
            Ok(sidecar) => sidecar,
            Err(e) => {
                warn!("{e:#}");
                None
            }
        }
    }

    pub fn review(&mut self, file: &Path) -> Result<Outcome> {
        let mut current = file.to_path_buf();
        loop {
            let shown = self.present(&current);
            if self.config.quick_mode && shown.verdict.is_clean() {
                match self.quick_file(&current) {
                    Ok(disposition) => return Ok(Outcome::Disposed(disposition)),
                    Err(e) => error!("Quick mode could not file '{}': {e:#}", current.display()),
                }
            }
            self.print_menu(&shown.old_path);
            signal::arm();
            signal::take_pending();

            let key = self.console.read_key()?;
            let step = match command_for(key) {
                Some(command) => {
                    println!("Chosen option: {}", describe(key));
                    self.dispatch(command, &current, &shown)?
                }
                None => {
                    warn!("Invalid option '{}'!", describe(key));
                    Step::Stay
                }
            };
            if signal::take_pending() {
                debug!("Detected ctrl+c!");
                println!();
            }
            match step {
                Step::Stay => println!(),
                Step::Continue(next) => {
                    debug!("New path is '{}', reviewing it...", next.display());
                    println!();
                    current = next;
                }
                Step::Done(outcome) => return Ok(outcome),
            }
        }
    }

    fn present(&self, file: &Path) -> Presentation {
        let name = display_name(file);
        let size = fs::metadata(file)
            .map(|m| format!("{:.2} MiB", m.len() as f64 / MIB))
            .unwrap_or_else(|_| "? MiB".to_string());
        let parent = file.parent().unwrap_or_else(|| Path::new(""));
        let header = format!("File '{name}' ({} in '{}')", size.bold(), parent.display());

        let Some(sidecar) = self.load_sidecar(file) else {
            println!("{header}{}", " [no metadata]".red().bold());
            return Presentation {
                verdict: Verdict::NoMetadata,
                sidecar: None,
                old_path: file.to_path_buf(),
            };
        };
        println!("{header}{}", " [has metadata]".bold());

        let old_path = sidecar.old_file_path().unwrap_or_else(|| file.to_path_buf());
        let old_name = display_name(&old_path);
        let reconciliation = reconcile(
            &old_name,
            &name,
            self.session.ignore(),
            self.config.token_min_length,
        );
        println!(
            "Old name '{}'",
            self.highlighter.paint(&old_name, &reconciliation)
        );
        let verdict = Verdict::from_reconciliation(Some(&reconciliation));
        match &verdict {
            Verdict::HasMissingTokens(missing) => {
                let missing: Vec<&str> = missing.iter().map(String::as_str).collect();
                println!(
                    "Missing words from the old file name: {}",
                    missing.join(", ").bold()
                );
            }
            _ => println!("{}", "No missing words from the old filename in the new!".bold()),
        }
        if verdict.is_clean() && self.config.quick_mode {
            println!("Quick mode enabled, skipping to the next file");
        }
        Presentation {
            verdict,
            sidecar: Some(sidecar),
            old_path,
        }
    }

    fn quick_file(&self, file: &Path) -> Result<Disposition> {
        let Some(folder) = self.config.output_folders.first() else {
            warn!("Quick mode is enabled but no output folders (`-o` option) were specified!");
            return Ok(Disposition::Unfiled);
        };
        let relocation = relocate(
            file,
            folder,
            &self.config.output_metadata_extension,
            self.config.mode,
        )?;
        Ok(Disposition::QuickFiled {
            dest: relocation.file,
        })
    }

    fn restore_target(&self, old_path: &Path) -> Option<PathBuf> {
        let base = self.config.restore_original_base_dir.as_ref()?;
        let relative = old_path.strip_prefix("/").unwrap_or(old_path);
        Some(base.join(relative))
    }

    fn print_menu(&self, old_path: &Path) {
        println!("Possible actions:");
        for (i, folder) in self.config.output_folders.iter().enumerate() {
            let key = if i == 0 {
                format!("{i}/spc")
            } else {
                i.to_string()
            };
            println!(
                " {:<8} Move file and metadata to '{}'",
                format!("{key})").bold(),
                folder.display()
            );
        }
        if let Some(target) = self.restore_target(old_path) {
            let target: String = target.display().to_string().nfkc().collect();
            println!(
                " {:<8} Restore file with original path to '{target}' and delete metadata",
                "r)".bold()
            );
        }
        let rows = [
            ("m/tab)", "Move to another folder", "i/bs)", "Interactively reorganize the file"),
            ("o/ent)", "Open file in external viewer", "l)", "Read in terminal"),
            ("c)", "Read the saved metadata file", "?)", "Run ebook-meta on the file"),
            ("t/`)", "Run shell in terminal", "e)", "Edit the tokens to ignore"),
            ("s)", "Skip file", "q/esc)", "Quit"),
        ];
        for (left_key, left, right_key, right) in rows {
            println!(
                " {:<8} {left:<32}| {:<8} {right}",
                left_key.bold(),
                right_key.bold()
            );
        }
    }

    fn dispatch(&mut self, command: Command, file: &Path, shown: &Presentation) -> Result<Step> {
        match command {
            Command::Slot(slot) => Ok(self.file_into_slot(slot, file)),
            Command::Move => self.move_elsewhere(file, None),
            Command::Restore => match self.restore_target(&shown.old_path) {
                Some(target) => self.move_elsewhere(file, Some(target)),
                None => {
                    warn!("`restore-original-base-dir` is empty!");
                    Ok(Step::Stay)
                }
            },
            Command::Reorganize => Ok(match self.reorganize(file)? {
                Some(next) => Step::Continue(next),
                None => Step::Stay,
            }),
            Command::Open => {
                info!("Opening the document...");
                match self.tools.open(file) {
                    Ok(report) if report.success() => debug!("viewer exited with {:?}", report.code),
                    Ok(report) => error!(
                        "Viewer exited with {:?}: {}",
                        report.code,
                        report.stderr.trim()
                    ),
                    Err(e) => error!("{e:#}"),
                }
                Ok(Step::Stay)
            }
            Command::Read => {
                if let Err(e) = self.read_in_terminal(file) {
                    error!("{e:#}");
                }
                Ok(Step::Stay)
            }
            Command::ShowMetadata => {
                match &shown.sidecar {
                    Some(sidecar) => print_wrapped(&sidecar.text, "\t"),
                    None => warn!("There is no metadata file present!"),
                }
                Ok(Step::Stay)
            }
            Command::Inspect => {
                info!("Starting ebook-meta...");
                match self.tools.inspect(file) {
                    Ok(report) => {
                        debug!("ebook-meta exited with {:?}", report.code);
                        print_wrapped(&report.stdout, "\t");
                        if !report.success() {
                            warn!("ebook-meta failed: {}", report.stderr.trim());
                        }
                    }
                    Err(e) => error!("{e:#}"),
                }
                Ok(Step::Stay)
            }
            Command::EditIgnore => {
                let current = self.session.tokens_to_ignore().to_string();
                if let Some(pattern) = self.console.read_line("Edit: TOKENS_TO_IGNORE=", &current)? {
                    if !pattern.is_empty() {
                        match self.session.set_tokens_to_ignore(&pattern) {
                            Ok(()) => info!("Tokens to ignore are now '{pattern}'"),
                            Err(e) => warn!("{e:#}, keeping the previous pattern"),
                        }
                    }
                }
                Ok(Step::Stay)
            }
            Command::Terminal => {
                info!("Launching shell...");
                if let Err(e) = self.tools.shell() {
                    error!("{e:#}");
                }
                Ok(Step::Stay)
            }
            Command::Skip => {
                info!("Skipping the file!");
                Ok(Step::Done(Outcome::Disposed(Disposition::Skipped)))
            }
            Command::Quit => Ok(Step::Done(Outcome::Quit)),
            Command::Interrupt => {
                debug!("Detected ctrl+c!");
                Ok(Step::Stay)
            }
        }
    }

    fn file_into_slot(&self, slot: usize, file: &Path) -> Step {
        let Some(folder) = self.config.output_folders.get(slot) else {
            warn!("Invalid output path {slot}!");
            return Step::Stay;
        };
        match relocate(
            file,
            folder,
            &self.config.output_metadata_extension,
            self.config.mode,
        ) {
            Ok(relocation) => Step::Done(Outcome::Disposed(Disposition::Filed {
                slot,
                dest: relocation.file,
            })),
            Err(e) => {
                error!("{e:#}");
                Step::Stay
            }
        }
    }

    /// `m` and `r`: move to a typed path. `restore` carries the prefilled
    /// original location for `r`.
    fn move_elsewhere(&mut self, file: &Path, restore: Option<PathBuf>) -> Result<Step> {
        let prefill = match restore {
            Some(target) => target.display().to_string(),
            None => match &self.config.custom_move_base_dir {
                Some(dir) => dir.display().to_string(),
                None => {
                    warn!("`custom-move-base-dir` is empty!");
                    String::new()
                }
            },
        };
        let Some(input) = self
            .console
            .read_line("Delete metadata if it exists and move the file to: ", &prefill)?
        else {
            return Ok(Step::Stay);
        };
        let input = input.trim();
        if input.is_empty() {
            warn!("No path entered, ignoring!");
            return Ok(Step::Stay);
        }
        let target = expand_home(input);
        if target.extension().is_none() {
            warn!("You didn't enter a file path (with extension)!");
            return Ok(Step::Stay);
        }
        info!("Moving file '{}' to '{}'...", file.display(), target.display());
        match move_to_path(file, &target, &self.config.output_metadata_extension) {
            Ok(()) => Ok(Step::Done(Outcome::Disposed(Disposition::Moved { dest: target }))),
            Err(e) => {
                error!("{e:#}");
                Ok(Step::Stay)
            }
        }
    }

    fn read_in_terminal(&self, file: &Path) -> Result<()> {
        let mime = detect_mime(file).unwrap_or_default();
        info!("Reading '{}' ({mime}) with less...", file.display());
        if self.config.isbn_direct_files.is_match(&mime) {
            return self.tools.page(file);
        }
        let text = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .context("creating a temporary text file")?;
        let report = self.tools.convert_to_text(file, &mime, text.path())?;
        if !report.success() {
            error!(
                "There was an error converting the ebook to txt format: {}",
                report.stderr.trim()
            );
            return Ok(());
        }
        self.tools.page(text.path())
    }

    /// `i`: rename by hand or from fetched metadata. Returns the path the
    /// review should continue with, `None` to stay on `file`.
    fn reorganize(&mut self, file: &Path) -> Result<Option<PathBuf>> {
        let folder = file.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        let old_path = self
            .load_sidecar(file)
            .and_then(|s| s.old_file_path())
            .unwrap_or_else(|| file.to_path_buf());
        let prefill = display_name(&old_path);
        let Some(answer) = self
            .console
            .read_line("Enter search terms or 'new filename': ", &prefill)?
        else {
            return Ok(None);
        };
        info!("Your choice: {answer}");
        if answer.is_empty() {
            return Ok(None);
        }
        if answer.len() >= 3 && answer.starts_with('\'') && answer.ends_with('\'') {
            let name = &answer[1..answer.len() - 1];
            return Ok(self.rename_by_hand(file, &folder.join(name), &old_path));
        }
        self.organize_from_search(file, &folder, &answer)
    }

    fn rename_by_hand(&self, file: &Path, target: &Path, old_path: &Path) -> Option<PathBuf> {
        info!(
            "Renaming file to '{}', removing the old metadata if present and saving old file path in the new metadata...",
            target.display()
        );
        let mode = self.config.mode;
        if let Err(e) = move_or_link_file(file, target, mode) {
            error!("{e:#}");
            return None;
        }
        if mode.dry_run {
            debug!("DRY RUN: not deleting old metadata nor saving new metadata");
            return None;
        }
        let old_sidecar = self.metadata_path(file);
        if old_sidecar.is_file() {
            if let Err(e) = fs::remove_file(&old_sidecar) {
                warn!("Could not remove '{}': {e}", old_sidecar.display());
            }
        }
        if let Err(e) = write_old_path(&self.metadata_path(target), old_path) {
            error!("{e:#}");
        }
        Some(target.to_path_buf())
    }

    fn organize_from_search(
        &mut self,
        file: &Path,
        folder: &Path,
        query: &str,
    ) -> Result<Option<PathBuf>> {
        let config = self.config;
        let isbn = find_isbns(query).into_iter().next();
        let (query, sources) = match &isbn {
            Some(isbn) => (MetadataQuery::Isbn(isbn), &config.isbn_metadata_fetch_order),
            None => (MetadataQuery::Title(query), &config.organize_without_isbn_sources),
        };
        // Dropped on every exit; on success it becomes the new sidecar.
        let mut buffer = tempfile::Builder::new()
            .prefix(".fetched-")
            .suffix(".txt")
            .tempfile_in(folder)
            .or_else(|_| tempfile::Builder::new().suffix(".txt").tempfile())
            .context("creating a buffer for fetched metadata")?;
        info!(
            "Fetching metadata from sources {:?} for {:?} into '{}'...",
            sources,
            query,
            buffer.path().display()
        );

        for source in sources {
            // Left pending for the menu loop.
            if signal::pending() {
                break;
            }
            info!("Fetching metadata from '{source}' sources...");
            let fetched = self.tools.fetch_metadata(source, query);
            if signal::pending() {
                warn!("Interrupted while fetching from '{source}', returning to the main menu!");
                break;
            }
            let metadata = match fetched {
                Ok(metadata) => metadata,
                Err(e) => {
                    error!("{e:#}");
                    continue;
                }
            };
            if metadata.trim().is_empty() {
                continue;
            }
            println!("Successfully fetched metadata:");
            print_wrapped(&metadata, "[meta] ");
            let answer = self
                .console
                .read_line("Do you want to use these metadata to rename the file (y/n/Q): ", "")?;
            match answer.as_deref().map(str::trim) {
                Some("y" | "Y") => info!("You chose yes, renaming the file..."),
                Some("n" | "N") => {
                    info!("You chose no, trying the next metadata source...");
                    continue;
                }
                Some("q" | "Q") => {
                    info!("You chose to quit, returning to the main menu!");
                    break;
                }
                Some(other) => {
                    info!("Invalid choice '{other}', returning to the main menu!");
                    break;
                }
                None => break,
            }

            let mut text = metadata.clone();
            let file_path = file.display().to_string();
            append_fields(
                &mut text,
                &[(OLD_FILE_PATH, file_path.as_str()), (METADATA_SOURCE, source.as_str())],
            );
            let isbn_field = match &isbn {
                Some(isbn) => isbn.clone(),
                None => find_isbns_joined(&metadata, " - "),
            };
            if !isbn_field.is_empty() {
                append_fields(&mut text, &[(ISBN, isbn_field.as_str())]);
            }
            let out = buffer.as_file_mut();
            out.write_all(text.as_bytes())
                .and_then(|_| out.flush())
                .context("writing fetched metadata")?;

            debug!("Organizing '{}' (with '{}')...", file.display(), buffer.path().display());
            let mode = config.mode;
            let dest = match organize_with_metadata(
                file,
                folder,
                buffer,
                &config.filename_template,
                &config.output_metadata_extension,
                mode,
            ) {
                Ok(dest) => dest,
                Err(e) => {
                    error!("{e:#}");
                    return Ok(None);
                }
            };
            if mode.dry_run {
                debug!("DRY RUN: would have reorganized to '{}'", dest.display());
                return Ok(None);
            }
            let old_sidecar = self.metadata_path(file);
            if old_sidecar != self.metadata_path(&dest) && old_sidecar.is_file() {
                info!("Removing old metadata file '{}'...", old_sidecar.display());
                if let Err(e) = fs::remove_file(&old_sidecar) {
                    warn!("Could not remove '{}': {e}", old_sidecar.display());
                }
            }
            return Ok(Some(dest));
        }
        Ok(None)
    }
}
