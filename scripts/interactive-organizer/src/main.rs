use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use colored::Colorize;
use log::{debug, info};
use regex::Regex;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};

use interactive_organizer::config::{
    to_strings, Config, ISBN_DIRECT_FILES, ISBN_METADATA_FETCH_ORDER,
    ORGANIZE_WITHOUT_ISBN_SOURCES, OUTPUT_METADATA_EXTENSION,
};
use interactive_organizer::console::TerminalConsole;
use interactive_organizer::relocate::TransferMode;
use interactive_organizer::template::{FilenameTemplate, DEFAULT_TEMPLATE};
use interactive_organizer::tokens::{default_tokens_to_ignore, TOKEN_MIN_LENGTH};
use interactive_organizer::tools::{
    ConvertMethods, DjvuMethod, EpubMethod, MswordMethod, PdfMethod, SystemTools,
};
use interactive_organizer::{organize, signal, BatchSummary};

#[derive(Parser, Debug)]
#[command(
    name = "interactive-organizer",
    version,
    about = "Review renamed ebooks against their original names and file them interactively"
)]
struct Cli {
    /// Folder with the ebooks to review (scanned recursively)
    folder_to_organize: PathBuf,

    /// Output folders; the first one is the default and quick-mode target
    #[arg(short, long, num_args = 1..)]
    output_folders: Vec<PathBuf>,

    /// Report what would be done without touching any file
    #[arg(short, long, action = ArgAction::SetTrue)]
    dry_run: bool,

    /// Leave files in place and symlink them from their destination
    #[arg(short, long, action = ArgAction::SetTrue)]
    symlink_only: bool,

    /// File every ebook whose new name keeps all words of the old one without asking
    #[arg(long = "quick-mode", visible_alias = "qm", action = ArgAction::SetTrue)]
    quick_mode: bool,

    /// Shortest old-filename word taken into account
    #[arg(long, default_value_t = TOKEN_MIN_LENGTH)]
    token_min_length: usize,

    /// Regex of words removed before comparing names (default: filler words,
    /// edition/volume markers and years)
    #[arg(long)]
    tokens_to_ignore: Option<String>,

    /// Prefill for the `m` command
    #[arg(short = 'c', long)]
    custom_move_base_dir: Option<PathBuf>,

    /// Base folder the `r` command restores original paths under
    #[arg(short = 'r', long)]
    restore_original_base_dir: Option<PathBuf>,

    /// Metadata sources queried, in order, when the search contains an ISBN
    #[arg(long, value_delimiter = ',', default_values_t = to_strings(ISBN_METADATA_FETCH_ORDER))]
    metadata_fetch_order: Vec<String>,

    /// Metadata sources queried, in order, for a title search
    #[arg(long = "organize-without-isbn-sources", visible_alias = "owis", value_delimiter = ',',
          default_values_t = to_strings(ORGANIZE_WITHOUT_ISBN_SOURCES))]
    organize_without_isbn_sources: Vec<String>,

    /// Conversion of djvu files to text
    #[arg(long, value_enum, default_value_t = DjvuMethod::Djvutxt)]
    djvu: DjvuMethod,

    /// Conversion of epub files to text
    #[arg(long, value_enum, default_value_t = EpubMethod::EbookConvert)]
    epub: EpubMethod,

    /// Conversion of Word documents to text
    #[arg(long, value_enum, default_value_t = MswordMethod::Textutil)]
    msword: MswordMethod,

    /// Conversion of pdf files to text
    #[arg(long, value_enum, default_value_t = PdfMethod::Pdftotext)]
    pdf: PdfMethod,

    /// Extension of the metadata sidecar files
    #[arg(long = "output-metadata-extension", visible_alias = "ome", default_value = OUTPUT_METADATA_EXTENSION)]
    output_metadata_extension: String,

    /// Filename template used when reorganizing from fetched metadata
    #[arg(long = "output-filename-template", visible_alias = "oft", default_value = DEFAULT_TEMPLATE)]
    output_filename_template: String,

    /// MIME types shown with the pager without conversion (regex)
    #[arg(long, default_value = ISBN_DIRECT_FILES)]
    isbn_direct_files: String,

    /// Append one JSON line per reviewed file to this journal
    #[arg(long)]
    journal: Option<PathBuf>,

    /// Log level when logging to the terminal (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    log_level: String,

    /// Explicit log file path (enables file logging). Ignored if empty.
    #[arg(long, default_value = "")]
    log_file: String,
}

fn init_logging(args: &Cli) {
    let level: LevelFilter = args.log_level.parse().unwrap_or(LevelFilter::Info);
    if !args.log_file.is_empty() {
        let log_path = PathBuf::from(&args.log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match std::fs::File::create(&log_path) {
            Ok(file) => {
                let cfg = ConfigBuilder::new()
                    .set_time_format_rfc3339()
                    .set_target_level(LevelFilter::Off)
                    .build();
                // operator warnings must stay on screen, the file gets everything
                let loggers = CombinedLogger::init(vec![
                    TermLogger::new(level, cfg.clone(), TerminalMode::Stderr, ColorChoice::Auto),
                    WriteLogger::new(level, cfg, file),
                ]);
                if let Err(e) = loggers {
                    eprintln!("[warn] file logger init failed: {e}");
                }
                return;
            }
            Err(e) => eprintln!("[warn] cannot create log file {:?}: {e}", log_path),
        }
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level.as_str()))
        .init();
}

fn build_config(args: Cli) -> Result<Config> {
    let mut config = Config::new(args.folder_to_organize)?;
    config.output_folders = args.output_folders;
    config.mode = TransferMode {
        dry_run: args.dry_run,
        symlink_only: args.symlink_only,
    };
    config.quick_mode = args.quick_mode;
    config.token_min_length = args.token_min_length;
    config.tokens_to_ignore = args
        .tokens_to_ignore
        .unwrap_or_else(default_tokens_to_ignore);
    config.custom_move_base_dir = args.custom_move_base_dir;
    config.restore_original_base_dir = args.restore_original_base_dir;
    config.isbn_metadata_fetch_order = args.metadata_fetch_order;
    config.organize_without_isbn_sources = args.organize_without_isbn_sources;
    config.convert_methods = ConvertMethods {
        djvu: args.djvu,
        epub: args.epub,
        msword: args.msword,
        pdf: args.pdf,
    };
    config.output_metadata_extension = args.output_metadata_extension;
    config.filename_template = FilenameTemplate::new(&args.output_filename_template);
    config.isbn_direct_files = Regex::new(&args.isbn_direct_files)
        .with_context(|| format!("invalid --isbn-direct-files pattern {:?}", args.isbn_direct_files))?;
    config.journal = args.journal;
    config.validate()?;
    Ok(config)
}

fn run(args: Cli) -> Result<BatchSummary> {
    let config = build_config(args)?;
    debug!("{:#?}", config);
    if config.mode.dry_run {
        info!("DRY RUN: no file will be moved, renamed or deleted by filing commands");
    }
    let tools = SystemTools::new(config.convert_methods);
    organize(&config, TerminalConsole, tools)
}

fn main() -> ExitCode {
    if let Err(e) = signal::install() {
        eprintln!("[warn] {e:#}");
    }
    let args = Cli::parse();
    init_logging(&args);
    match run(args) {
        Ok(summary) => {
            debug!(
                "{} of {} file(s) reviewed{}",
                summary.reviewed,
                summary.found,
                if summary.quit { ", stopped by the operator" } else { "" }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::from(1)
        }
    }
}
