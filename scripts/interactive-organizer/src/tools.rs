use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

static MARKUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n(\s*\n)+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DjvuMethod {
    Djvutxt,
    EbookConvert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EpubMethod {
    Epubtxt,
    EbookConvert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MswordMethod {
    Catdoc,
    Textutil,
    EbookConvert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PdfMethod {
    Pdftotext,
    EbookConvert,
}

/// Conversion program per document family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertMethods {
    pub djvu: DjvuMethod,
    pub epub: EpubMethod,
    pub msword: MswordMethod,
    pub pdf: PdfMethod,
}

impl Default for ConvertMethods {
    fn default() -> Self {
        Self {
            djvu: DjvuMethod::Djvutxt,
            epub: EpubMethod::EbookConvert,
            msword: MswordMethod::Textutil,
            pdf: PdfMethod::Pdftotext,
        }
    }
}

/// Exit status and captured output of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandReport {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<Output> for CommandReport {
    fn from(out: Output) -> Self {
        Self {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataQuery<'a> {
    Isbn(&'a str),
    Title(&'a str),
}

/// Programs the review loop hands work to.
pub trait Toolbox {
    /// Writes a plain-text rendition of `path` to `output`.
    fn convert_to_text(&self, path: &Path, mime: &str, output: &Path) -> Result<CommandReport>;
    /// Metadata text from one source; empty when the source has no match.
    fn fetch_metadata(&self, source: &str, query: MetadataQuery<'_>) -> Result<String>;
    /// Embedded metadata of an ebook file.
    fn inspect(&self, path: &Path) -> Result<CommandReport>;
    /// Opens the file in the desktop's default application.
    fn open(&self, path: &Path) -> Result<CommandReport>;
    /// Shows a text file in a pager on the terminal.
    fn page(&self, path: &Path) -> Result<()>;
    /// Interactive shell; returns when the operator leaves it.
    fn shell(&self) -> Result<()>;
}

/// MIME type from the file's magic bytes, else from its extension.
pub fn detect_mime(path: &Path) -> Option<String> {
    if let Ok(Some(kind)) = infer::get_from_path(path) {
        return Some(kind.mime_type().to_string());
    }
    let ext = path.extension().and_then(OsStr::to_str)?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" | "text" | "md" => "text/plain",
        "htm" | "html" | "xhtml" => "text/html",
        "xml" => "text/xml",
        "pdf" => "application/pdf",
        "epub" => "application/epub+zip",
        "djvu" | "djv" => "image/vnd.djvu",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "rtf" => "text/rtf",
        "mobi" | "azw" | "azw3" => "application/x-mobipocket-ebook",
        "fb2" => "application/x-fictionbook+xml",
        _ => return None,
    };
    Some(mime.to_string())
}

fn require(program: &str) -> Result<()> {
    which::which(program)
        .map(|_| ())
        .map_err(|_| anyhow!("'{program}' was not found in PATH"))
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn captured(mut cmd: Command) -> Result<CommandReport> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    require(&program)?;
    debug!("running {:?}", cmd);
    let out = cmd
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("running {program}"))?;
    Ok(out.into())
}

fn interactive(mut cmd: Command) -> Result<()> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    require(&program)?;
    let status = cmd.status().with_context(|| format!("running {program}"))?;
    debug!("{program} exited with {status}");
    Ok(())
}

fn stdout_to_file(report: CommandReport, output: &Path) -> Result<CommandReport> {
    fs::write(output, &report.stdout).with_context(|| format!("writing {:?}", output))?;
    Ok(report)
}

// The (x)html parts of an epub with the markup stripped.
fn epub_to_text(path: &Path, output: &Path) -> Result<CommandReport> {
    let mut cmd = Command::new("unzip");
    cmd.arg("-p").arg(path).args(["*.htm", "*.html", "*.xhtml"]);
    let mut report = captured(cmd)?;
    let text = MARKUP_RE.replace_all(&report.stdout, "");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n").into_owned();
    // unzip complains about patterns that matched nothing
    report.code = Some(if text.trim().is_empty() { 1 } else { 0 });
    report.stdout = text;
    stdout_to_file(report, output)
}

/// Runs the real command-line programs (calibre, poppler, djvulibre, ...).
#[derive(Debug, Clone, Default)]
pub struct SystemTools {
    pub methods: ConvertMethods,
}

impl SystemTools {
    pub fn new(methods: ConvertMethods) -> Self {
        Self { methods }
    }

    fn ebook_convert(path: &Path, output: &Path) -> Result<CommandReport> {
        let mut cmd = Command::new("ebook-convert");
        cmd.arg(path).arg(output);
        captured(cmd)
    }
}

impl Toolbox for SystemTools {
    fn convert_to_text(&self, path: &Path, mime: &str, output: &Path) -> Result<CommandReport> {
        let pb = spinner(format!("Converting '{}' to text...", path.display()));
        let report = if mime.contains("djvu") {
            match self.methods.djvu {
                DjvuMethod::Djvutxt => {
                    let mut cmd = Command::new("djvutxt");
                    cmd.arg(path).arg(output);
                    captured(cmd)
                }
                DjvuMethod::EbookConvert => Self::ebook_convert(path, output),
            }
        } else if mime == "application/epub+zip" {
            match self.methods.epub {
                EpubMethod::Epubtxt => epub_to_text(path, output),
                EpubMethod::EbookConvert => Self::ebook_convert(path, output),
            }
        } else if mime.contains("msword") || mime.contains("wordprocessingml") || mime.contains("rtf") {
            match self.methods.msword {
                MswordMethod::Catdoc => {
                    let mut cmd = Command::new("catdoc");
                    cmd.arg(path);
                    captured(cmd).and_then(|r| stdout_to_file(r, output))
                }
                MswordMethod::Textutil => {
                    let mut cmd = Command::new("textutil");
                    cmd.args(["-convert", "txt", "-output"]).arg(output).arg(path);
                    captured(cmd)
                }
                MswordMethod::EbookConvert => Self::ebook_convert(path, output),
            }
        } else if mime == "application/pdf" {
            match self.methods.pdf {
                PdfMethod::Pdftotext => {
                    let mut cmd = Command::new("pdftotext");
                    cmd.arg(path).arg(output);
                    captured(cmd)
                }
                PdfMethod::EbookConvert => Self::ebook_convert(path, output),
            }
        } else {
            Self::ebook_convert(path, output)
        };
        pb.finish_and_clear();
        report
    }

    fn fetch_metadata(&self, source: &str, query: MetadataQuery<'_>) -> Result<String> {
        let mut cmd = Command::new("fetch-ebook-metadata");
        if !source.is_empty() {
            cmd.arg(format!("--allowed-plugin={source}"));
        }
        match query {
            MetadataQuery::Isbn(isbn) => cmd.arg(format!("--isbn={isbn}")),
            MetadataQuery::Title(title) => cmd.arg(format!("--title={title}")),
        };
        let pb = spinner(format!("Querying '{source}'..."));
        let report = captured(cmd);
        pb.finish_and_clear();
        let report = report?;
        if !report.success() {
            warn!(
                "fetch-ebook-metadata ({source}) exited with {:?}: {}",
                report.code,
                report.stderr.trim()
            );
            return Ok(String::new());
        }
        Ok(report.stdout.trim().to_string())
    }

    fn inspect(&self, path: &Path) -> Result<CommandReport> {
        let mut cmd = Command::new("ebook-meta");
        cmd.arg(path);
        captured(cmd)
    }

    fn open(&self, path: &Path) -> Result<CommandReport> {
        let cmd = match std::env::consts::OS {
            "macos" => {
                let mut cmd = Command::new("open");
                cmd.arg(path);
                cmd
            }
            "windows" => {
                let mut cmd = Command::new("cmd");
                cmd.args(["/c", "start", ""]).arg(path);
                cmd
            }
            _ => {
                let mut cmd = Command::new("xdg-open");
                cmd.arg(path);
                cmd
            }
        };
        captured(cmd)
    }

    fn page(&self, path: &Path) -> Result<()> {
        let mut cmd = Command::new("less");
        cmd.arg(path);
        interactive(cmd)
    }

    fn shell(&self) -> Result<()> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "bash".to_string());
        interactive(Command::new(shell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_falls_back_to_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let txt = tmp.path().join("notes.txt");
        fs::write(&txt, "just text").unwrap();
        assert_eq!(detect_mime(&txt).as_deref(), Some("text/plain"));
        let unknown = tmp.path().join("blob.zzz");
        fs::write(&unknown, "???").unwrap();
        assert_eq!(detect_mime(&unknown), None);
    }

    #[test]
    fn mime_prefers_magic_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let pdf = tmp.path().join("mislabeled.txt");
        fs::write(&pdf, b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n").unwrap();
        assert_eq!(detect_mime(&pdf).as_deref(), Some("application/pdf"));
    }

    #[test]
    fn default_methods() {
        let methods = ConvertMethods::default();
        assert_eq!(methods.pdf, PdfMethod::Pdftotext);
        assert_eq!(methods.msword, MswordMethod::Textutil);
    }
}
