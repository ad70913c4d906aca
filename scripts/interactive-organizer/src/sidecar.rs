use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const OLD_FILE_PATH: &str = "Old file path";
pub const METADATA_SOURCE: &str = "Metadata source";
pub const ISBN: &str = "ISBN";

/// Column the key is padded to before the colon. Cosmetic only.
const KEY_WIDTH: usize = 20;

/// `<file>.<extension>`, the sidecar location for `file`.
pub fn sidecar_path(file: &Path, extension: &str) -> PathBuf {
    let mut os: OsString = file.as_os_str().to_owned();
    os.push(".");
    os.push(extension);
    PathBuf::from(os)
}

pub fn format_field(key: &str, value: &str) -> String {
    format!("{key:<width$}: {value}", width = KEY_WIDTH)
}

/// Value of the last `key : value` line; later lines override earlier ones.
pub fn lookup<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.lines()
        .filter_map(|line| {
            let rest = line.trim_start().strip_prefix(key)?;
            let value = rest.trim_start().strip_prefix(':')?;
            Some(value.trim())
        })
        .last()
}

/// Appends fields to a metadata text, one line each.
pub fn append_fields(text: &mut String, fields: &[(&str, &str)]) {
    for (key, value) in fields {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&format_field(key, value));
        text.push('\n');
    }
}

/// A metadata record stored next to an ebook file.
#[derive(Debug, Clone)]
pub struct Sidecar {
    pub path: PathBuf,
    pub text: String,
}

impl Sidecar {
    /// `Ok(None)` when no sidecar exists.
    pub fn load(path: &Path) -> Result<Option<Sidecar>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(Sidecar {
                path: path.to_path_buf(),
                text: String::from_utf8_lossy(&bytes).into_owned(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading metadata {:?}", path)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        lookup(&self.text, key)
    }

    pub fn old_file_path(&self) -> Option<PathBuf> {
        self.get(OLD_FILE_PATH)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }
}

/// Replaces any sidecar at `path` with a single `Old file path` line.
pub fn write_old_path(path: &Path, old_path: &Path) -> Result<()> {
    let line = format!("{}\n", format_field(OLD_FILE_PATH, &old_path.display().to_string()));
    fs::write(path, line).with_context(|| format!("writing metadata {:?}", path))
}
