use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::review::Disposition;

#[derive(Debug, Serialize)]
struct Record<'a> {
    path: String,
    action: &'a str,
    dest: Option<String>,
    ts: String,
}

/// Append-only JSONL log of what happened to each reviewed file.
pub struct Journal {
    file: File,
}

impl Journal {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("creating folder {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening journal {:?}", path))?;
        Ok(Self { file })
    }

    pub fn record(&mut self, path: &Path, disposition: &Disposition) -> Result<()> {
        let rec = Record {
            path: path.display().to_string(),
            action: disposition.action(),
            dest: disposition.destination().map(|d| d.display().to_string()),
            ts: chrono::Utc::now().to_rfc3339(),
        };
        writeln!(self.file, "{}", serde_json::to_string(&rec)?)?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn appends_one_object_per_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs/journal.jsonl");
        let mut journal = Journal::open(&path).unwrap();
        journal
            .record(
                Path::new("/in/a.pdf"),
                &Disposition::Filed {
                    slot: 0,
                    dest: PathBuf::from("/out/a.pdf"),
                },
            )
            .unwrap();
        journal
            .record(Path::new("/in/b.pdf"), &Disposition::Skipped)
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["action"], "filed");
        assert_eq!(lines[0]["dest"], "/out/a.pdf");
        assert_eq!(lines[1]["action"], "skipped");
        assert!(lines[1]["dest"].is_null());
        assert!(lines[1]["ts"].as_str().unwrap().contains('T'));
    }
}
