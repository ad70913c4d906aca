#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Result};
use interactive_organizer::sidecar::{format_field, OLD_FILE_PATH};
use interactive_organizer::{CommandReport, Console, Key, MetadataQuery, Toolbox};

/// Answer to one `read_line` call.
pub enum Line {
    Text(String),
    /// Accept whatever was prefilled.
    Prefill,
    Interrupt,
}

pub fn text(s: &str) -> Line {
    Line::Text(s.to_string())
}

pub fn keys(s: &str) -> Vec<Key> {
    s.chars().map(Key::Char).collect()
}

/// Console fed from a script; running out of input is an error so a test
/// never blocks.
#[derive(Default)]
pub struct ScriptedConsole {
    keys: VecDeque<Key>,
    lines: VecDeque<Line>,
    /// (prompt, prefill) of every `read_line` call.
    pub prompts: Vec<(String, String)>,
}

impl ScriptedConsole {
    pub fn new(keys: Vec<Key>, lines: Vec<Line>) -> Self {
        Self {
            keys: keys.into(),
            lines: lines.into(),
            prompts: Vec::new(),
        }
    }

    pub fn keys_left(&self) -> usize {
        self.keys.len()
    }
}

impl Console for ScriptedConsole {
    fn read_key(&mut self) -> Result<Key> {
        match self.keys.pop_front() {
            Some(key) => Ok(key),
            None => bail!("key script exhausted"),
        }
    }

    fn read_line(&mut self, prompt: &str, prefill: &str) -> Result<Option<String>> {
        self.prompts.push((prompt.to_string(), prefill.to_string()));
        match self.lines.pop_front() {
            Some(Line::Text(s)) => Ok(Some(s)),
            Some(Line::Prefill) => Ok(Some(prefill.to_string())),
            Some(Line::Interrupt) => Ok(None),
            None => bail!("line script exhausted"),
        }
    }
}

/// Records every call; metadata answers come from a per-source table.
#[derive(Clone, Default)]
pub struct FakeTools {
    pub metadata: HashMap<String, String>,
    pub calls: Rc<RefCell<Vec<String>>>,
    /// Behave as if Ctrl+C was pressed during every metadata fetch.
    pub interrupt_fetches: bool,
}

impl FakeTools {
    pub fn with_metadata(source: &str, text: &str) -> Self {
        let mut tools = Self::default();
        tools.metadata.insert(source.to_string(), text.to_string());
        tools
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

fn ok(stdout: &str) -> CommandReport {
    CommandReport {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

impl Toolbox for FakeTools {
    fn convert_to_text(&self, path: &Path, mime: &str, output: &Path) -> Result<CommandReport> {
        self.log(format!("convert {} {mime}", path.display()));
        fs::write(output, "converted text")?;
        Ok(ok(""))
    }

    fn fetch_metadata(&self, source: &str, query: MetadataQuery<'_>) -> Result<String> {
        self.log(format!("fetch {source} {query:?}"));
        if self.interrupt_fetches {
            interactive_organizer::signal::notify();
            return Ok(String::new());
        }
        Ok(self.metadata.get(source).cloned().unwrap_or_default())
    }

    fn inspect(&self, path: &Path) -> Result<CommandReport> {
        self.log(format!("inspect {}", path.display()));
        Ok(ok("Title               : Something"))
    }

    fn open(&self, path: &Path) -> Result<CommandReport> {
        self.log(format!("open {}", path.display()));
        Ok(ok(""))
    }

    fn page(&self, path: &Path) -> Result<()> {
        self.log(format!("page {}", path.display()));
        Ok(())
    }

    fn shell(&self) -> Result<()> {
        self.log("shell".to_string());
        Ok(())
    }
}

/// An input folder and one output folder inside a temporary directory.
pub struct Library {
    pub tmp: tempfile::TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
}

impl Library {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("input");
        let output = tmp.path().join("sorted");
        fs::create_dir_all(&input).unwrap();
        Self { tmp, input, output }
    }

    /// Creates `name` in the input folder, with a sidecar recording `old_path`
    /// when given.
    pub fn ebook(&self, name: &str, old_path: Option<&str>) -> PathBuf {
        let path = self.input.join(name);
        fs::write(&path, format!("contents of {name}")).unwrap();
        if let Some(old) = old_path {
            let meta = format!("{}\n", format_field(OLD_FILE_PATH, old));
            fs::write(self.sidecar(&path), meta).unwrap();
        }
        path
    }

    pub fn sidecar(&self, file: &Path) -> PathBuf {
        let mut s = file.as_os_str().to_owned();
        s.push(".meta");
        PathBuf::from(s)
    }

    pub fn leftovers(&self, folder: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(folder)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
