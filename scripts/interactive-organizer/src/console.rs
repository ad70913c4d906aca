use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use crossterm::cursor::MoveToColumn;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{queue, QueueableCommand};

/// A single keypress, reduced to what the review menu distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Backspace,
    Tab,
    Enter,
    Esc,
    /// Ctrl+C
    Interrupt,
    Other,
}

/// Operator input.
pub trait Console {
    /// Blocks for one keypress.
    fn read_key(&mut self) -> Result<Key>;
    /// Reads one line of text starting from `prefill`. `None` when the
    /// operator interrupted the input.
    fn read_line(&mut self, prompt: &str, prefill: &str) -> Result<Option<String>>;
}

struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        terminal::enable_raw_mode().context("switching the terminal to raw mode")?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn next_key_event() -> Result<KeyEvent> {
    loop {
        if let Event::Key(key) = event::read().context("reading from the terminal")? {
            if key.kind != KeyEventKind::Release {
                return Ok(key);
            }
        }
    }
}

fn to_key(event: KeyEvent) -> Key {
    if event.modifiers.contains(KeyModifiers::CONTROL) {
        return match event.code {
            KeyCode::Char('c') => Key::Interrupt,
            _ => Key::Other,
        };
    }
    match event.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Tab => Key::Tab,
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Esc,
        _ => Key::Other,
    }
}

/// `~` or `~/...` resolved against `$HOME`.
pub fn expand_home(input: &str) -> PathBuf {
    if let Some(rest) = input.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(format!("{home}{rest}"));
            }
        }
    }
    PathBuf::from(input)
}

/// Completes the last path component of `text` against the filesystem.
///
/// Returns the extended text when at least one more character is certain:
/// the single match (with a trailing `/` for folders) or the longest prefix
/// shared by all matches.
pub fn complete_path(text: &str) -> Option<String> {
    let (typed_dir, prefix) = match text.rfind('/') {
        Some(idx) => (&text[..=idx], &text[idx + 1..]),
        None => ("", text),
    };
    let dir = if typed_dir.is_empty() {
        PathBuf::from(".")
    } else {
        expand_home(typed_dir)
    };
    let mut matches: Vec<(String, bool)> = fs::read_dir(&dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            (name, entry.path().is_dir())
        })
        .filter(|(name, _)| name.starts_with(prefix))
        .filter(|(name, _)| prefix.starts_with('.') || !name.starts_with('.'))
        .collect();
    matches.sort();
    let completed = match matches.as_slice() {
        [] => return None,
        [(name, true)] => format!("{name}/"),
        [(name, false)] => name.clone(),
        [(first, _), rest @ ..] => {
            let mut common: String = first.clone();
            for (name, _) in rest {
                let shared = common
                    .chars()
                    .zip(name.chars())
                    .take_while(|(a, b)| a == b)
                    .count();
                common = common.chars().take(shared).collect();
            }
            common
        }
    };
    if completed.len() <= prefix.len() {
        return None;
    }
    Some(format!("{typed_dir}{completed}"))
}

#[derive(Debug, PartialEq, Eq)]
enum Edit {
    Continue,
    Submit,
    Cancel,
}

/// Single-line buffer with a cursor, edited key by key.
#[derive(Debug, Default)]
struct LineEditor {
    buffer: Vec<char>,
    cursor: usize,
}

impl LineEditor {
    fn new(prefill: &str) -> Self {
        let buffer: Vec<char> = prefill.chars().collect();
        let cursor = buffer.len();
        Self { buffer, cursor }
    }

    fn text(&self) -> String {
        self.buffer.iter().collect()
    }

    fn apply(&mut self, event: KeyEvent) -> Edit {
        let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
        match event.code {
            KeyCode::Char('c') if ctrl => return Edit::Cancel,
            KeyCode::Char('a') if ctrl => self.cursor = 0,
            KeyCode::Char('e') if ctrl => self.cursor = self.buffer.len(),
            KeyCode::Char('u') if ctrl => {
                self.buffer.drain(..self.cursor);
                self.cursor = 0;
            }
            KeyCode::Char(c) if !ctrl => {
                self.buffer.insert(self.cursor, c);
                self.cursor += 1;
            }
            KeyCode::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.buffer.remove(self.cursor);
            }
            KeyCode::Delete if self.cursor < self.buffer.len() => {
                self.buffer.remove(self.cursor);
            }
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.buffer.len()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.buffer.len(),
            KeyCode::Tab => {
                if let Some(completed) = complete_path(&self.text()) {
                    self.buffer = completed.chars().collect();
                    self.cursor = self.buffer.len();
                }
            }
            KeyCode::Enter => return Edit::Submit,
            _ => {}
        }
        Edit::Continue
    }
}

fn redraw(out: &mut impl Write, prompt: &str, editor: &LineEditor) -> io::Result<()> {
    let column = prompt.chars().count() + editor.cursor;
    queue!(
        out,
        MoveToColumn(0),
        Clear(ClearType::CurrentLine),
        Print(prompt),
        Print(editor.text())
    )?;
    out.queue(MoveToColumn(column.min(u16::MAX as usize) as u16))?;
    out.flush()
}

/// The controlling terminal, read in raw mode.
#[derive(Debug, Default)]
pub struct TerminalConsole;

impl Console for TerminalConsole {
    fn read_key(&mut self) -> Result<Key> {
        let event = {
            let _raw = RawMode::enable()?;
            next_key_event()?
        };
        Ok(to_key(event))
    }

    fn read_line(&mut self, prompt: &str, prefill: &str) -> Result<Option<String>> {
        let mut editor = LineEditor::new(prefill);
        let mut out = io::stdout();
        let _raw = RawMode::enable()?;
        redraw(&mut out, prompt, &editor)?;
        loop {
            let edit = editor.apply(next_key_event()?);
            match edit {
                Edit::Continue => redraw(&mut out, prompt, &editor)?,
                Edit::Submit | Edit::Cancel => {
                    out.write_all(b"\r\n")?;
                    out.flush()?;
                    return Ok((edit == Edit::Submit).then(|| editor.text()));
                }
            }
        }
    }
}
