use crate::console::Key;

/// What the operator asked for on the review menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// File into the output folder with this index.
    Slot(usize),
    Move,
    Restore,
    Reorganize,
    Open,
    Read,
    ShowMetadata,
    Inspect,
    EditIgnore,
    Terminal,
    Skip,
    Quit,
    Interrupt,
}

// Alternative keys map onto the same command as their letter.
const KEY_TABLE: &[(Key, Command)] = &[
    (Key::Char('m'), Command::Move),
    (Key::Tab, Command::Move),
    (Key::Char('r'), Command::Restore),
    (Key::Char('i'), Command::Reorganize),
    (Key::Backspace, Command::Reorganize),
    (Key::Char('o'), Command::Open),
    (Key::Enter, Command::Open),
    (Key::Char('l'), Command::Read),
    (Key::Char('c'), Command::ShowMetadata),
    (Key::Char('?'), Command::Inspect),
    (Key::Char('e'), Command::EditIgnore),
    (Key::Char('t'), Command::Terminal),
    (Key::Char('`'), Command::Terminal),
    (Key::Char('s'), Command::Skip),
    (Key::Char('q'), Command::Quit),
    (Key::Esc, Command::Quit),
    (Key::Char(' '), Command::Slot(0)),
    (Key::Interrupt, Command::Interrupt),
];

pub fn command_for(key: Key) -> Option<Command> {
    if let Key::Char(c) = key {
        if let Some(digit) = c.to_digit(10) {
            return Some(Command::Slot(digit as usize));
        }
    }
    KEY_TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, command)| *command)
}

/// Printable name of a key for the "Chosen option" echo.
pub fn describe(key: Key) -> String {
    match key {
        Key::Char(' ') => "space".to_string(),
        Key::Char(c) => c.to_string(),
        Key::Backspace => "backspace".to_string(),
        Key::Tab => "tab".to_string(),
        Key::Enter => "enter".to_string(),
        Key::Esc => "esc".to_string(),
        Key::Interrupt => "ctrl+c".to_string(),
        Key::Other => "?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_select_slots() {
        assert_eq!(command_for(Key::Char('0')), Some(Command::Slot(0)));
        assert_eq!(command_for(Key::Char('7')), Some(Command::Slot(7)));
        assert_eq!(command_for(Key::Char(' ')), Some(Command::Slot(0)));
    }

    #[test]
    fn alternative_keys_match_letters() {
        let pairs = [
            (Key::Backspace, 'i'),
            (Key::Tab, 'm'),
            (Key::Enter, 'o'),
            (Key::Char('`'), 't'),
            (Key::Esc, 'q'),
        ];
        for (alt, letter) in pairs {
            assert_eq!(command_for(alt), command_for(Key::Char(letter)));
        }
    }

    #[test]
    fn letters_are_case_sensitive() {
        assert_eq!(command_for(Key::Char('q')), Some(Command::Quit));
        assert_eq!(command_for(Key::Char('Q')), None);
        assert_eq!(command_for(Key::Char('x')), None);
        assert_eq!(command_for(Key::Other), None);
    }
}
