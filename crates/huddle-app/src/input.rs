//! Key presses the [`crate::App`] understands.
//!
//! Front ends translate whatever they read (raw terminal keys, whole stdin
//! lines, scripted test input) into [`KeyInput`] so the compose line and
//! slash commands behave identically everywhere.

/// One key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Character inserted at the cursor.
    Char(char),
    /// Submit the compose line as a message or command.
    Enter,
    /// Remove the character left of the cursor.
    Backspace,
    /// Remove the character under the cursor.
    Delete,
    /// Leave the session.
    Esc,
    /// Cursor one character left.
    Left,
    /// Cursor one character right.
    Right,
    /// Scroll towards older messages.
    Up,
    /// Scroll towards newer messages.
    Down,
    /// Cursor to the start of the line.
    Home,
    /// Cursor to the end of the line.
    End,
}

impl KeyInput {
    /// Key presses typing `text` without submitting it.
    pub fn typed(text: &str) -> impl Iterator<Item = Self> + '_ {
        text.chars().map(Self::Char)
    }

    /// Key presses typing `line` and submitting it with Enter.
    pub fn line(line: &str) -> impl Iterator<Item = Self> + '_ {
        Self::typed(line).chain(std::iter::once(Self::Enter))
    }
}
