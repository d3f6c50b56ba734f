//! User-facing output and prompting.
//!
//! Notifications carry a quiet switch instead of a global flag, and
//! prompting sits behind an injectable trait so tests can script answers
//! without a terminal.

use std::io::{self, BufRead, Write};

use crate::error::{MoverError, MoverResult};

/// Whether listings and diffs refer to elements or to paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Element notation: eids with `parent-eid/name` columns.
    #[default]
    Eids,
    /// Path notation.
    Paths,
}

impl UiMode {
    /// Parse the `--ui` option value (`eids`/`e` or `paths`/`p`).
    pub fn from_option(value: &str) -> MoverResult<Self> {
        match value {
            "eids" | "e" => Ok(UiMode::Eids),
            "paths" | "p" => Ok(UiMode::Paths),
            other => Err(MoverError::ArgParse(format!("unknown UI mode '{other}'"))),
        }
    }
}

/// Notification sink with a quiet switch.
///
/// `note` always prints; `verbose` is suppressed in quiet mode. Action
/// status lines (`A`, `D`, `M`, `V`, …) go through `verbose`, diff and
/// listing output through `note`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Notify {
    pub quiet: bool,
}

impl Notify {
    pub fn new(quiet: bool) -> Self {
        Notify { quiet }
    }

    pub fn note(&self, message: &str) {
        println!("{message}");
    }

    pub fn verbose(&self, message: &str) {
        if !self.quiet {
            println!("{message}");
        }
    }

    pub fn note_lines(&self, lines: &[String]) {
        for line in lines {
            self.note(line);
        }
    }
}

/// Interactive input, injectable for tests.
pub trait UserIo {
    /// Whether prompting is possible at all.
    fn is_interactive(&self) -> bool;

    /// Show `prompt` and read one line of input. `Ok(None)` means EOF.
    /// Cancellation surfaces as [`MoverError::Cancelled`].
    fn prompt(&mut self, prompt: &str) -> MoverResult<Option<String>>;
}

/// Console-backed prompting on stdin/stdout.
pub struct ConsoleIo {
    interactive: bool,
}

impl ConsoleIo {
    pub fn new(interactive: bool) -> Self {
        ConsoleIo { interactive }
    }
}

impl UserIo for ConsoleIo {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn prompt(&mut self, prompt: &str) -> MoverResult<Option<String>> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut line = String::new();
        let n = io::stdin().lock().read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Scripted responses for tests and non-interactive drivers.
#[derive(Debug, Default)]
pub struct ScriptedIo {
    responses: Vec<String>,
    next: usize,
}

impl ScriptedIo {
    pub fn new(responses: &[&str]) -> Self {
        ScriptedIo {
            responses: responses.iter().map(|s| s.to_string()).collect(),
            next: 0,
        }
    }
}

impl UserIo for ScriptedIo {
    fn is_interactive(&self) -> bool {
        true
    }

    fn prompt(&mut self, _prompt: &str) -> MoverResult<Option<String>> {
        match self.responses.get(self.next) {
            Some(r) => {
                self.next += 1;
                Ok(Some(r.clone()))
            }
            None => Ok(None),
        }
    }
}

/// A non-interactive stand-in that refuses to prompt.
#[derive(Debug, Default)]
pub struct NoPromptIo;

impl UserIo for NoPromptIo {
    fn is_interactive(&self) -> bool {
        false
    }

    fn prompt(&mut self, _prompt: &str) -> MoverResult<Option<String>> {
        Err(MoverError::Cancelled)
    }
}
