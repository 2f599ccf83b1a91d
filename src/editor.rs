use crate::config::HISTORY_FILE;
use crate::error::ShellError;
use log::{debug, warn};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Source of input lines for the read-eval loop.
pub trait LineEditor {
    /// Shows `prompt` and reads one line. `Ok(None)` means end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError>;

    /// Remembers an executed line for recall.
    fn add_history(&mut self, line: &str);

    /// Whether lines are kept in a history at all.
    fn supports_history(&self) -> bool;

    /// Persists the history, if any.
    fn save(&mut self) {}
}

/// Interactive editor with history, backed by rustyline.
pub struct RustylineEditor {
    editor: DefaultEditor,
    history_file: Option<PathBuf>,
}

impl RustylineEditor {
    pub fn new() -> Result<Self, ShellError> {
        let mut editor = DefaultEditor::new()?;
        let history_file = dirs_next::home_dir().map(|home| home.join(HISTORY_FILE));
        if let Some(path) = &history_file {
            if let Err(err) = editor.load_history(path) {
                debug!("no history loaded from {}: {}", path.display(), err);
            }
        }
        Ok(RustylineEditor {
            editor,
            history_file,
        })
    }
}

impl LineEditor for RustylineEditor {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line)),
            // Ctrl-C abandons the current line, like an empty command.
            Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
            Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn add_history(&mut self, line: &str) {
        if let Err(err) = self.editor.add_history_entry(line) {
            debug!("could not add history entry: {}", err);
        }
    }

    fn supports_history(&self) -> bool {
        true
    }

    fn save(&mut self) {
        if let Some(path) = &self.history_file {
            if let Err(err) = self.editor.save_history(path) {
                warn!("could not save history to {}: {}", path.display(), err);
            }
        }
    }
}

/// Line reader without editing or history, for scripts and pipes.
pub struct PlainEditor<R> {
    input: R,
    emit_prompt: bool,
}

impl PlainEditor<io::StdinLock<'static>> {
    pub fn stdin(emit_prompt: bool) -> Self {
        PlainEditor::new(io::stdin().lock(), emit_prompt)
    }
}

impl<R: BufRead> PlainEditor<R> {
    pub fn new(input: R, emit_prompt: bool) -> Self {
        PlainEditor { input, emit_prompt }
    }
}

impl<R: BufRead> LineEditor for PlainEditor<R> {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError> {
        if self.emit_prompt {
            print!("{}", prompt);
            io::stdout().flush()?;
        }
        let mut line = String::new();
        match self.input.read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line.trim_end_matches(['\n', '\r']).to_string())),
        }
    }

    fn add_history(&mut self, _line: &str) {}

    fn supports_history(&self) -> bool {
        false
    }
}
