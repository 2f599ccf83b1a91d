use crate::config::Options;
use crate::editor::{LineEditor, PlainEditor, RustylineEditor};
use crate::exec::Executor;
use crate::parser::parse_command_line;
use crate::signals::{install_signal_handlers, Reaper};
use crate::terminal::Terminal;
use log::{debug, warn};
use nix::libc::STDIN_FILENO;
use nix::unistd::isatty;
use std::env;

/// Builds the prompt, e.g. `bshell [/home/user]> `.
pub fn prompt() -> String {
    let cwd = match env::current_dir() {
        Ok(path) => path.display().to_string(),
        Err(err) => {
            warn!("getcwd failed: {}", err);
            String::new()
        }
    };
    format!("bshell [{}]> ", cwd)
}

fn open_editor(options: &Options, interactive: bool) -> Box<dyn LineEditor> {
    if options.line_editing() && interactive {
        match RustylineEditor::new() {
            Ok(editor) => return Box::new(editor),
            Err(err) => warn!("line editing unavailable: {}", err),
        }
    }
    Box::new(PlainEditor::stdin(options.emit_prompt))
}

/// Runs the main shell loop: shows the prompt (if enabled), reads input,
/// parses it and executes the resulting command until end of input or
/// `exit`. Returns the shell's exit code.
pub fn run_shell(options: &Options) -> i32 {
    let interactive = isatty(STDIN_FILENO).unwrap_or(false);
    let reaper = Reaper::new();
    if let Err(err) = install_signal_handlers(reaper.clone()) {
        eprintln!("bshell: {}", err);
    }
    let terminal = if interactive {
        Terminal::acquire()
            .map_err(|err| warn!("no job control: {}", err))
            .ok()
    } else {
        None
    };

    let mut editor = open_editor(options, interactive);
    let mut executor = Executor::new(reaper, terminal);
    if editor.supports_history() {
        executor.enable_history();
    }

    let code = loop {
        executor.apply_notifications();

        let line = match editor.read_line(&prompt()) {
            Ok(Some(line)) => line,
            Ok(None) => break 0,
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                break 1;
            }
        };
        debug!("received command: {}", line.trim());

        match parse_command_line(&line) {
            Ok(mut command) => {
                if let Some(text) = command.to_command_line() {
                    editor.add_history(&text);
                    executor.record_history(text);
                }
                if options.print_commands {
                    command.print();
                }
                executor.execute(&mut command);
                if let Some(code) = executor.exit_requested() {
                    break code;
                }
            }
            Err(err) => eprintln!("bshell: parse error ({}): {}", err.code(), err),
        }
    };

    editor.save();
    executor.shutdown();
    code
}
