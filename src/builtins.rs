use crate::command::SimpleCommand;
use crate::error::ShellError;
use crate::exec::Executor;
use std::env;
use std::io::{self, Write};

/// Whether `name` is handled inside the shell. `hist` only exists while line
/// editing (and therefore history) is available.
pub fn is_builtin(name: &str, with_history: bool) -> bool {
    matches!(name, "exit" | "cd" | "status") || (with_history && name == "hist")
}

/// Checks if the command is a built-in command and, if so, executes it.
/// Supported built-ins are "exit", "cd", "status" and, with line editing,
/// "hist". Returns the result code if the command was handled.
/// Built-ins never fork and never show up in the status list.
pub fn handle_builtin(cmd: &SimpleCommand, executor: &mut Executor) -> Option<i32> {
    match cmd.name() {
        "exit" => {
            let code = cmd
                .tokens
                .get(1)
                .and_then(|arg| arg.parse().ok())
                .unwrap_or(0);
            executor.request_exit(code);
            Some(code)
        }
        "cd" => match change_directory(cmd.tokens.get(1).map(String::as_str)) {
            Ok(()) => Some(0),
            Err(err) => {
                eprintln!("bshell: {}", err);
                Some(1)
            }
        },
        "hist" => {
            let history = executor.history()?;
            let stdout = io::stdout();
            Some(report_io(write_history(&mut stdout.lock(), history)))
        }
        "status" => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            Some(report_io(executor.print_status(&mut out)))
        }
        _ => None,
    }
}

fn report_io(result: io::Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("bshell: {}", err);
            1
        }
    }
}

/// Changes the shell's working directory to `target`, or to `$HOME` when no
/// argument was given.
fn change_directory(target: Option<&str>) -> Result<(), ShellError> {
    let path = match target {
        Some(path) => path.to_string(),
        None => env::var("HOME").unwrap_or_default(),
    };
    if path.is_empty() {
        return Err(ShellError::Cd("invalid path".into()));
    }
    env::set_current_dir(&path).map_err(|err| ShellError::Cd(format!("{}: {}", path, err)))
}

fn write_history<W: Write>(out: &mut W, history: &[String]) -> io::Result<()> {
    writeln!(out, "--- History --- ")?;
    if history.is_empty() {
        writeln!(out, "history could not be found!")?;
    }
    for (i, line) in history.iter().enumerate() {
        writeln!(out, "{}: {}", i + 1, line)?;
    }
    writeln!(out, "--------------- ")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::List;
    use crate::signals::Reaper;

    fn simple(tokens: &[&str]) -> SimpleCommand {
        SimpleCommand::new(
            tokens.iter().map(|t| t.to_string()).collect(),
            List::new(),
            false,
        )
    }

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin("cd", false));
        assert!(is_builtin("status", false));
        assert!(is_builtin("exit", false));
        assert!(!is_builtin("hist", false));
        assert!(is_builtin("hist", true));
        assert!(!is_builtin("ls", true));
    }

    #[test]
    fn test_not_a_builtin() {
        let mut executor = Executor::new(Reaper::new(), None);
        assert_eq!(handle_builtin(&simple(&["ls", "-l"]), &mut executor), None);
    }

    #[test]
    fn test_exit_defaults_to_zero() {
        let mut executor = Executor::new(Reaper::new(), None);
        assert_eq!(handle_builtin(&simple(&["exit"]), &mut executor), Some(0));
        assert_eq!(executor.exit_requested(), Some(0));

        let mut executor = Executor::new(Reaper::new(), None);
        assert_eq!(handle_builtin(&simple(&["exit", "7"]), &mut executor), Some(7));
        assert_eq!(executor.exit_requested(), Some(7));
    }

    #[test]
    fn test_hist_needs_history() {
        let mut executor = Executor::new(Reaper::new(), None);
        assert_eq!(handle_builtin(&simple(&["hist"]), &mut executor), None);

        executor.enable_history();
        executor.record_history("ls -l".into());
        assert_eq!(handle_builtin(&simple(&["hist"]), &mut executor), Some(0));
    }

    #[test]
    fn test_write_history() {
        let mut out = Vec::new();
        write_history(&mut out, &["ls".to_string(), "pwd".to_string()]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "--- History --- \n1: ls\n2: pwd\n--------------- \n"
        );
    }

    #[test]
    fn test_cd_missing_directory() {
        let before = env::current_dir().unwrap();
        assert!(change_directory(Some("/nonexistent/bshell/dir")).is_err());
        assert_eq!(env::current_dir().unwrap(), before);
    }
}
