use crate::utils;

/// Name of the history file kept in the user's home directory.
pub const HISTORY_FILE: &str = ".bshell_history";

/// Command-line options of the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Print the `bshell [cwd]> ` prompt.
    pub emit_prompt: bool,
    /// Log at debug level unless `RUST_LOG` says otherwise.
    pub verbose: bool,
    /// Dump every parsed command tree before executing it.
    pub print_commands: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            emit_prompt: true,
            verbose: false,
            print_commands: false,
        }
    }
}

impl Options {
    /// Parses the arguments following the program name. `-h` prints usage
    /// and exits; unknown arguments are ignored.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Options {
        let mut options = Options::default();
        for arg in args {
            match arg.as_ref() {
                "-h" => utils::print_usage(),
                "-v" => options.verbose = true,
                "-p" => options.emit_prompt = false,
                "--print-commands" => options.print_commands = true,
                _ => {}
            }
        }
        options
    }

    /// Line editing and history are only used when a prompt is shown.
    pub fn line_editing(&self) -> bool {
        self.emit_prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::from_args::<&str>(&[]);
        assert_eq!(options, Options::default());
        assert!(options.line_editing());
    }

    #[test]
    fn test_flags() {
        let options = Options::from_args(&["-v", "-p", "--print-commands", "--bogus"]);
        assert!(options.verbose);
        assert!(!options.emit_prompt);
        assert!(options.print_commands);
        assert!(!options.line_editing());
    }
}
