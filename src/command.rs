use crate::list::List;
use crate::utils::{quote_word, unquote};
use std::fmt::{self, Write as _};
use std::os::unix::io::RawFd;

/// The kinds of command a parsed line can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Blank line.
    Empty,
    /// A single program invocation, e.g. `ls -l`.
    Simple,
    /// Commands joined by `;`.
    Sequence,
    /// Commands joined by `|`.
    Pipe,
    /// Commands joined by `&&`.
    And,
    /// Commands joined by `||`.
    Or,
    If,
    While,
}

impl CommandType {
    /// The operator token that joins the elements of this command type.
    pub fn operator(self) -> Option<&'static str> {
        match self {
            CommandType::Sequence => Some(";"),
            CommandType::Pipe => Some("|"),
            CommandType::And => Some("&&"),
            CommandType::Or => Some("||"),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            CommandType::Empty => "EMPTY_COMMAND",
            CommandType::Simple => "SIMPLE_COMMAND",
            CommandType::Sequence => "SEQUENCE_COMMAND",
            CommandType::Pipe => "PIPE_COMMAND",
            CommandType::And => "AND_COMMAND",
            CommandType::Or => "OR_COMMAND",
            CommandType::If => "IF_COMMAND",
            CommandType::While => "WHILE_COMMAND",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandType::Empty => "empty",
            CommandType::Simple => "simple",
            CommandType::Sequence => "sequence",
            CommandType::Pipe => "pipe",
            CommandType::And => "and",
            CommandType::Or => "or",
            CommandType::If => "if",
            CommandType::While => "while",
        };
        f.write_str(name)
    }
}

/// How a redirection uses its target: `<`, `>` or `>>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Read,
    Write,
    Append,
}

impl RedirectMode {
    pub fn token(self) -> &'static str {
        match self {
            RedirectMode::Read => "<",
            RedirectMode::Write => ">",
            RedirectMode::Append => ">>",
        }
    }

    fn label(self) -> &'static str {
        match self {
            RedirectMode::Read => "READ",
            RedirectMode::Write => "WRITE",
            RedirectMode::Append => "APPEND",
        }
    }
}

/// Where a redirection points: an already open descriptor or a named file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    Fd(RawFd),
    File(String),
}

/// A single I/O redirection of a simple command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub target: RedirectTarget,
    pub mode: RedirectMode,
}

impl Redirection {
    /// Redirection to or from a named file, e.g. `> out.txt`.
    pub fn file(mode: RedirectMode, filename: impl Into<String>) -> Self {
        Redirection {
            target: RedirectTarget::File(filename.into()),
            mode,
        }
    }

    /// Redirection to or from an open descriptor, e.g. `>&2`.
    pub fn fd(mode: RedirectMode, fd: RawFd) -> Self {
        Redirection {
            target: RedirectTarget::Fd(fd),
            mode,
        }
    }

    fn write_line(&self, out: &mut String) {
        match &self.target {
            RedirectTarget::File(name) => {
                let _ = write!(out, "{} {}", self.mode.token(), quote_word(name));
            }
            RedirectTarget::Fd(fd) => {
                let _ = write!(out, "{}&{}", self.mode.token(), fd);
            }
        }
    }

    fn write_tree(&self, out: &mut String) {
        match &self.target {
            RedirectTarget::File(name) => {
                let _ = write!(
                    out,
                    " {{mode: \"{}\", type: \"file\", filename: \"{}\"}}",
                    self.mode.label(),
                    name
                );
            }
            RedirectTarget::Fd(fd) => {
                let _ = write!(
                    out,
                    " {{mode: \"{}\", type: \"descriptor\", filedescriptor: {}}}",
                    self.mode.label(),
                    fd
                );
            }
        }
    }
}

/// One program invocation with its arguments, redirections and `&` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCommand {
    /// Program name followed by its arguments.
    pub tokens: Vec<String>,
    /// Redirections, applied in list order.
    pub redirections: List<Redirection>,
    /// True if the command was followed by `&`.
    pub background: bool,
}

impl SimpleCommand {
    pub fn new(tokens: Vec<String>, redirections: List<Redirection>, background: bool) -> Self {
        SimpleCommand {
            tokens,
            redirections,
            background,
        }
    }

    /// The program name (argv[0]), or an empty string for a token-less command.
    pub fn name(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or("")
    }

    pub fn argc(&self) -> usize {
        self.tokens.len()
    }

    /// Strips one surrounding pair of double quotes from every argument and
    /// every file name.
    pub fn unquote(&mut self) {
        for token in self.tokens.iter_mut() {
            unquote(token);
        }
        for redirection in self.redirections.iter_mut() {
            if let RedirectTarget::File(name) = &mut redirection.target {
                unquote(name);
            }
        }
    }

    fn write_line(&self, out: &mut String) {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&quote_word(token));
        }
        for redirection in &self.redirections {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            redirection.write_line(out);
        }
    }

    fn write_tree(&self, indent: usize, out: &mut String) {
        let _ = writeln!(
            out,
            "{:indent$}<SIMPLE_COMMAND> {{command: \"{}\", background: \"{}\"}}",
            "",
            self.tokens.join(" "),
            if self.background { "yes" } else { "no" },
            indent = indent
        );
        if self.redirections.is_empty() {
            return;
        }
        let _ = writeln!(out, "{:indent$} <REDIRECTIONS>", "", indent = indent);
        for redirection in &self.redirections {
            let _ = write!(out, "{:indent$} <REDIRECTION>", "", indent = indent + 2);
            redirection.write_tree(out);
            out.push_str(" </REDIRECTION>\n");
        }
        let _ = writeln!(out, "{:indent$} </REDIRECTIONS>", "", indent = indent);
    }
}

/// The simple commands making up a command, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSequence {
    pub command_list: List<SimpleCommand>,
}

impl CommandSequence {
    pub fn len(&self) -> usize {
        self.command_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.command_list.is_empty()
    }
}

/// A parsed command line: a type tag plus the simple commands it joins.
///
/// A `Command` owns every simple command and redirection reachable from it;
/// dropping it releases the whole tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command_type: CommandType,
    pub command_sequence: CommandSequence,
}

impl Command {
    /// Creates a command for a blank line.
    pub fn empty() -> Self {
        Command {
            command_type: CommandType::Empty,
            command_sequence: CommandSequence::default(),
        }
    }

    /// Creates a simple command from `first` alone, or a two-element command
    /// of type `command_type` when `second` is present.
    pub fn new(
        command_type: CommandType,
        first: SimpleCommand,
        second: Option<SimpleCommand>,
    ) -> Self {
        let mut command_list = List::single(first);
        let command_type = match second {
            Some(second) => {
                command_list.push(second);
                command_type
            }
            None => CommandType::Simple,
        };
        Command {
            command_type,
            command_sequence: CommandSequence { command_list },
        }
    }

    /// Inserts `simple` in front of the existing elements. The parser calls
    /// this from right to left so the list ends up in textual order.
    pub fn prepend(mut self, simple: SimpleCommand) -> Self {
        self.command_sequence.command_list.prepend(simple);
        self
    }

    pub fn commands(&self) -> &List<SimpleCommand> {
        &self.command_sequence.command_list
    }

    pub fn len(&self) -> usize {
        self.command_sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.command_type == CommandType::Empty
    }

    /// Whether the whole command runs in the background. For compound
    /// commands the `&` of the last element decides, since it binds to the
    /// end of the line.
    pub fn runs_in_background(&self) -> bool {
        match self.command_type {
            CommandType::Empty => false,
            CommandType::Simple => self.commands().first().map_or(false, |c| c.background),
            _ => self.commands().last().map_or(false, |c| c.background),
        }
    }

    /// Removes surrounding double quotes from every argument and file name.
    pub fn unquote(&mut self) {
        if self.command_type == CommandType::Empty {
            return;
        }
        for simple in self.command_sequence.command_list.iter_mut() {
            simple.unquote();
        }
    }

    /// Rebuilds a command line from the parsed structure, e.g. for history.
    /// Returns `None` for an empty command.
    pub fn to_command_line(&self) -> Option<String> {
        if self.command_type == CommandType::Empty {
            return None;
        }
        let separator = self.command_type.operator();
        let mut line = String::new();
        let count = self.len();
        for (i, simple) in self.commands().iter().enumerate() {
            let mut part = String::new();
            simple.write_line(&mut part);
            line.push_str(&part);
            let last = i + 1 == count;
            if last {
                if simple.background {
                    line.push_str(" &");
                }
            } else {
                match separator {
                    Some(op) => {
                        line.push(' ');
                        line.push_str(op);
                        line.push(' ');
                    }
                    None => line.push(' '),
                }
            }
        }
        Some(line)
    }

    /// Renders the command as an indented tree for debugging.
    pub fn pretty(&self) -> String {
        let mut out = String::from("--- COMMANDS ---\n");
        match self.command_type {
            CommandType::Empty => out.push_str("<EMPTY_COMMAND>\n"),
            CommandType::Simple => {
                if let Some(simple) = self.commands().first() {
                    simple.write_tree(0, &mut out);
                }
            }
            CommandType::Sequence | CommandType::Pipe | CommandType::And | CommandType::Or => {
                let label = self.command_type.label();
                let _ = writeln!(out, "<{} [{}]>", label, self.len());
                for simple in self.commands() {
                    simple.write_tree(5, &mut out);
                }
                let _ = writeln!(out, "</{}>", label);
            }
            CommandType::If | CommandType::While => {
                let _ = writeln!(
                    out,
                    "type [{}] printing not implemented",
                    self.command_type
                );
            }
        }
        out.push_str("<<<< COMMANDS >>>>\n");
        out
    }

    /// Prints the debugging tree to stdout.
    pub fn print(&self) {
        print!("{}", self.pretty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(tokens: &[&str]) -> SimpleCommand {
        SimpleCommand::new(
            tokens.iter().map(|t| t.to_string()).collect(),
            List::new(),
            false,
        )
    }

    #[test]
    fn test_new_without_second_is_simple() {
        let cmd = Command::new(CommandType::Pipe, simple(&["ls"]), None);
        assert_eq!(cmd.command_type, CommandType::Simple);
        assert_eq!(cmd.len(), 1);
    }

    #[test]
    fn test_prepend_keeps_textual_order() {
        let cmd = Command::new(CommandType::Sequence, simple(&["b"]), Some(simple(&["c"])))
            .prepend(simple(&["a"]));
        let names: Vec<&str> = cmd.commands().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(cmd.len(), 3);
        assert_eq!(cmd.to_command_line().unwrap(), "a ; b ; c");
    }

    #[test]
    fn test_to_command_line_with_redirections() {
        let mut redirections = List::new();
        redirections.push(Redirection::file(RedirectMode::Read, "in.txt"));
        redirections.push(Redirection::file(RedirectMode::Append, "log.txt"));
        redirections.push(Redirection::fd(RedirectMode::Write, 2));
        let cmd = Command::new(
            CommandType::Simple,
            SimpleCommand::new(vec!["sort".into(), "-r".into()], redirections, true),
            None,
        );
        assert_eq!(
            cmd.to_command_line().unwrap(),
            "sort -r < in.txt >> log.txt >&2 &"
        );
    }

    #[test]
    fn test_empty_command_has_no_line() {
        let cmd = Command::empty();
        assert!(cmd.is_empty());
        assert_eq!(cmd.to_command_line(), None);
        assert!(!cmd.runs_in_background());
    }

    #[test]
    fn test_last_element_decides_background() {
        let mut last = simple(&["wc", "-l"]);
        last.background = true;
        let cmd = Command::new(CommandType::Pipe, simple(&["ls"]), Some(last));
        assert!(cmd.runs_in_background());
        assert_eq!(cmd.to_command_line().unwrap(), "ls | wc -l &");

        let mut first = simple(&["ls"]);
        first.background = true;
        let cmd = Command::new(CommandType::And, first, Some(simple(&["pwd"])));
        assert!(!cmd.runs_in_background());
    }

    #[test]
    fn test_unquote_arguments_and_filenames() {
        let mut redirections = List::new();
        redirections.push(Redirection::file(RedirectMode::Write, "\"out file\""));
        let mut cmd = Command::new(
            CommandType::Simple,
            SimpleCommand::new(
                vec!["echo".into(), "\"hello world\"".into(), "\"open".into()],
                redirections,
                false,
            ),
            None,
        );
        cmd.unquote();
        let simple = cmd.commands().first().unwrap();
        assert_eq!(simple.tokens, vec!["echo", "hello world", "\"open"]);
        assert_eq!(
            simple.redirections.first().unwrap().target,
            RedirectTarget::File("out file".into())
        );
    }

    #[test]
    fn test_pretty_lists_every_element() {
        let mut redirections = List::new();
        redirections.push(Redirection::file(RedirectMode::Write, "out.txt"));
        let cmd = Command::new(
            CommandType::Or,
            simple(&["false"]),
            Some(SimpleCommand::new(vec!["echo".into(), "x".into()], redirections, false)),
        );
        let text = cmd.pretty();
        assert!(text.starts_with("--- COMMANDS ---\n<OR_COMMAND [2]>\n"));
        assert!(text.contains("     <SIMPLE_COMMAND> {command: \"false\", background: \"no\"}"));
        assert!(text.contains("{mode: \"WRITE\", type: \"file\", filename: \"out.txt\"}"));
        assert!(text.ends_with("</OR_COMMAND>\n<<<< COMMANDS >>>>\n"));
    }

    #[test]
    fn test_pretty_unimplemented_type() {
        let mut cmd = Command::new(CommandType::Simple, simple(&["x"]), None);
        cmd.command_type = CommandType::While;
        assert!(cmd.pretty().contains("type [while] printing not implemented"));
    }
}
