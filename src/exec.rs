use crate::builtins::{handle_builtin, is_builtin};
use crate::command::{Command, CommandType, RedirectMode, RedirectTarget, SimpleCommand};
use crate::error::ShellError;
use crate::list::List;
use crate::signals::{restore_default_signals, Reaper};
use crate::status::{ProcessStatus, StatusList};
use crate::terminal::Terminal;
use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::{fcntl, open, FcntlArg, FdFlag, OFlag};
use nix::libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{
    close, dup2, execvp, fork, getpid, pipe, setpgid, tcsetpgrp, write, ForkResult, Pid,
};
use std::ffi::{CString, NulError};
use std::io::{self, Write};
use std::os::unix::io::RawFd;

/// Exit status of a child whose program could not be executed.
const EXIT_NOT_FOUND: i32 = 127;

/// Runs parsed commands and keeps track of every process it starts.
pub struct Executor {
    statuses: StatusList,
    reaper: Reaper,
    terminal: Option<Terminal>,
    history: Option<Vec<String>>,
    exit_requested: Option<i32>,
}

impl Executor {
    /// Creates an executor. Without a terminal, foreground jobs are still
    /// waited for but no terminal hand-off takes place.
    pub fn new(reaper: Reaper, terminal: Option<Terminal>) -> Self {
        Executor {
            statuses: StatusList::new(),
            reaper,
            terminal,
            history: None,
            exit_requested: None,
        }
    }

    /// Turns on history recording and the `hist` built-in.
    pub fn enable_history(&mut self) {
        self.history.get_or_insert_with(Vec::new);
    }

    pub fn record_history(&mut self, line: String) {
        if let Some(history) = self.history.as_mut() {
            history.push(line);
        }
    }

    pub fn history(&self) -> Option<&[String]> {
        self.history.as_deref()
    }

    pub fn statuses(&self) -> &StatusList {
        &self.statuses
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Set once `exit` ran; the caller should shut down with this code.
    pub fn exit_requested(&self) -> Option<i32> {
        self.exit_requested
    }

    pub(crate) fn request_exit(&mut self, code: i32) {
        self.exit_requested = Some(code);
    }

    /// Applies background exit statuses collected by the signal path.
    pub fn apply_notifications(&mut self) -> usize {
        self.reaper.sweep();
        let finished = self.reaper.drain();
        let count = finished.len();
        for (pid, status) in finished {
            self.statuses.update(pid, status);
        }
        if count > 0 {
            debug!("applied {} background exit notifications", count);
        }
        count
    }

    /// Writes the status table and forgets finished processes.
    pub fn print_status<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        self.apply_notifications();
        let reaper = &self.reaper;
        self.statuses
            .print_and_cleanup(out, |pid| reaper.probe(pid))
    }

    /// Releases the status list. Called once when the shell exits.
    pub fn shutdown(&mut self) {
        self.statuses.free_all();
    }

    /// Executes a parsed command and returns its result code.
    pub fn execute(&mut self, cmd: &mut Command) -> i32 {
        cmd.unquote();
        self.apply_notifications();

        let background = cmd.runs_in_background();
        let result = match cmd.command_type {
            CommandType::Empty => 0,
            CommandType::Simple => match cmd.commands().first() {
                Some(simple) => self.run_simple(simple, background),
                None => 0,
            },
            CommandType::Sequence => self.run_sequence(cmd.commands()),
            CommandType::And | CommandType::Or => self.run_conditional(cmd),
            CommandType::Pipe => self.run_pipeline(cmd.commands(), background),
            CommandType::If | CommandType::While => {
                report(&ShellError::Unsupported(cmd.command_type));
                1
            }
        };
        let _ = io::stderr().flush();
        result
    }

    fn run_sequence(&mut self, commands: &List<SimpleCommand>) -> i32 {
        let mut result = 0;
        for simple in commands {
            if self.exit_requested.is_some() {
                break;
            }
            result = self.run_simple(simple, false);
        }
        result
    }

    /// `&&` runs the next element only after success, `||` only after failure.
    /// A skipped element passes the previous result on.
    fn run_conditional(&mut self, cmd: &Command) -> i32 {
        let mut result = 0;
        for (i, simple) in cmd.commands().iter().enumerate() {
            if self.exit_requested.is_some() {
                break;
            }
            let run = i == 0
                || match cmd.command_type {
                    CommandType::And => result == 0,
                    _ => result != 0,
                };
            if run {
                result = self.run_simple(simple, false);
            } else {
                debug!("skipping {} (previous result {})", simple.name(), result);
            }
        }
        result
    }

    fn run_simple(&mut self, simple: &SimpleCommand, background: bool) -> i32 {
        if simple.tokens.is_empty() {
            return 0;
        }
        if let Some(result) = handle_builtin(simple, self) {
            return result;
        }
        match self.launch(simple, background) {
            Ok(result) => result,
            Err(err) => {
                report(&err);
                1
            }
        }
    }

    fn foreground_tty(&self, background: bool) -> Option<RawFd> {
        if background {
            None
        } else {
            self.terminal.as_ref().map(Terminal::fd)
        }
    }

    /// Forks and executes a single external command in its own process group.
    fn launch(&mut self, simple: &SimpleCommand, background: bool) -> Result<i32, ShellError> {
        let prepared = Prepared::new(simple)?;
        let setup = ChildSetup {
            pgid: None,
            tty: self.foreground_tty(background),
            stdin: None,
            stdout: None,
            close: &[],
        };

        let child = match unsafe { fork() }.map_err(ShellError::Fork)? {
            ForkResult::Child => exec_child(&prepared, &setup),
            ForkResult::Parent { child } => child,
        };
        debug!("executing: {} (pid {})", prepared.name, child);
        self.statuses.add(child, child, &prepared.name);
        join_group(child, child);

        if background {
            self.reaper.watch(child);
            return Ok(0);
        }
        Ok(self.wait_foreground(child, &[child]))
    }

    /// Starts every element of a pipeline in one process group, connected
    /// stdout to stdin, then waits for all of them unless running in the
    /// background.
    fn run_pipeline(&mut self, commands: &List<SimpleCommand>, background: bool) -> i32 {
        let with_history = self.history.is_some();
        if let Some(builtin) = commands.iter().find(|c| is_builtin(c.name(), with_history)) {
            report(&ShellError::BuiltinInPipeline(builtin.name().to_string()));
            return 1;
        }
        let prepared = match commands.iter().map(Prepared::new).collect::<Result<Vec<_>, _>>() {
            Ok(prepared) => prepared,
            Err(err) => {
                report(&err);
                return 1;
            }
        };

        let tty = self.foreground_tty(background);
        let mut pids = Vec::with_capacity(prepared.len());
        let mut pgid: Option<Pid> = None;
        let mut previous_read: Option<RawFd> = None;
        let mut failure: Option<ShellError> = None;

        for (i, command) in prepared.iter().enumerate() {
            let last = i + 1 == prepared.len();
            let next_pipe = if last {
                None
            } else {
                match cloexec_pipe() {
                    Ok(fds) => Some(fds),
                    Err(err) => {
                        failure = Some(ShellError::Pipe(err));
                        break;
                    }
                }
            };

            let mut inherited = Vec::with_capacity(3);
            inherited.extend(previous_read);
            if let Some((read, write)) = next_pipe {
                inherited.push(read);
                inherited.push(write);
            }
            let setup = ChildSetup {
                pgid,
                tty,
                stdin: previous_read,
                stdout: next_pipe.map(|(_, write)| write),
                close: &inherited,
            };

            match unsafe { fork() } {
                Ok(ForkResult::Child) => exec_child(command, &setup),
                Ok(ForkResult::Parent { child }) => {
                    let group = *pgid.get_or_insert(child);
                    debug!("pipeline: {} (pid {}, pgid {})", command.name, child, group);
                    self.statuses.add(child, group, &command.name);
                    join_group(child, group);
                    pids.push(child);
                }
                Err(err) => {
                    if let Some((read, write)) = next_pipe {
                        let _ = close(read);
                        let _ = close(write);
                    }
                    failure = Some(ShellError::Fork(err));
                    break;
                }
            }

            if let Some(fd) = previous_read.take() {
                let _ = close(fd);
            }
            if let Some((read, write)) = next_pipe {
                let _ = close(write);
                previous_read = Some(read);
            }
        }
        if let Some(fd) = previous_read {
            let _ = close(fd);
        }

        let failed = failure.is_some();
        if let Some(err) = failure {
            report(&err);
        }
        let Some(pgid) = pgid else {
            return 1;
        };

        if background {
            for pid in &pids {
                self.reaper.watch(*pid);
            }
            return if failed { 1 } else { 0 };
        }
        let result = self.wait_foreground(pgid, &pids);
        if failed {
            1
        } else {
            result
        }
    }

    /// Gives the terminal to `pgid`, waits for every pid in turn and takes
    /// the terminal back. Returns the result of the last pid.
    fn wait_foreground(&mut self, pgid: Pid, pids: &[Pid]) -> i32 {
        if let Some(terminal) = &self.terminal {
            terminal.give_to(pgid);
        }
        let mut result = 0;
        for &pid in pids {
            result = self.record_wait(pid, wait_for(pid));
        }
        if let Some(terminal) = &self.terminal {
            terminal.reclaim();
        }
        result
    }

    /// Applies the outcome of a foreground wait to the status list. A pid
    /// that cannot be waited for is dropped, since no later probe can reap
    /// it either.
    fn record_wait(&mut self, pid: Pid, waited: nix::Result<WaitStatus>) -> i32 {
        match waited {
            Ok(status) => {
                debug!("pid {} finished: {:?}", pid, status);
                self.statuses.update(pid, status);
                ProcessStatus::from_wait_status(status).map_or(1, ProcessStatus::result_code)
            }
            Err(err) => {
                warn!("waitpid({}) failed: {}", pid, err);
                self.statuses.forget(pid);
                1
            }
        }
    }
}

fn report(err: &ShellError) {
    eprintln!("bshell: {}", err);
}

fn wait_for(pid: Pid) -> nix::Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}

/// Puts `pid` into `pgid` from the parent side. The child does the same;
/// whichever runs first wins and the other call may fail harmlessly.
fn join_group(pid: Pid, pgid: Pid) {
    if let Err(err) = setpgid(pid, pgid) {
        debug!("setpgid({}, {}) from parent: {}", pid, pgid, err);
    }
}

/// A pipe whose ends are closed on exec. The copies dup'ed onto stdin and
/// stdout in a child do not carry the flag.
fn cloexec_pipe() -> nix::Result<(RawFd, RawFd)> {
    let (read, write) = pipe()?;
    for fd in [read, write] {
        if let Err(err) = fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC)) {
            let _ = close(read);
            let _ = close(write);
            return Err(err);
        }
    }
    Ok((read, write))
}

/// A simple command converted to C strings before forking, together with
/// the error messages the child may need, so the child does not allocate
/// on its way to `exec`.
struct Prepared {
    name: String,
    argv: Vec<CString>,
    redirections: Vec<PreparedRedirection>,
    not_found: Vec<u8>,
}

struct PreparedRedirection {
    mode: RedirectMode,
    target: PreparedTarget,
    /// `<cmd>: <target>: `, followed by the error text on failure.
    error_prefix: Vec<u8>,
}

enum PreparedTarget {
    Fd(RawFd),
    File(CString),
}

impl Prepared {
    fn new(simple: &SimpleCommand) -> Result<Prepared, ShellError> {
        let name = simple.name().to_string();
        let nul = |_: NulError| ShellError::NulByte(name.clone());
        let argv = simple
            .tokens
            .iter()
            .map(|token| CString::new(token.as_str()).map_err(nul))
            .collect::<Result<Vec<_>, _>>()?;
        let mut redirections = Vec::with_capacity(simple.redirections.len());
        for redirection in &simple.redirections {
            let (target, shown) = match &redirection.target {
                RedirectTarget::Fd(fd) => (PreparedTarget::Fd(*fd), fd.to_string()),
                RedirectTarget::File(file) => (
                    PreparedTarget::File(CString::new(file.as_str()).map_err(nul)?),
                    file.clone(),
                ),
            };
            redirections.push(PreparedRedirection {
                mode: redirection.mode,
                target,
                error_prefix: format!("{}: {}: ", name, shown).into_bytes(),
            });
        }
        let not_found = format!("bshell: {}: command not found\n", name).into_bytes();
        Ok(Prepared {
            name,
            argv,
            redirections,
            not_found,
        })
    }
}

/// Process-group, terminal and pipe wiring for a child about to exec.
struct ChildSetup<'a> {
    /// Group to join; `None` starts a new group led by the child.
    pgid: Option<Pid>,
    /// Terminal to take over when running in the foreground.
    tty: Option<RawFd>,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    /// Inherited pipe ends to close once stdin/stdout are in place.
    close: &'a [RawFd],
}

fn child_error(pieces: &[&[u8]]) {
    for piece in pieces {
        let _ = write(STDERR_FILENO, piece);
    }
}

fn child_exit(code: i32) -> ! {
    // Skips atexit handlers and stdio buffers inherited from the shell.
    unsafe { nix::libc::_exit(code) }
}

/// Runs in the forked child: joins the process group, takes the terminal if
/// in the foreground, wires up pipes and redirections, and replaces the
/// process image. Never returns.
fn exec_child(prepared: &Prepared, setup: &ChildSetup<'_>) -> ! {
    let pid = getpid();
    let pgid = setup.pgid.unwrap_or(pid);
    let _ = setpgid(pid, pgid);
    // SIGTTOU is still ignored here, so taking the terminal cannot stop us.
    if let Some(tty) = setup.tty {
        let _ = tcsetpgrp(tty, pgid);
    }
    restore_default_signals();

    if let Some(fd) = setup.stdin {
        let _ = dup2(fd, STDIN_FILENO);
    }
    if let Some(fd) = setup.stdout {
        let _ = dup2(fd, STDOUT_FILENO);
    }
    for &fd in setup.close {
        if fd > STDERR_FILENO {
            let _ = close(fd);
        }
    }

    if let Err((redirection, err)) = apply_redirections(prepared) {
        child_error(&[
            redirection.error_prefix.as_slice(),
            err.desc().as_bytes(),
            b"\n".as_slice(),
        ]);
        child_exit(1);
    }

    let _ = execvp(&prepared.argv[0], &prepared.argv);
    child_error(&[prepared.not_found.as_slice()]);
    child_exit(EXIT_NOT_FOUND)
}

/// Applies redirections in order. `<` replaces stdin, `>` and `>>` replace
/// stdout. On failure returns the redirection that failed.
fn apply_redirections(prepared: &Prepared) -> Result<(), (&PreparedRedirection, Errno)> {
    for redirection in &prepared.redirections {
        let target = match redirection.mode {
            RedirectMode::Read => STDIN_FILENO,
            RedirectMode::Write | RedirectMode::Append => STDOUT_FILENO,
        };
        match &redirection.target {
            PreparedTarget::Fd(fd) => {
                dup2(*fd, target).map_err(|err| (redirection, err))?;
            }
            PreparedTarget::File(path) => {
                let flags = match redirection.mode {
                    RedirectMode::Read => OFlag::O_RDONLY,
                    RedirectMode::Write => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                    RedirectMode::Append => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                };
                let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
                let fd = open(path.as_c_str(), flags, mode).map_err(|err| (redirection, err))?;
                if fd != target {
                    let duplicated = dup2(fd, target);
                    let _ = close(fd);
                    duplicated.map_err(|err| (redirection, err))?;
                }
            }
        }
    }
    Ok(())
}
