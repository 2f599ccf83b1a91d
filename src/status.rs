use log::debug;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::fmt;
use std::io::{self, Write};

/// Lifecycle state of a launched process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exited normally with the given exit code.
    Exited(i32),
    /// Killed by the given signal number.
    Signaled(i32),
}

impl ProcessStatus {
    /// Classifies a wait status. Stop and continue notifications are not
    /// terminal and yield `None`.
    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(ProcessStatus::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(ProcessStatus::Signaled(signal as i32)),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != ProcessStatus::Running
    }

    /// The shell-level result of a finished process: the exit code, or
    /// 128 plus the signal number.
    pub fn result_code(self) -> i32 {
        match self {
            ProcessStatus::Running => 0,
            ProcessStatus::Exited(code) => code,
            ProcessStatus::Signaled(signal) => 128 + signal,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => f.write_str("running"),
            ProcessStatus::Exited(code) => write!(f, "exit({})", code),
            ProcessStatus::Signaled(signal) => write!(f, "signal({})", signal),
        }
    }
}

/// One entry of the status list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub pgid: Pid,
    pub status: ProcessStatus,
    /// Program name the process was launched with.
    pub command: String,
}

impl ProcessInfo {
    /// Exit code or signal number; `-1` while the process is running.
    pub fn code(&self) -> i32 {
        match self.status {
            ProcessStatus::Running => -1,
            ProcessStatus::Exited(code) | ProcessStatus::Signaled(code) => code,
        }
    }
}

/// Every process the shell launched and has not yet reported as finished.
///
/// A record leaves `Running` at most once. Later updates for the same pid
/// are ignored, so the foreground wait and the signal path can both report
/// a process without clobbering each other.
#[derive(Debug, Default)]
pub struct StatusList {
    records: Vec<ProcessInfo>,
}

impl StatusList {
    pub fn new() -> Self {
        StatusList {
            records: Vec::new(),
        }
    }

    /// Records a freshly launched process as running.
    pub fn add(&mut self, pid: Pid, pgid: Pid, command: &str) {
        debug!("status: add pid={} pgid={} command={}", pid, pgid, command);
        self.records.push(ProcessInfo {
            pid,
            pgid,
            status: ProcessStatus::Running,
            command: command.to_string(),
        });
    }

    /// Applies a wait status to the running record for `pid`.
    ///
    /// Returns false if there is no running record for the pid or the status
    /// is not terminal.
    pub fn update(&mut self, pid: Pid, status: WaitStatus) -> bool {
        let Some(new_status) = ProcessStatus::from_wait_status(status) else {
            return false;
        };
        match self
            .records
            .iter_mut()
            .find(|info| info.pid == pid && info.status == ProcessStatus::Running)
        {
            Some(info) => {
                debug!("status: pid {} -> {}", pid, new_status);
                info.status = new_status;
                true
            }
            None => false,
        }
    }

    /// Removes the running record for `pid`. Used when the process can no
    /// longer be waited for.
    pub fn forget(&mut self, pid: Pid) -> bool {
        match self
            .records
            .iter()
            .position(|info| info.pid == pid && info.status == ProcessStatus::Running)
        {
            Some(index) => {
                debug!("status: forgetting pid {}", pid);
                self.records.remove(index);
                true
            }
            None => false,
        }
    }

    /// Writes the status table to `out` and forgets every finished process.
    ///
    /// `probe` is asked, without blocking, whether a still running process
    /// has finished in the meantime.
    pub fn print_and_cleanup<W, F>(&mut self, out: &mut W, mut probe: F) -> io::Result<()>
    where
        W: Write,
        F: FnMut(Pid) -> Option<WaitStatus>,
    {
        writeln!(out, "{:<5} {:<5} {:<12} {}", "PID", "PGID", "STATUS", "NAME")?;
        for info in self.records.iter_mut() {
            if info.status == ProcessStatus::Running {
                if let Some(status) = probe(info.pid).and_then(ProcessStatus::from_wait_status) {
                    info.status = status;
                }
            }
            writeln!(
                out,
                "{:<5} {:<5} {:<12} {}",
                info.pid.as_raw(),
                info.pgid.as_raw(),
                info.status.to_string(),
                info.command
            )?;
        }
        self.records.retain(|info| info.status == ProcessStatus::Running);
        out.flush()
    }

    /// Drops every record regardless of state. Used at shutdown.
    pub fn free_all(&mut self) {
        self.records.clear();
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessInfo> {
        self.records.iter().find(|info| info.pid == pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessInfo> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    fn table(list: &mut StatusList, probe: impl FnMut(Pid) -> Option<WaitStatus>) -> String {
        let mut out = Vec::new();
        list.print_and_cleanup(&mut out, probe).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_add_starts_running() {
        let mut list = StatusList::new();
        list.add(pid(100), pid(100), "sleep");
        let info = list.get(pid(100)).unwrap();
        assert_eq!(info.status, ProcessStatus::Running);
        assert_eq!(info.code(), -1);
        assert_eq!(info.command, "sleep");
    }

    #[test]
    fn test_update_is_final() {
        let mut list = StatusList::new();
        list.add(pid(100), pid(100), "false");
        assert!(list.update(pid(100), WaitStatus::Exited(pid(100), 1)));
        assert!(!list.update(pid(100), WaitStatus::Signaled(pid(100), Signal::SIGKILL, false)));
        let info = list.get(pid(100)).unwrap();
        assert_eq!(info.status, ProcessStatus::Exited(1));
        assert_eq!(info.code(), 1);
    }

    #[test]
    fn test_update_unknown_pid_is_noop() {
        let mut list = StatusList::new();
        list.add(pid(100), pid(100), "true");
        assert!(!list.update(pid(999), WaitStatus::Exited(pid(999), 0)));
        assert_eq!(list.get(pid(100)).unwrap().status, ProcessStatus::Running);
    }

    #[test]
    fn test_update_ignores_stop() {
        let mut list = StatusList::new();
        list.add(pid(100), pid(100), "vim");
        assert!(!list.update(pid(100), WaitStatus::Stopped(pid(100), Signal::SIGTSTP)));
        assert_eq!(list.get(pid(100)).unwrap().status, ProcessStatus::Running);
    }

    #[test]
    fn test_signaled_status() {
        let mut list = StatusList::new();
        list.add(pid(7), pid(7), "sleep");
        list.update(pid(7), WaitStatus::Signaled(pid(7), Signal::SIGINT, false));
        let info = list.get(pid(7)).unwrap();
        assert_eq!(info.status, ProcessStatus::Signaled(2));
        assert_eq!(info.status.to_string(), "signal(2)");
        assert_eq!(info.status.result_code(), 130);
    }

    #[test]
    fn test_print_and_cleanup_format() {
        let mut list = StatusList::new();
        list.add(pid(101), pid(101), "ls");
        list.add(pid(102), pid(101), "wc");
        list.update(pid(101), WaitStatus::Exited(pid(101), 0));
        let output = table(&mut list, |_| None);
        assert_eq!(
            output,
            "PID   PGID  STATUS       NAME\n\
             101   101   exit(0)      ls\n\
             102   101   running      wc\n"
        );
        assert_eq!(list.len(), 1);
        assert!(list.get(pid(102)).is_some());
    }

    #[test]
    fn test_print_and_cleanup_probes_running() {
        let mut list = StatusList::new();
        list.add(pid(200), pid(200), "sleep");
        list.add(pid(201), pid(201), "yes");
        list.add(pid(202), pid(202), "cat");
        let output = table(&mut list, |p| {
            if p == pid(201) {
                Some(WaitStatus::Signaled(p, Signal::SIGTERM, false))
            } else {
                None
            }
        });
        assert!(output.contains("201   201   signal(15)   yes\n"));
        let remaining: Vec<i32> = list.iter().map(|info| info.pid.as_raw()).collect();
        assert_eq!(remaining, vec![200, 202]);
    }

    #[test]
    fn test_second_listing_is_header_only() {
        let mut list = StatusList::new();
        list.add(pid(300), pid(300), "echo");
        list.update(pid(300), WaitStatus::Exited(pid(300), 0));
        table(&mut list, |_| None);
        let output = table(&mut list, |_| None);
        assert_eq!(output, "PID   PGID  STATUS       NAME\n");
        assert!(list.is_empty());
    }

    #[test]
    fn test_forget_only_touches_running_record() {
        let mut list = StatusList::new();
        list.add(pid(400), pid(400), "old");
        list.update(pid(400), WaitStatus::Exited(pid(400), 0));
        list.add(pid(400), pid(400), "new");
        assert!(list.forget(pid(400)));
        assert!(!list.forget(pid(400)));
        let names: Vec<&str> = list.iter().map(|info| info.command.as_str()).collect();
        assert_eq!(names, vec!["old"]);
    }

    #[test]
    fn test_free_all() {
        let mut list = StatusList::new();
        list.add(pid(1), pid(1), "a");
        list.add(pid(2), pid(2), "b");
        list.free_all();
        assert!(list.is_empty());
    }
}
