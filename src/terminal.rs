use crate::error::ShellError;
use log::{debug, warn};
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, getpgrp, getpid, setpgid, tcsetpgrp, Pid};
use std::os::unix::io::RawFd;

/// The controlling terminal of an interactive shell.
///
/// Foreground jobs are given the terminal for as long as the shell waits
/// for them; the shell takes it back afterwards.
#[derive(Debug)]
pub struct Terminal {
    fd: RawFd,
    shell_pgid: Pid,
}

impl Terminal {
    /// Opens `/dev/tty`, moves the shell into its own process group and
    /// makes that group the terminal's foreground group.
    pub fn acquire() -> Result<Terminal, ShellError> {
        let fd = open(
            "/dev/tty",
            OFlag::O_RDONLY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(ShellError::Terminal)?;
        let pid = getpid();
        if let Err(err) = setpgid(pid, pid) {
            // A session leader cannot change its group; it already leads one.
            debug!("terminal: setpgid({}) failed: {}", pid, err);
        }
        let shell_pgid = getpgrp();
        if let Err(err) = tcsetpgrp(fd, shell_pgid) {
            let _ = close(fd);
            return Err(ShellError::Terminal(err));
        }
        debug!("terminal: shell owns tty as pgid {}", shell_pgid);
        Ok(Terminal { fd, shell_pgid })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Makes `pgid` the foreground process group.
    pub fn give_to(&self, pgid: Pid) {
        debug!("terminal: handing tty to pgid {}", pgid);
        if let Err(err) = tcsetpgrp(self.fd, pgid) {
            warn!("terminal: tcsetpgrp({}) failed: {}", pgid, err);
        }
    }

    /// Makes the shell's own group the foreground process group again.
    pub fn reclaim(&self) {
        if let Err(err) = tcsetpgrp(self.fd, self.shell_pgid) {
            warn!("terminal: reclaiming tty failed: {}", err);
        }
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        let _ = close(self.fd);
    }
}
