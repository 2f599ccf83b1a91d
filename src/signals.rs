use crate::error::ShellError;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use once_cell::sync::OnceCell;
use signal_hook::{consts::signal::*, iterator::Signals};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

static SIGNAL_THREAD: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
struct Mailbox {
    /// Background children that nobody waits for synchronously.
    watched: Vec<Pid>,
    /// Children reaped by the signal thread, not yet applied to the status list.
    finished: Vec<(Pid, WaitStatus)>,
}

/// Collects the exit statuses of background children.
///
/// The SIGCHLD thread only reaps pids handed over with [`Reaper::watch`] and
/// posts the results here; the status list itself is updated on the main
/// flow when it calls [`Reaper::drain`]. Foreground children are never
/// watched, so a foreground `waitpid` cannot lose its child to the thread.
#[derive(Debug, Clone, Default)]
pub struct Reaper {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl Reaper {
    pub fn new() -> Self {
        Reaper::default()
    }

    fn lock(&self) -> MutexGuard<'_, Mailbox> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hands a background child over to the signal path.
    pub fn watch(&self, pid: Pid) {
        self.lock().watched.push(pid);
    }

    /// Reaps every watched child that has terminated. Returns how many were
    /// collected.
    pub fn sweep(&self) -> usize {
        let mut mailbox = self.lock();
        let mut running = Vec::new();
        let mut collected = 0;
        for pid in mem::take(&mut mailbox.watched) {
            match reap_nohang(pid) {
                Ok(Some(status)) => {
                    mailbox.finished.push((pid, status));
                    collected += 1;
                }
                Ok(None) => running.push(pid),
                Err(Errno::ECHILD) => debug!("reaper: pid {} already reaped", pid),
                Err(err) => {
                    warn!("reaper: waitpid({}) failed: {}", pid, err);
                    running.push(pid);
                }
            }
        }
        mailbox.watched = running;
        collected
    }

    /// Takes every collected `(pid, status)` pair.
    pub fn drain(&self) -> Vec<(Pid, WaitStatus)> {
        mem::take(&mut self.lock().finished)
    }

    /// Non-blocking check whether `pid` has terminated, consulting the
    /// mailbox first so a status is never reported twice or lost.
    pub fn probe(&self, pid: Pid) -> Option<WaitStatus> {
        let mut mailbox = self.lock();
        if let Some(index) = mailbox.finished.iter().position(|(p, _)| *p == pid) {
            return Some(mailbox.finished.remove(index).1);
        }
        match reap_nohang(pid) {
            Ok(Some(status)) => {
                mailbox.watched.retain(|p| *p != pid);
                Some(status)
            }
            Ok(None) => None,
            Err(err) => {
                debug!("reaper: probe of pid {} failed: {}", pid, err);
                None
            }
        }
    }

    pub fn watched(&self) -> usize {
        self.lock().watched.len()
    }
}

/// Waits for `pid` without blocking. Returns the status only if the child
/// exited or was killed.
pub fn reap_nohang(pid: Pid) -> nix::Result<Option<WaitStatus>> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG))? {
        status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..)) => Ok(Some(status)),
        _ => Ok(None),
    }
}

fn set_disposition(signal: Signal, handler: SigHandler, flags: SaFlags) -> nix::Result<()> {
    let action = SigAction::new(handler, flags, SigSet::empty());
    unsafe { sigaction(signal, &action) }.map(|_| ())
}

/// Makes the shell immune to Ctrl-C, Ctrl-Z and background terminal writes.
/// Those signals reach whichever process group owns the terminal instead.
pub fn ignore_job_control_signals() -> Result<(), ShellError> {
    set_disposition(Signal::SIGINT, SigHandler::SigIgn, SaFlags::SA_RESTART)
        .and_then(|_| set_disposition(Signal::SIGTTOU, SigHandler::SigIgn, SaFlags::empty()))
        .and_then(|_| set_disposition(Signal::SIGTSTP, SigHandler::SigIgn, SaFlags::empty()))
        .map_err(ShellError::Signal)
}

/// Restores default SIGINT and SIGTTOU handling in a freshly forked child.
/// Only async-signal-safe calls are made here.
pub fn restore_default_signals() {
    let _ = set_disposition(Signal::SIGINT, SigHandler::SigDfl, SaFlags::empty());
    let _ = set_disposition(Signal::SIGTTOU, SigHandler::SigDfl, SaFlags::empty());
}

/// Installs the shell's signal handling:
/// - SIGINT, SIGTSTP, SIGTTOU: ignored by the shell itself.
/// - SIGCHLD: reaps watched background children into `reaper`'s mailbox.
/// - SIGQUIT: prints a termination message and exits.
///
/// The handler thread is started once per process.
pub fn install_signal_handlers(reaper: Reaper) -> Result<(), ShellError> {
    ignore_job_control_signals()?;
    SIGNAL_THREAD.get_or_try_init(|| {
        let mut signals = Signals::new([SIGCHLD, SIGQUIT])?;
        thread::spawn(move || {
            for signal in signals.forever() {
                match signal {
                    SIGCHLD => {
                        let collected = reaper.sweep();
                        debug!("SIGCHLD: collected {} background children", collected);
                    }
                    SIGQUIT => {
                        println!("Terminating after receipt of SIGQUIT signal");
                        std::process::exit(0);
                    }
                    _ => unreachable!(),
                }
            }
        });
        Ok::<(), ShellError>(())
    })?;
    Ok(())
}
