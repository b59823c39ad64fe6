//! Shell command execution
//!
//! Checkers and user actions run commands through `/bin/sh -c`. When
//! mailbiff waits for a command it needs the real exit status, so the
//! wait happens inside a [`ChildSignalGuard`]: `SIGCHLD` is reset to
//! its default disposition for the duration and restored afterwards,
//! so no process-wide reaper can collect the child first.
//!
//! Fire-and-forget commands (notifications, click actions, fetchers)
//! go through [`spawn_detached`] and are reaped by the tokio process
//! driver.

use crate::error::{Error, Result};
use std::cell::Cell;
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

static SIGNAL_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    static GUARD_HELD: Cell<bool> = const { Cell::new(false) };
}

/// Scoped default `SIGCHLD` disposition.
///
/// Only one guard exists at a time in the process; acquiring a second
/// one from the same thread is a bug and panics.
pub struct ChildSignalGuard {
    previous: libc::sighandler_t,
    _lock: MutexGuard<'static, ()>,
}

impl ChildSignalGuard {
    /// Reset `SIGCHLD` to `SIG_DFL`, remembering the old handler.
    ///
    /// # Panics
    ///
    /// If the calling thread already holds a guard.
    #[must_use]
    pub fn acquire() -> Self {
        assert!(
            !GUARD_HELD.with(Cell::get),
            "child signal guard acquired re-entrantly"
        );
        let lock = SIGNAL_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        GUARD_HELD.with(|held| held.set(true));

        // SAFETY: installing SIG_DFL has no handler code to run, and the
        // returned previous disposition is only handed back to signal().
        let previous = unsafe { libc::signal(libc::SIGCHLD, libc::SIG_DFL) };
        Self {
            previous,
            _lock: lock,
        }
    }
}

impl Drop for ChildSignalGuard {
    fn drop(&mut self) {
        if self.previous != libc::SIG_ERR {
            // SAFETY: restores exactly the disposition signal() returned.
            unsafe {
                libc::signal(libc::SIGCHLD, self.previous);
            }
        }
        GUARD_HELD.with(|held| held.set(false));
    }
}

/// What a waited-for command produced.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: ExitStatus,
    /// First line of standard output, without its line ending.
    pub first_line: Option<String>,
}

/// Run `command` and wait for it, holding a [`ChildSignalGuard`].
///
/// Blocks the calling thread; from async code call it through
/// `tokio::task::spawn_blocking`.
///
/// # Errors
///
/// [`Error::Command`] when the shell cannot be started.
pub fn run_command(command: &str) -> Result<CommandOutput> {
    let guard = ChildSignalGuard::acquire();
    run_command_guarded(command, &guard)
}

/// [`run_command`] with a guard the caller already holds.
///
/// # Errors
///
/// [`Error::Command`] when the shell cannot be started.
pub fn run_command_guarded(command: &str, _guard: &ChildSignalGuard) -> Result<CommandOutput> {
    debug!("Executing '{}'", command);

    let output = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| Error::Command(format!("'{command}' could not be run: {e}")))?;

    if !output.status.success() {
        error!("'{}' exited with {}", command, output.status);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let first_line = stdout.lines().next().map(str::to_string);
    if first_line.is_none() {
        error!("unable to read the output of '{}'", command);
    }

    Ok(CommandOutput {
        status: output.status,
        first_line,
    })
}

/// Start `command` without waiting for it.
///
/// # Errors
///
/// [`Error::Command`] when the shell cannot be started.
pub fn spawn_detached(command: &str) -> Result<()> {
    debug!("Spawning '{}'", command);
    tokio::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .spawn()
        .map(drop)
        .map_err(|e| Error::Command(format!("'{command}' could not be started: {e}")))
}

/// Replace every `` `cmd` `` in `text` with the first output line of `cmd`.
///
/// # Errors
///
/// [`Error::Config`] on an unbalanced backtick, or any error from
/// [`run_command`].
pub fn expand_backticks(text: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('`') {
        let end = rest[start + 1..]
            .find('`')
            .map(|i| i + start + 1)
            .ok_or_else(|| Error::Config(format!("unbalanced ` in {text:?}")))?;

        out.push_str(&rest[..start]);
        let output = run_command(&rest[start + 1..end])?;
        if let Some(line) = output.first_line {
            out.push_str(&line);
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
