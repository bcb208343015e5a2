//! Fire-and-forget OS signal delivery.

use crate::Result;
use eyre::eyre;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::str::FromStr;
use tracing::debug;

/// Sends a signal to a pid without inspecting the outcome. Delivery failures
/// (typically ESRCH once the process has already exited) are logged and
/// swallowed; the caller's subsequent assertion on process output or exit
/// status is the real check.
pub fn send_signal(pid: Pid, signal: Signal) {
    debug!("sending {} to pid {}", signal, pid);
    if let Err(e) = kill(pid, signal) {
        debug!("{} to pid {} not delivered: {}", signal, pid, e);
    }
}

/// Parses a textual signal name such as `SIGUSR1`. Unknown names are a
/// configuration error, not a transient.
pub fn signal_from_name(name: &str) -> Result<Signal> {
    Signal::from_str(name).map_err(|_| eyre!("unrecognized signal name '{}'", name))
}
