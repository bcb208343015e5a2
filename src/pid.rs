//! Indirect pid resolution through external process-listing utilities.
//!
//! The launch primitives of some target runtimes never expose an OS pid, so
//! the harness falls back to listing all candidate processes and matching by
//! program path and protocol name. A miss is an expected transient, not an
//! error: resolution can race both process startup and process exit, and
//! callers are expected to retry with the standard polling budget.

use crate::Result;
use nix::unistd::Pid;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Resolves a pid through the managed runtime's own listing tool, whose
/// output carries a leading numeric pid field followed by the program name.
pub async fn resolve_with_runtime_tool(tool: &Path, protocol: &str) -> Result<Option<Pid>> {
    let output = match Command::new(tool).output().await {
        Ok(output) => output,
        Err(e) => {
            debug!("runtime listing tool {} failed to run: {}", tool.display(), e);
            return Ok(None);
        }
    };
    if !output.status.success() {
        debug!("runtime listing tool exited with {:?}", output.status);
    }
    let listing = String::from_utf8_lossy(&output.stdout);
    Ok(match_runtime_listing(&listing, protocol))
}

/// Resolves a pid through the general OS listing utility, matching lines
/// that mention both the runner binary path and the protocol name.
pub async fn resolve_with_ps(runner: &Path, protocol: &str) -> Result<Option<Pid>> {
    let output = match Command::new("ps").arg("axww").output().await {
        Ok(output) => output,
        Err(e) => {
            debug!("ps failed to run: {}", e);
            return Ok(None);
        }
    };
    if !output.status.success() {
        debug!("ps exited with {:?}", output.status);
    }
    let listing = String::from_utf8_lossy(&output.stdout);
    Ok(match_generic_listing(
        &listing,
        &runner.to_string_lossy(),
        protocol,
    ))
}

/// Picks the first line whose program-name field contains the protocol name
/// and returns its leading numeric pid field. Malformed lines are skipped.
pub fn match_runtime_listing(listing: &str, protocol: &str) -> Option<Pid> {
    for line in listing.lines() {
        let mut fields = line.split_whitespace();
        let (Some(pid_field), Some(name_field)) = (fields.next(), fields.next()) else {
            continue;
        };
        if !name_field.contains(protocol) {
            continue;
        }
        if let Ok(pid) = pid_field.parse::<i32>() {
            return Some(Pid::from_raw(pid));
        }
    }
    None
}

/// Picks the first line containing both the runner path and the protocol
/// name and returns the leading pid field. The pid column is right-aligned
/// and widens with large pids, so the leading whitespace-delimited token is
/// parsed rather than a fixed column slice. First match wins when several
/// instances of the same protocol are alive.
pub fn match_generic_listing(listing: &str, runner: &str, protocol: &str) -> Option<Pid> {
    for line in listing.lines() {
        if !(line.contains(runner) && line.contains(protocol)) {
            continue;
        }
        let Some(pid_field) = line.split_whitespace().next() else {
            continue;
        };
        if let Ok(pid) = pid_field.parse::<i32>() {
            return Some(Pid::from_raw(pid));
        }
    }
    None
}
