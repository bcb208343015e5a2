//! procrig: a process-orchestration harness for exercising externally-built
//! executables under adversarial conditions.
//!
//! The harness launches a protocol executable as an OS child process, captures
//! its output incrementally while it runs, resolves its pid indirectly through
//! process-listing utilities, delivers OS signals, and polls observable state
//! (output buffers, external files) with a bounded retry budget. It asserts
//! nothing itself; callers inspect exit codes and captured text.

pub mod cli;
pub mod handle;
pub mod pid;
pub mod platform;
pub mod poll;
pub mod signals;

pub type Result<T> = color_eyre::eyre::Result<T>;

pub use cli::Config;
pub use handle::Handle;
pub use platform::{Platform, ProcessSpec, Variant};
