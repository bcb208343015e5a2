use crate::cli::Config;
use crate::handle::Handle;
use crate::pid;
use crate::Result;
use eyre::eyre;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// One of the supported executable forms of a protocol.
///
/// Selected once per run from the build-provided flag and never changed
/// afterwards. Variant-specific behavior (command template, pid resolution
/// strategy, dump signal) is dispatched by matching on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Launched through the managed runtime's launcher binary.
    Managed,
    /// Launched through the script-runtime interpreter.
    Script,
    /// A natively-compiled runner binary.
    Native,
}

impl FromStr for Variant {
    type Err = eyre::Report;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "managed" => Ok(Variant::Managed),
            "script" => Ok(Variant::Script),
            "native" => Ok(Variant::Native),
            other => Err(eyre!(
                "unrecognized variant '{}' (expected managed, script or native)",
                other
            )),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variant::Managed => "managed",
            Variant::Script => "script",
            Variant::Native => "native",
        };
        f.write_str(name)
    }
}

/// A concrete command line: program path plus ordered argument vector.
///
/// Produced fresh per launch; identical (protocol, args, variant) input
/// always yields an equal spec. Arguments are an exec vector of OS strings,
/// never joined into a shell string, so launcher paths survive byte-for-byte
/// even when they are not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

/// The active executable variant together with the launcher paths the build
/// step reported. Immutable for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct Platform {
    variant: Variant,
    config: Config,
}

impl Platform {
    pub fn new(config: Config) -> Self {
        Self {
            variant: config.variant,
            config,
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// The signal that asks this variant's runtime for a diagnostic dump
    /// without terminating it.
    pub fn dump_signal(&self) -> Signal {
        match self.variant {
            Variant::Managed => Signal::SIGUSR2,
            Variant::Script | Variant::Native => Signal::SIGUSR1,
        }
    }

    /// Builds the variant-specific command line for a protocol. Purely
    /// structural; argument order is preserved exactly.
    pub fn spec(&self, protocol: &str, args: &[&str]) -> ProcessSpec {
        match self.variant {
            Variant::Managed => {
                let mut argv: Vec<OsString> =
                    self.config.managed_flags.iter().map(OsString::from).collect();
                argv.push(OsString::from(format!(
                    "{}{}",
                    self.config.entry_prefix, protocol
                )));
                argv.extend(args.iter().map(OsString::from));
                ProcessSpec {
                    program: self
                        .config
                        .managed_home
                        .join("bin")
                        .join(&self.config.managed_launcher),
                    args: argv,
                }
            }
            Variant::Script => {
                let mut argv = vec![self.config.script_runner.clone().into_os_string()];
                argv.push(OsString::from(protocol));
                argv.extend(args.iter().map(OsString::from));
                ProcessSpec {
                    program: self.config.script_interpreter.clone(),
                    args: argv,
                }
            }
            Variant::Native => {
                let mut argv = vec![OsString::from(protocol)];
                argv.extend(args.iter().map(OsString::from));
                ProcessSpec {
                    program: self.config.native_runner.clone(),
                    args: argv,
                }
            }
        }
    }

    /// Resolves the pid of the running protocol through this variant's
    /// listing strategy. `Ok(None)` is an expected transient (queried before
    /// the process registered itself, or after it exited); callers retry.
    pub async fn pid(&self, protocol: &str) -> Result<Option<Pid>> {
        match self.variant {
            Variant::Managed => {
                pid::resolve_with_runtime_tool(&self.config.runtime_ps, protocol).await
            }
            Variant::Script => pid::resolve_with_ps(&self.config.script_runner, protocol).await,
            Variant::Native => pid::resolve_with_ps(&self.config.native_runner, protocol).await,
        }
    }

    /// Spawns the protocol and returns the live handle for it.
    pub async fn launch(&self, protocol: &str, args: &[&str]) -> Result<Handle> {
        Handle::spawn(self, protocol, args).await
    }
}
