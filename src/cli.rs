use clap::Parser;
use eyre::eyre;
use std::env;
use std::path::PathBuf;

use crate::platform::Variant;
use crate::Result;

/// Drives one protocol executable under the harness
#[derive(Parser)]
#[command(name = "procrig")]
#[command(about = "Launches and observes a protocol executable under the selected variant")]
#[command(version)]
pub struct Cli {
    /// Executable variant to drive (managed, script or native)
    #[arg(long, env = "PROCRIG_VARIANT")]
    pub variant: String,

    /// Managed runtime installation root (its launcher lives under bin/)
    #[arg(long, env = "PROCRIG_MANAGED_HOME")]
    pub managed_home: Option<PathBuf>,

    /// Launcher binary name inside the managed runtime's bin directory
    #[arg(long, env = "PROCRIG_MANAGED_LAUNCHER", default_value = "launch")]
    pub managed_launcher: String,

    /// Comma-separated flags handed to the managed launcher before the entry point
    #[arg(long, env = "PROCRIG_MANAGED_FLAGS", value_delimiter = ',')]
    pub managed_flags: Vec<String>,

    /// Qualified-name prefix prepended to the protocol to form the entry point
    #[arg(long, env = "PROCRIG_ENTRY_PREFIX", default_value = "")]
    pub entry_prefix: String,

    /// Process-listing utility scoped to the managed runtime
    #[arg(long, env = "PROCRIG_RUNTIME_PS")]
    pub runtime_ps: Option<PathBuf>,

    /// Script-runtime interpreter
    #[arg(long, env = "PROCRIG_SCRIPT_INTERPRETER", default_value = "/bin/sh")]
    pub script_interpreter: PathBuf,

    /// Runner script handed to the interpreter
    #[arg(long, env = "PROCRIG_SCRIPT_RUNNER")]
    pub script_runner: Option<PathBuf>,

    /// Natively-compiled runner binary
    #[arg(long, env = "PROCRIG_NATIVE_RUNNER")]
    pub native_runner: Option<PathBuf>,

    /// Wait for this stdout marker before considering the process started
    #[arg(long)]
    pub ready_marker: Option<String>,

    /// Send the variant's diagnostic-dump signal once the process is ready
    #[arg(long)]
    pub dump: bool,

    /// Protocol to launch
    pub protocol: String,

    /// Arguments for the protocol, passed through unmodified and in order
    pub args: Vec<String>,
}

/// Launcher paths and variant selection for one harness run. Produced once
/// at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub variant: Variant,
    pub managed_home: PathBuf,
    pub managed_launcher: String,
    pub managed_flags: Vec<String>,
    pub entry_prefix: String,
    pub runtime_ps: PathBuf,
    pub script_interpreter: PathBuf,
    pub script_runner: PathBuf,
    pub native_runner: PathBuf,
}

impl Config {
    /// Bare configuration for a variant; launcher paths are filled in from
    /// the environment, the CLI, or directly by the caller before use.
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            managed_home: PathBuf::new(),
            managed_launcher: "launch".to_string(),
            managed_flags: Vec::new(),
            entry_prefix: String::new(),
            runtime_ps: PathBuf::new(),
            script_interpreter: PathBuf::from("/bin/sh"),
            script_runner: PathBuf::new(),
            native_runner: PathBuf::new(),
        }
    }

    /// Parse command line arguments into configuration
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let variant: Variant = cli.variant.parse()?;
        let mut config = Config::new(variant);
        if let Some(home) = &cli.managed_home {
            config.managed_home = home.clone();
        }
        config.managed_launcher = cli.managed_launcher.clone();
        config.managed_flags = cli.managed_flags.clone();
        config.entry_prefix = cli.entry_prefix.clone();
        if let Some(tool) = &cli.runtime_ps {
            config.runtime_ps = tool.clone();
        }
        config.script_interpreter = cli.script_interpreter.clone();
        if let Some(runner) = &cli.script_runner {
            config.script_runner = runner.clone();
        }
        if let Some(runner) = &cli.native_runner {
            config.native_runner = runner.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Reads the build-provided selection flag and launcher paths from the
    /// environment. Fails fast before anything is spawned when the flag is
    /// missing or names an unrecognized variant.
    pub fn from_env() -> Result<Self> {
        let variant: Variant = env::var("PROCRIG_VARIANT")
            .map_err(|_| eyre!("PROCRIG_VARIANT is not set"))?
            .parse()?;
        let mut config = Config::new(variant);
        if let Some(home) = env::var_os("PROCRIG_MANAGED_HOME") {
            config.managed_home = PathBuf::from(home);
        }
        if let Ok(launcher) = env::var("PROCRIG_MANAGED_LAUNCHER") {
            config.managed_launcher = launcher;
        }
        if let Ok(flags) = env::var("PROCRIG_MANAGED_FLAGS") {
            config.managed_flags = flags.split(',').map(str::to_string).collect();
        }
        if let Ok(prefix) = env::var("PROCRIG_ENTRY_PREFIX") {
            config.entry_prefix = prefix;
        }
        if let Some(tool) = env::var_os("PROCRIG_RUNTIME_PS") {
            config.runtime_ps = PathBuf::from(tool);
        }
        if let Some(interpreter) = env::var_os("PROCRIG_SCRIPT_INTERPRETER") {
            config.script_interpreter = PathBuf::from(interpreter);
        }
        if let Some(runner) = env::var_os("PROCRIG_SCRIPT_RUNNER") {
            config.script_runner = PathBuf::from(runner);
        }
        if let Some(runner) = env::var_os("PROCRIG_NATIVE_RUNNER") {
            config.native_runner = PathBuf::from(runner);
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks that the paths the selected variant needs were provided.
    pub fn validate(&self) -> Result<()> {
        match self.variant {
            Variant::Managed => {
                if self.managed_home.as_os_str().is_empty() {
                    return Err(eyre!(
                        "managed variant selected but no managed runtime root configured \
                         (set PROCRIG_MANAGED_HOME)"
                    ));
                }
                if self.runtime_ps.as_os_str().is_empty() {
                    return Err(eyre!(
                        "managed variant selected but no runtime listing tool configured \
                         (set PROCRIG_RUNTIME_PS)"
                    ));
                }
            }
            Variant::Script => {
                if self.script_runner.as_os_str().is_empty() {
                    return Err(eyre!(
                        "script variant selected but no runner script configured \
                         (set PROCRIG_SCRIPT_RUNNER)"
                    ));
                }
            }
            Variant::Native => {
                if self.native_runner.as_os_str().is_empty() {
                    return Err(eyre!(
                        "native variant selected but no runner binary configured \
                         (set PROCRIG_NATIVE_RUNNER)"
                    ));
                }
            }
        }
        Ok(())
    }
}
