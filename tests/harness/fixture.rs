use eyre::WrapErr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use procrig::cli::Config;
use procrig::platform::{Platform, Variant};
use procrig::Result;

/// Shell runner standing in for the externally-built protocol executables.
/// Each case is one protocol; the first argument selects it, the rest are
/// passed through.
const RUNNER_SCRIPT: &str = r#"#!/bin/sh
protocol="$1"
shift
case "$protocol" in
hello)
    echo "Hello, procrig!"
    ;;
echo-args)
    for arg in "$@"; do
        printf '%s\n' "$arg"
    done
    ;;
fail)
    echo "FatalError: boom" >&2
    exit 1
    ;;
ready-wait)
    echo "Started"
    sleep 30
    ;;
ticker)
    i=0
    while [ "$i" -lt 100 ]; do
        echo "tick $i"
        i=$((i+1))
        sleep 0.05
    done
    ;;
cleanup)
    outfile="$1"
    trap 'echo canceled > "$outfile"; exit 143' TERM
    echo "Started"
    sleep 30 &
    wait $!
    ;;
*)
    echo "unknown protocol: $protocol" >&2
    exit 2
    ;;
esac
"#;

/// Script-variant platform over a temp-dir runner script; the temp dir also
/// hosts sentinel files written by protocol cleanup logic.
pub struct ProtocolFixture {
    temp_dir: TempDir,
    pub platform: Platform,
}

impl ProtocolFixture {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().wrap_err("failed to create temporary directory")?;
        let runner = temp_dir.path().join("runner.sh");
        std::fs::write(&runner, RUNNER_SCRIPT).wrap_err("failed to write runner script")?;

        let mut config = Config::new(Variant::Script);
        config.script_interpreter = PathBuf::from("/bin/sh");
        config.script_runner = runner;
        config.validate()?;

        Ok(Self {
            temp_dir,
            platform: Platform::new(config),
        })
    }

    /// Temp directory for sentinel files.
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Initialize tracing for test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
