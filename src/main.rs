use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use procrig::cli::{Cli, Config};
use procrig::platform::Platform;
use procrig::signals::send_signal;
use procrig::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_cli(&cli)?;
    let platform = Platform::new(config);

    info!(
        "driving protocol {} on the {} variant",
        cli.protocol,
        platform.variant()
    );

    let args: Vec<&str> = cli.args.iter().map(String::as_str).collect();
    let handle = platform.launch(&cli.protocol, &args).await?;

    if let Some(marker) = &cli.ready_marker {
        if handle.await_marker(marker).await {
            info!("readiness marker {:?} observed", marker);
        } else {
            warn!("readiness marker {:?} never appeared", marker);
        }
    }

    if cli.dump {
        match handle.await_pid().await? {
            Some(pid) => send_signal(pid, platform.dump_signal()),
            None => warn!("pid for {} never resolved, dump skipped", cli.protocol),
        }
    }

    let code = handle.await_status().await?;
    print!("{}", handle.stdout());
    eprint!("{}", handle.stderr());

    std::process::exit(code);
}
