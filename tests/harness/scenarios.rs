use super::fixture::{init_tracing, ProtocolFixture};
use nix::sys::signal::Signal;
use std::sync::Arc;
use std::time::{Duration, Instant};

use procrig::poll::await_file_marker;
use procrig::signals::send_signal;
use procrig::Result;

#[tokio::test]
async fn hello_exits_zero_with_a_single_greeting_line() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;

    let handle = fixture.platform.launch("hello", &[]).await?;
    assert_eq!(handle.await_status().await?, 0);
    assert_eq!(handle.stdout(), "Hello, procrig!\n");
    assert_eq!(handle.stderr(), "");
    Ok(())
}

#[tokio::test]
async fn arguments_pass_through_unmodified_and_in_order() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;

    let args = ["the", "quick", "brown", "fox jumped", "over"];
    let handle = fixture.platform.launch("echo-args", &args).await?;
    assert_eq!(handle.await_status().await?, 0);
    assert_eq!(handle.stdout(), "the\nquick\nbrown\nfox jumped\nover\n");
    Ok(())
}

#[tokio::test]
async fn await_status_is_idempotent_after_exit() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;

    let handle = fixture.platform.launch("hello", &[]).await?;
    let first = handle.await_status().await?;
    let second = handle.await_status().await?;
    assert_eq!(first, 0);
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn failing_protocol_reports_diagnostic_without_leaking_to_stdout() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;

    let handle = fixture.platform.launch("fail", &[]).await?;
    assert_eq!(handle.await_status().await?, 1);
    assert!(handle.stderr().contains("FatalError"));
    assert!(!handle.stdout().contains("FatalError"));
    Ok(())
}

#[tokio::test]
async fn stdout_snapshots_grow_prefix_consistently() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;

    let handle = fixture.platform.launch("ticker", &[]).await?;
    assert!(handle.await_marker("tick 0").await);

    let mut previous = handle.stdout();
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let current = handle.stdout();
        assert!(
            current.starts_with(&previous),
            "snapshot shrank or reordered: {:?} then {:?}",
            previous,
            current
        );
        previous = current;
    }

    handle.term();
    handle.await_status().await?;
    Ok(())
}

#[tokio::test]
async fn marker_polling_returns_within_its_budget() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;

    let handle = fixture.platform.launch("ready-wait", &[]).await?;
    let start = Instant::now();
    let met = handle.await_marker("NeverPrinted").await;
    assert!(!met);
    // 100 attempts at 100ms; well under the child's own 30s lifetime.
    assert!(start.elapsed() >= Duration::from_secs(9));
    assert!(start.elapsed() < Duration::from_secs(20));

    handle.term();
    // A forceful kill surfaces as 128 + SIGKILL.
    assert_eq!(handle.await_status().await?, 137);
    Ok(())
}

#[tokio::test]
async fn term_is_safe_after_the_process_already_exited() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;

    let handle = fixture.platform.launch("hello", &[]).await?;
    assert_eq!(handle.await_status().await?, 0);
    handle.term();
    assert_eq!(handle.await_status().await?, 0);
    Ok(())
}

#[tokio::test]
async fn term_is_not_blocked_by_an_in_flight_await_status() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;

    let handle = Arc::new(fixture.platform.launch("ready-wait", &[]).await?);
    assert!(handle.await_marker("Started").await);

    // Park another task inside await_status on the live child.
    let waiter = {
        let handle = Arc::clone(&handle);
        tokio::spawn(async move { handle.await_status().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The kill request must return immediately even while a status wait is
    // in flight, and both observers see the same terminal code.
    let start = Instant::now();
    handle.term();
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "term blocked behind an in-flight await_status"
    );

    let parked = waiter.await.expect("status waiter panicked")?;
    assert_eq!(parked, 137);
    assert_eq!(handle.await_status().await?, 137);
    Ok(())
}

#[tokio::test]
async fn pid_resolution_tolerates_transient_misses() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;

    let handle = fixture.platform.launch("ready-wait", &[]).await?;
    assert!(handle.await_marker("Started").await);

    // A single miss right after launch is legitimate; the bounded retry
    // must still land on the live process.
    let pid = handle.await_pid().await?;
    let pid = pid.expect("pid never resolved for a live process");
    assert!(pid.as_raw() > 0);

    // The resolved pid stays stable for the handle's lifetime.
    assert_eq!(handle.pid().await?, Some(pid));

    handle.term();
    handle.await_status().await?;
    Ok(())
}

#[tokio::test]
async fn sigterm_round_trip_yields_143_and_runs_cleanup() -> Result<()> {
    init_tracing();
    let fixture = ProtocolFixture::new()?;
    let sentinel = fixture.temp_path().join("cleanup.txt");
    let sentinel_arg = sentinel.to_string_lossy().into_owned();

    let handle = fixture
        .platform
        .launch("cleanup", &[sentinel_arg.as_str()])
        .await?;
    assert!(handle.await_marker("Started").await);

    let pid = handle
        .await_pid()
        .await?
        .expect("pid never resolved for a live process");
    send_signal(pid, Signal::SIGTERM);

    assert_eq!(handle.await_status().await?, 143);
    assert!(
        await_file_marker(&sentinel, "canceled").await,
        "cleanup sentinel never appeared in {:?}",
        sentinel
    );
    Ok(())
}
