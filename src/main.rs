//! Demo binary exercising `connection_throttle` against a simulated service.
//!
//! Bursts of connect requests go through a [`ConnectionStateChecker`]; the
//! connector fails a configurable number of times before succeeding.

mod cli;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use connection_throttle::{
    ConnectionStateChecker,
    ConnectionThrottlingManager,
    PendingConnection,
    ThrottleConfig,
};
use tokio::time::{self, Instant};
use tracing::info;

fn throttle_config(args: &cli::ThrottleArgs) -> ThrottleConfig {
    ThrottleConfig {
        debounce_delay: Duration::from_millis(args.debounce_ms),
        max_retries: args.max_retries,
        retry_delay: Duration::from_millis(args.retry_delay_ms),
        connection_timeout: Duration::from_millis(args.timeout_ms),
        max_attempts_per_window: args.max_attempts_per_window,
        rate_limit_window: Duration::from_millis(args.window_ms),
        enforce_timeout: args.enforce_timeout,
    }
    .normalized()
}

fn flaky_connect(
    checker: &ConnectionStateChecker,
    service: &str,
    calls: &Arc<AtomicUsize>,
    failures: usize,
    latency: Duration,
) -> PendingConnection {
    let calls = Arc::clone(calls);
    checker.manager().debounce_connection(
        service,
        move || async move {
            time::sleep(latency).await;
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if call < failures {
                Err(std::io::Error::other(format!("simulated failure #{}", call + 1)))
            } else {
                Ok(())
            }
        },
        None,
    )
}

async fn simulate(
    checker: &ConnectionStateChecker,
    service: &str,
    burst: usize,
    failures: usize,
    latency: Duration,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    loop {
        if checker.is_connected(service) {
            println!("{service}: connected");
            break;
        }
        if !checker.can_connect(service) {
            let status = checker.manager().connection_status(service);
            match status.next_allowed_attempt {
                Some(at) if at > Instant::now() && status.attempt_count < checker.manager().config().max_retries => {
                    println!("{service}: backing off until {:?}", at - Instant::now());
                    time::sleep_until(at).await;
                    continue;
                }
                _ => {
                    println!("{service}: no further attempts allowed: {status:?}");
                    break;
                }
            }
        }

        let requests: Vec<_> = (0..burst.max(1))
            .map(|_| flaky_connect(checker, service, &calls, failures, latency))
            .collect();
        for (index, outcome) in futures::future::join_all(requests).await.into_iter().enumerate() {
            match outcome {
                Ok(()) => {
                    println!("{service}: request {index} connected");
                    checker.set_connection_state(service, true);
                }
                Err(error) => {
                    println!("{service}: request {index} failed: {error}");
                    if error.is_connect_failure() {
                        checker.set_connection_state(service, false);
                    }
                }
            }
        }
    }
    println!("{service}: final status {:?}", checker.connection_status(service));
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Enable structured logging for the demo.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let config = throttle_config(&cli.throttle);
    match cli.command {
        cli::Command::Config => println!("{config:#?}"),
        cli::Command::Simulate {
            service,
            burst,
            failures,
            latency_ms,
        } => {
            info!(?config, "starting simulation");
            let checker = ConnectionStateChecker::new(ConnectionThrottlingManager::new(config));
            simulate(
                &checker,
                &service,
                burst,
                failures,
                Duration::from_millis(latency_ms),
            )
            .await;
        }
    }
}
