use anyhow::{Context, Result};
use chrono::Utc;
use ssh_core::forwarding::ForwardingManager;
use tokio::time::{Instant, Interval, interval_at};
use tracing::info;

use crate::{cli::ForwardPlan, monitor};

/// Start every rule in `plan` and keep forwarding until Ctrl-C or SIGTERM.
///
/// If any rule fails to start, sessions already started are stopped and the
/// error is returned.
pub async fn run(plan: ForwardPlan) -> Result<()> {
    let ForwardPlan {
        host,
        rules,
        credential,
        transport,
        stats_interval,
    } = plan;
    let manager = ForwardingManager::new(transport);

    for rule in rules {
        let description = rule.description.clone();
        let started = manager
            .start_forwarding(rule, &host, credential.as_ref())
            .await
            .with_context(|| format!("failed to start forwarding ({description}) via {}", host.transport_key()));
        if let Err(err) = started {
            manager.shutdown().await;
            return Err(err);
        }
        println!("  {description}");
    }
    println!("Port forwarding active. Press Ctrl+C to stop.");

    let mut ticker = stats_interval.map(|period| interval_at(Instant::now() + period, period));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal?;
                break;
            }
            _ = next_tick(&mut ticker) => log_stats(&manager).await,
        }
    }

    info!("shutdown signal received, stopping forwarding");
    manager.shutdown().await;
    println!("Port forwarding stopped.");
    Ok(())
}

async fn log_stats(manager: &ForwardingManager) {
    let now = Utc::now();
    let sessions = manager.get_all_sessions().await;
    let mut snapshots = Vec::with_capacity(sessions.len());
    for session in &sessions {
        let snapshot = session.snapshot();
        info!("{}", monitor::session_report(session.rule(), &snapshot, now));
        snapshots.push(snapshot);
    }
    info!("{}", monitor::summary(&snapshots));
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("failed to listen for Ctrl+C")?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C")
    }
}
