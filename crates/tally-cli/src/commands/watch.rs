use std::sync::Arc;
use std::time::Duration;

use tally_core::{ConnectivityEvent, ConnectivityMonitor, DrainReport, SyncCoordinator};
use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{format_timestamp, now_millis, AppContext};
use crate::error::CliError;
use crate::probe::{HttpProbeSource, PROBE_INTERVAL_SECS};

pub fn connectivity_notice(event: ConnectivityEvent) -> &'static str {
    if event.online {
        "Back online; syncing queued votes"
    } else {
        "You're offline. Votes will be saved and submitted when you're back online."
    }
}

pub fn report_toast(report: &DrainReport, timestamp_ms: i64) -> String {
    format!("[{}] {}", format_timestamp(timestamp_ms), report.summary())
}

pub async fn run_watch(context: &AppContext) -> Result<(), CliError> {
    let remote = context.require_http()?.clone();

    let source = Arc::new(HttpProbeSource::new(context.is_online()));
    let poller = source.spawn_polling(remote.clone(), Duration::from_secs(PROBE_INTERVAL_SECS));
    let monitor = ConnectivityMonitor::new(source);
    let watcher = monitor.watch_source();
    let _notices = monitor.subscribe(|event| println!("{}", connectivity_notice(event)));

    let coordinator = Arc::new(SyncCoordinator::new(
        context.store.clone(),
        monitor,
        Arc::new(remote),
        &context.config,
    ));
    let mut reports = coordinator.subscribe_reports();
    let handle = coordinator.start();

    println!("Watching for connectivity changes (Ctrl-C to stop)");
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            report = reports.recv() => match report {
                Ok(report) => println!("{}", report_toast(&report, now_millis())),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {skipped} drain report(s)");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    handle.stop();
    poller.abort();
    watcher.abort();
    Ok(())
}
