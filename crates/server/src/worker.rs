use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use concierge_core::recommendation::{PollReport, RecommendationResolver};

/// Polls the reservation queue on a fixed interval until `shutdown` flips to
/// `true` or its sender is dropped.
pub fn spawn(
    resolver: Arc<RecommendationResolver>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(poll_interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            event_name = "worker.started",
            correlation_id = "worker",
            poll_interval_ms = poll_interval.as_millis() as u64,
            "recommendation worker started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    run_poll(&resolver).await;
                }
            }
        }

        info!(event_name = "worker.stopped", correlation_id = "worker", "recommendation worker stopped");
    })
}

/// One poll with its outcome logged. Dequeue failures are logged and the
/// next tick tries again.
pub async fn run_poll(resolver: &RecommendationResolver) -> Option<PollReport> {
    match resolver.poll_once().await {
        Ok(report) => {
            if report.received > 0 {
                info!(
                    event_name = "worker.poll_completed",
                    correlation_id = "worker",
                    received = report.received,
                    delivered = report.delivered.len(),
                    failed = report.failed.len(),
                    "recommendation poll completed"
                );
            }
            Some(report)
        }
        Err(poll_error) => {
            error!(
                event_name = "worker.poll_failed",
                correlation_id = "worker",
                error = %poll_error,
                "reservation queue could not be read"
            );
            None
        }
    }
}
