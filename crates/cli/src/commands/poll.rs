use serde_json::json;

use crate::commands::{prepare, CommandResult};
use concierge_server::bootstrap::bootstrap_with_config;

/// Runs one recommendation poll against the configured queue and backends.
pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("poll") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let polled = runtime.block_on(async {
        let app = bootstrap_with_config(config)
            .await
            .map_err(|error| ("bootstrap", error.to_string(), 4u8))?;
        let report = app.resolver.poll_once().await.map_err(|error| ("queue", error.to_string(), 5u8));
        app.db_pool.close().await;
        report
    });

    let report = match polled {
        Ok(report) => report,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("poll", error_class, message, exit_code);
        }
    };

    let data = json!({
        "received": report.received,
        "delivered": report
            .delivered
            .iter()
            .map(|recommendation| json!({
                "message_id": recommendation.message_id,
                "cuisine": recommendation.cuisine,
                "business_ids": recommendation.business_ids(),
                "delivery_id": recommendation.delivery.message_id,
            }))
            .collect::<Vec<_>>(),
        "failed": report
            .failed
            .iter()
            .map(|(message_id, error)| json!({ "message_id": message_id, "error": error.to_string() }))
            .collect::<Vec<_>>(),
    });

    if report.failed.is_empty() {
        CommandResult::success_with_data(
            "poll",
            format!("received {} message(s), delivered {}", report.received, report.delivered.len()),
            data,
        )
    } else {
        CommandResult::failure_with_data(
            "poll",
            "recommendation_failed",
            format!("{} of {} message(s) failed", report.failed.len(), report.received),
            data,
            6,
        )
    }
}
