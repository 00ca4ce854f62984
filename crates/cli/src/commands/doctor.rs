use concierge_core::config::{AppConfig, LoadOptions, NotificationBackend, SearchBackend};
use concierge_db::{connect_with_settings, migrations, ping, SqlRestaurantRepository};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn passed(&self) -> bool {
        self.overall_status == CheckStatus::Pass
    }
}

/// Returns the rendered report and whether every check passed.
pub fn run(json_output: bool) -> (String, bool) {
    let report = build_report();
    let passed = report.passed();

    if json_output {
        let rendered = serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
        return (rendered, passed);
    }

    (render_human(&report), passed)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_collaborators(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in [
                "collaborator_readiness",
                "database_connectivity",
                "schema_migrations",
                "restaurant_catalog",
            ] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_collaborators(config: &AppConfig) -> DoctorCheck {
    if let Err(error) = config.dialog.timezone() {
        return DoctorCheck::fail("collaborator_readiness", error.to_string());
    }

    let nlu = match config.nlu.base_url.as_deref() {
        Some(url) => format!("nlu at {url}"),
        None => "nlu unset (chat gateway disabled)".to_string(),
    };
    let search = match config.search.backend {
        SearchBackend::Database => "search via database".to_string(),
        SearchBackend::Opensearch => format!(
            "search via opensearch index `{}` at {}",
            config.search.index,
            config.search.base_url.as_deref().unwrap_or("<unset>")
        ),
    };
    let notification = match config.notification.backend {
        NotificationBackend::Log => "notifications logged".to_string(),
        NotificationBackend::Webhook => format!(
            "notifications posted to {}",
            config.notification.webhook_url.as_deref().unwrap_or("<unset>")
        ),
    };

    DoctorCheck::pass("collaborator_readiness", format!("{nlu}; {search}; {notification}"))
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("schema_migrations", "the async runtime did not start"),
                DoctorCheck::skipped("restaurant_catalog", "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped("schema_migrations", "the database is unreachable"),
                    DoctorCheck::skipped("restaurant_catalog", "the database is unreachable"),
                ];
            }
        };

        let connectivity = match ping(&pool).await {
            Ok(()) => DoctorCheck::pass(
                "database_connectivity",
                format!("connected using `{}`", config.database.url),
            ),
            Err(error) => DoctorCheck::fail("database_connectivity", format!("ping failed: {error}")),
        };
        let mut schema_ready = false;
        let schema = match migrations::pending_count(&pool).await {
            Ok(0) => {
                schema_ready = true;
                DoctorCheck::pass("schema_migrations", "schema is up to date")
            }
            Ok(pending) => DoctorCheck::fail(
                "schema_migrations",
                format!("{pending} migration(s) pending; run `concierge migrate`"),
            ),
            Err(error) => DoctorCheck::fail(
                "schema_migrations",
                format!("could not read migration history: {error}"),
            ),
        };

        let catalog = if schema_ready {
            check_catalog(&SqlRestaurantRepository::new(pool.clone())).await
        } else {
            DoctorCheck::skipped("restaurant_catalog", "the schema is not up to date")
        };

        pool.close().await;
        vec![connectivity, schema, catalog]
    })
}

async fn check_catalog(repository: &SqlRestaurantRepository) -> DoctorCheck {
    match repository.count().await {
        Ok(0) => DoctorCheck::fail(
            "restaurant_catalog",
            "no restaurant records loaded; run `concierge ingest`",
        ),
        Ok(count) => {
            DoctorCheck::pass("restaurant_catalog", format!("{count} restaurant record(s) loaded"))
        }
        Err(error) => DoctorCheck::fail(
            "restaurant_catalog",
            format!("could not count restaurant records: {error}"),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
