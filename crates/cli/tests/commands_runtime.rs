use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use concierge_cli::commands::ingest::{self, IngestArgs};
use concierge_cli::commands::validate::{self, ValidateArgs};
use concierge_cli::commands::{doctor, migrate, poll};
use serde_json::Value;

const DATASET: &str = r#"{
  "data": {
    "search": {
      "total": 2,
      "business": [
        {
          "id": "wo-hop-nyc",
          "name": "Wo Hop",
          "rating": 4.0,
          "review_count": 1210,
          "location": { "address1": "17 Mott St", "postal_code": "10013" },
          "coordinates": { "latitude": 40.7137, "longitude": -73.9985 }
        },
        {
          "id": "joes-shanghai-nyc",
          "name": "Joe's Shanghai",
          "rating": 4.5,
          "location": { "address1": "46 Bowery", "postal_code": "10013" },
          "coordinates": { "latitude": 40.7156, "longitude": -73.9967 }
        }
      ]
    }
  }
}"#;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("CONCIERGE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_unknown_backend() {
    with_env(
        &[("CONCIERGE_DATABASE_URL", "sqlite::memory:"), ("CONCIERGE_SEARCH_BACKEND", "solr")],
        || {
            let result = migrate::run();
            assert_eq!(result.exit_code, 2, "expected config validation failure code");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["status"], "error");
            assert_eq!(payload["error_class"], "config_validation");
        },
    );
}

#[test]
fn validate_accepts_supported_partial_slots() {
    with_env(&[], || {
        let result = validate::run(ValidateArgs {
            location: Some("Manhattan".to_string()),
            cuisine: Some("chinese".to_string()),
            people: Some("4".to_string()),
            ..ValidateArgs::default()
        });
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "validate");
        assert_eq!(payload["data"]["result"]["isValid"], true);
        assert_eq!(payload["data"]["slots"]["Location"], "Manhattan");
    });
}

#[test]
fn validate_reports_first_violated_slot() {
    with_env(&[], || {
        let result = validate::run(ValidateArgs {
            location: Some("Brooklyn".to_string()),
            phone: Some("12".to_string()),
            ..ValidateArgs::default()
        });
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "slot_rejected");
        assert_eq!(payload["data"]["result"]["violatedSlot"], "Location");
        assert!(payload["data"]["result"]["message"].as_str().is_some());
    });
}

#[test]
fn ingest_loads_dataset_and_writes_bulk_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset_path = dir.path().join("chinese.json");
    fs::write(&dataset_path, DATASET).expect("write dataset");
    let bulk_path = dir.path().join("out/bulk.ndjson");
    let database_url = sqlite_url(dir.path());

    with_env(&[("CONCIERGE_DATABASE_URL", database_url.as_str())], || {
        let result = ingest::run(IngestArgs {
            file: dataset_path.clone(),
            category: "chinese".to_string(),
            bulk_out: Some(bulk_path.clone()),
            index: Some("dining".to_string()),
            id_offset: 10,
        });
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["parsed"], 2);
        assert_eq!(payload["data"]["written"], 2);
        assert_eq!(payload["data"]["next_id_offset"], 12);
    });

    let bulk = fs::read_to_string(&bulk_path).expect("bulk file");
    let lines: Vec<Value> =
        bulk.lines().map(|line| serde_json::from_str(line).expect("ndjson line")).collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["index"]["_index"], "dining");
    assert_eq!(lines[1]["business_id"], "wo-hop-nyc");
}

#[test]
fn ingest_reports_missing_dataset_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());

    with_env(&[("CONCIERGE_DATABASE_URL", database_url.as_str())], || {
        let result = ingest::run(IngestArgs {
            file: dir.path().join("absent.json"),
            category: "thai".to_string(),
            bulk_out: None,
            index: None,
            id_offset: 0,
        });
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "dataset_read");
    });
}

#[test]
fn poll_on_empty_queue_succeeds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());

    with_env(&[("CONCIERGE_DATABASE_URL", database_url.as_str())], || {
        let result = poll::run();
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "poll");
        assert_eq!(payload["data"]["received"], 0);
        assert_eq!(payload["data"]["delivered"].as_array().map(Vec::len), Some(0));
    });
}

#[test]
fn doctor_flags_empty_restaurant_catalog_until_ingest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dataset_path = dir.path().join("chinese.json");
    fs::write(&dataset_path, DATASET).expect("write dataset");
    let database_url = sqlite_url(dir.path());

    with_env(&[("CONCIERGE_DATABASE_URL", database_url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let (output, passed) = doctor::run(true);
        assert!(!passed, "an empty catalog should fail readiness");
        let catalog = check_named(&parse_payload(&output), "restaurant_catalog");
        assert_eq!(catalog["status"], "fail");
        assert!(catalog["details"].as_str().is_some_and(|details| details.contains("ingest")));

        let result = ingest::run(IngestArgs {
            file: dataset_path.clone(),
            category: "chinese".to_string(),
            bulk_out: None,
            index: None,
            id_offset: 0,
        });
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let (output, passed) = doctor::run(true);
        let report = parse_payload(&output);
        assert!(passed, "unexpected report: {output}");
        let catalog = check_named(&report, "restaurant_catalog");
        assert_eq!(catalog["status"], "pass");
        assert_eq!(catalog["details"], "2 restaurant record(s) loaded");
    });
}

fn check_named(report: &Value, name: &str) -> Value {
    report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == name))
        .cloned()
        .unwrap_or_else(|| panic!("missing `{name}` check in {report}"))
}

fn sqlite_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("concierge.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CONCIERGE_DATABASE_URL",
        "CONCIERGE_DATABASE_MAX_CONNECTIONS",
        "CONCIERGE_DATABASE_TIMEOUT_SECS",
        "CONCIERGE_NLU_BASE_URL",
        "CONCIERGE_NLU_API_KEY",
        "CONCIERGE_DIALOG_TIMEZONE",
        "CONCIERGE_DIALOG_SUPPORTED_LOCATION",
        "CONCIERGE_DIALOG_SUPPORTED_CUISINES",
        "CONCIERGE_QUEUE_NAME",
        "CONCIERGE_QUEUE_WAIT_TIME_SECS",
        "CONCIERGE_QUEUE_MAX_MESSAGES",
        "CONCIERGE_SEARCH_BACKEND",
        "CONCIERGE_SEARCH_BASE_URL",
        "CONCIERGE_SEARCH_INDEX",
        "CONCIERGE_NOTIFICATION_BACKEND",
        "CONCIERGE_NOTIFICATION_WEBHOOK_URL",
        "CONCIERGE_WORKER_ENABLED",
        "CONCIERGE_LOGGING_LEVEL",
        "CONCIERGE_LOGGING_FORMAT",
        "CONCIERGE_LOG_LEVEL",
        "CONCIERGE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
