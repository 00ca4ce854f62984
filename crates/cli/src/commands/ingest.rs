use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;

use crate::commands::{prepare, CommandResult};
use concierge_db::ingest::{bulk_index_ndjson, load_dataset};
use concierge_db::{connect_with_settings, migrations, SqlRestaurantRepository};

#[derive(Debug, Clone)]
pub struct IngestArgs {
    pub file: PathBuf,
    pub category: String,
    pub bulk_out: Option<PathBuf>,
    pub index: Option<String>,
    pub id_offset: u64,
}

pub fn run(args: IngestArgs) -> CommandResult {
    let (config, runtime) = match prepare("ingest") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let raw = match fs::read_to_string(&args.file) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "ingest",
                "dataset_read",
                format!("could not read `{}`: {error}", args.file.display()),
                4,
            );
        }
    };

    let loaded = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 5u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let repository = SqlRestaurantRepository::new(pool.clone());
        let loaded = load_dataset(&repository, &raw, &args.category, Utc::now())
            .await
            .map_err(|error| ("dataset_load", error.to_string(), 6u8));
        pool.close().await;
        loaded
    });

    let (report, records) = match loaded {
        Ok(loaded) => loaded,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("ingest", error_class, message, exit_code);
        }
    };

    let index = args.index.unwrap_or_else(|| config.search.index.clone());
    if let Some(bulk_out) = &args.bulk_out {
        let body = bulk_index_ndjson(&records, &index, args.id_offset);
        if let Err(error) = write_bulk_file(bulk_out, &body) {
            return CommandResult::failure(
                "ingest",
                "bulk_write",
                format!("could not write `{}`: {error}", bulk_out.display()),
                7,
            );
        }
    }

    CommandResult::success_with_data(
        "ingest",
        format!(
            "ingested {} of {} businesses for category `{}`",
            report.written,
            report.parsed,
            args.category.trim()
        ),
        json!({
            "parsed": report.parsed,
            "written": report.written,
            "category": args.category.trim(),
            "bulk_file": args.bulk_out.as_ref().map(|path| path.display().to_string()),
            "index": index,
            "next_id_offset": args.id_offset + records.len() as u64,
        }),
    )
}

fn write_bulk_file(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, body)
}
