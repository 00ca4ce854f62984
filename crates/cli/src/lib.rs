pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::ingest::IngestArgs;
use commands::validate::ValidateArgs;

#[derive(Debug, Parser)]
#[command(
    name = "concierge",
    about = "Dining concierge operator CLI",
    long_about = "Inspect configuration, check readiness, migrate the store, load restaurant datasets, \
                  dry-run slot validation, and drive the recommendation worker by hand.",
    after_help = "Examples:\n  concierge doctor --json\n  concierge ingest --file yelp-chinese.json --category chinese\n  concierge validate --location manhattan --cuisine thai --people 4\n  concierge poll"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Check config, collaborator settings, DB connectivity, and schema status")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load a business search dataset into the restaurant store")]
    Ingest {
        #[arg(long, help = "Path to a search response JSON document")]
        file: PathBuf,
        #[arg(long, help = "Cuisine category the dataset was fetched for")]
        category: String,
        #[arg(long, help = "Also write an OpenSearch bulk NDJSON file here")]
        bulk_out: Option<PathBuf>,
        #[arg(long, help = "Index name for the bulk file (defaults to search.index)")]
        index: Option<String>,
        #[arg(long, default_value_t = 0, help = "First document id used in the bulk file")]
        id_offset: u64,
    },
    #[command(about = "Run the reservation slot rules against the given values")]
    Validate {
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        cuisine: Option<String>,
        #[arg(long, help = "Dining date as YYYY-MM-DD")]
        date: Option<String>,
        #[arg(long, help = "Dining time as HH:MM")]
        time: Option<String>,
        #[arg(long, help = "Party size")]
        people: Option<String>,
        #[arg(long, help = "Ten digit phone number")]
        phone: Option<String>,
    },
    #[command(about = "Process one batch of queued reservations and send recommendations")]
    Poll,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            let (output, passed) = commands::doctor::run(json);
            commands::CommandResult { exit_code: if passed { 0 } else { 1 }, output }
        }
        Command::Migrate => commands::migrate::run(),
        Command::Ingest { file, category, bulk_out, index, id_offset } => {
            commands::ingest::run(IngestArgs { file, category, bulk_out, index, id_offset })
        }
        Command::Validate { location, cuisine, date, time, people, phone } => {
            commands::validate::run(ValidateArgs { location, cuisine, date, time, people, phone })
        }
        Command::Poll => commands::poll::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
