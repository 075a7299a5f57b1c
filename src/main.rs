use std::io::{self, Write as _};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

mod firestore;
mod migrate;
mod models;
mod normalize;
mod sample;
mod upsert;

use firestore::{FirestoreClient, StoreConfig};
use models::RunStats;
use upsert::{UploadOptions, CHECKPOINT_FILE, MAX_GROUP_SIZE};

#[derive(Parser)]
#[command(name = "alumni-sync")]
#[command(about = "Sync alumni directory contact data into Firestore", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate sample alumni records and upload them
    Seed {
        #[arg(long, default_value_t = 100)]
        count: usize,
        /// Delete the whole collection first
        #[arg(long)]
        reset: bool,
        /// Skip the interactive confirmation for --reset
        #[arg(long)]
        yes: bool,
    },
    /// Import alumni from a contacts CSV export (full replace per document)
    Import {
        #[arg(long)]
        csv: PathBuf,
        /// Delete the whole collection first
        #[arg(long)]
        reset: bool,
        /// Skip the interactive confirmation for --reset
        #[arg(long)]
        yes: bool,
        #[arg(long, default_value_t = MAX_GROUP_SIZE)]
        batch_size: usize,
        /// Accepted-row offset to resume from after a failed run
        #[arg(long)]
        resume: Option<usize>,
        /// Sleep this many milliseconds between group commits
        #[arg(long)]
        pace_ms: Option<u64>,
    },
    /// Merge supplementary CSV fields onto existing documents
    Backfill {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value_t = MAX_GROUP_SIZE)]
        batch_size: usize,
    },
    /// Convert stored graduation years to cohort indices, in place
    ConvertCohorts {
        #[arg(long, default_value_t = MAX_GROUP_SIZE)]
        batch_size: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let project_id = std::env::var("FIRESTORE_PROJECT_ID")
        .context("FIRESTORE_PROJECT_ID must be set to the target project")?;
    let mut config = StoreConfig::new(project_id, "alumni");
    if let Ok(token) = std::env::var("FIRESTORE_AUTH_TOKEN") {
        config.auth_token = Some(token);
    }
    if let Ok(host) = std::env::var("FIRESTORE_EMULATOR_HOST") {
        config.base_url = format!("http://{host}/v1");
    }
    let client = FirestoreClient::new(config)?;

    match cli.command {
        Commands::Seed { count, reset, yes } => {
            if reset && !reset_collection(&client, yes).await? {
                return Ok(());
            }
            let mut rng = rand::thread_rng();
            let records = sample::generate(count, &mut rng);
            let uploaded =
                upsert::upload_records(&client, &records, &UploadOptions::default()).await?;
            println!("Seeded {uploaded} sample alumni.");
        }
        Commands::Import {
            csv,
            reset,
            yes,
            batch_size,
            resume,
            pace_ms,
        } => {
            if reset && !reset_collection(&client, yes).await? {
                return Ok(());
            }
            let checkpoint = PathBuf::from(CHECKPOINT_FILE);
            let resume_from = match resume {
                Some(offset) => offset,
                None => upsert::Checkpoint::load(&checkpoint)?.unwrap_or(0),
            };
            if resume_from > 0 {
                println!("Resuming after {resume_from} already-committed rows.");
            }
            let options = UploadOptions {
                group_size: batch_size,
                pace: pace_ms.map(Duration::from_millis),
                resume_from,
                checkpoint: Some(checkpoint),
            };
            let stats = upsert::import_csv(&client, &csv, &options).await?;
            println!("Import complete from {}.", csv.display());
            print_stats(&stats);
        }
        Commands::Backfill { csv, batch_size } => {
            let options = UploadOptions {
                group_size: batch_size,
                ..Default::default()
            };
            let stats = upsert::backfill_csv(&client, &csv, &options).await?;
            println!("Backfill complete from {}.", csv.display());
            print_stats(&stats);
        }
        Commands::ConvertCohorts { batch_size } => {
            let updated = migrate::convert_cohorts(&client, batch_size).await?;
            println!("Converted {updated} documents to cohort form.");
        }
    }

    Ok(())
}

/// Gates the destructive bulk delete. Returns false when the user declines.
async fn reset_collection(client: &FirestoreClient, yes: bool) -> anyhow::Result<bool> {
    let confirmed = yes
        || confirm(&format!(
            "Delete every document in '{}'?",
            client.collection()
        ))?;
    if !confirmed {
        println!("Reset cancelled.");
        return Ok(false);
    }
    let deleted = upsert::delete_all(client, MAX_GROUP_SIZE, confirmed).await?;
    println!("Deleted {deleted} existing documents.");
    Ok(true)
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} (yes/no): ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("yes"))
}

fn print_stats(stats: &RunStats) {
    println!(
        "{} uploaded, {} skipped, {} errors.",
        stats.uploaded, stats.skipped, stats.errored
    );
}
