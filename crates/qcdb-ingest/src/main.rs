//! QCDB Ingest - computational chemistry output ingestion tool

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qcdb_common::logging::{init_logging, LogConfig, LogLevel};
use qcdb_common::{JobIdentity, Package};
use qcdb_ingest::config::{DbConfig, IngestConfig};
use qcdb_ingest::pipeline::{IngestRequest, Pipeline, RecheckRequest};
use qcdb_ingest::store::{JobStore, MemoryStore, PgStore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "qcdb-ingest")]
#[command(author, version, about = "Ingest QE, VASP and ORCA outputs into the QCDB database")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor a job, parse its output and store it
    Ingest {
        /// Simulation package (qe, vasp, orca)
        #[arg(short, long)]
        package: Package,

        /// Primary output file (scf output, vasprun.xml or ORCA output)
        #[arg(short, long)]
        output: PathBuf,

        /// Secondary output file (Quantum ESPRESSO nscf)
        #[arg(long, alias = "nscf")]
        secondary: Option<PathBuf>,

        #[arg(long)]
        user_id: String,

        #[arg(long)]
        sys_name: String,

        #[arg(long)]
        description: Option<String>,

        /// Seconds between two reads of the output files
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Give up monitoring after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Use an in-memory store and print the record instead of writing to the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Monitor a stored job again and keep its status row current
    Recheck {
        #[arg(short, long)]
        package: Package,

        #[arg(long)]
        job_id: i64,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, alias = "nscf")]
        secondary: Option<PathBuf>,

        #[arg(long)]
        user_id: String,

        #[arg(long)]
        poll_interval: Option<u64>,

        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn ingest_config(poll_interval: Option<u64>, timeout: Option<u64>) -> Result<IngestConfig> {
    let config = IngestConfig::load()?.with_overrides(poll_interval, timeout);
    config.validate()?;
    Ok(config)
}

async fn connect() -> Result<PgStore> {
    let db_config = DbConfig::from_env()?;
    db_config.validate()?;
    PgStore::connect(&db_config)
        .await
        .context("Failed to connect to database")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("qcdb-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Ingest {
            package,
            output,
            secondary,
            user_id,
            sys_name,
            description,
            poll_interval,
            timeout,
            dry_run,
        } => {
            let config = ingest_config(poll_interval, timeout)?;
            let mut identity = JobIdentity::new(user_id, sys_name);
            if let Some(description) = description {
                identity = identity.with_description(description);
            }
            let mut request = IngestRequest::new(package, output, identity);
            if let Some(secondary) = secondary {
                request = request.with_secondary(secondary);
            }

            if dry_run {
                info!(%package, "Dry run, using in-memory store");
                let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
                let outcome = Pipeline::new(store, config).run(&request).await?;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }

            let store = connect().await?;
            let result = Pipeline::new(Arc::new(store.clone()), config)
                .run(&request)
                .await;
            store.close().await;

            let outcome = result?;
            info!(job_id = outcome.job_id, status = %outcome.status, "Job stored");
        },
        Command::Recheck {
            package,
            job_id,
            output,
            secondary,
            user_id,
            poll_interval,
            timeout,
        } => {
            let config = ingest_config(poll_interval, timeout)?;
            let request = RecheckRequest {
                package,
                job_id,
                user_id,
                output,
                secondary,
            };

            let store = connect().await?;
            let result = Pipeline::new(Arc::new(store.clone()), config)
                .recheck(&request)
                .await;
            store.close().await;

            let status = result?;
            info!(job_id, %status, "Job status recorded");
        },
    }

    Ok(())
}
