use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jellyfin_export_core::{
    actions::{RemoteCall, SettingsForm},
    api::types::ExportsQuery,
    export_map::ExportStatus,
};
use jellyfin_exportctl::{DEFAULT_SERVER_URL, ExportClient, read_settings_file};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "jellyfin-exportctl")]
#[command(about = "Trigger and inspect Jellyfin Export syncs")]
struct Cli {
    /// Base URL of the export server
    #[arg(long, global = true, env = "JELLYFIN_EXPORT_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the settings form buttons the server offers
    Form,
    /// Press a settings form button, e.g. `click "Sync Movies"`
    Click { label: String },
    /// Queue syncs directly
    #[command(subcommand)]
    Sync(SyncCommand),
    /// Queue removal of exports whose drive entities became invalid
    Cleanup { library: String },
    /// Show or replace the settings document
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Queue counts and recent jobs
    Jobs {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// One job by id
    Job { id: Uuid },
    /// Export map records
    Exports {
        #[arg(long)]
        library: Option<String>,
        /// exported, skipped, error or deleted
        #[arg(long)]
        status: Option<ExportStatus>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    /// Every enabled library
    All,
    /// One library by name
    Library { name: String },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Show,
    /// Upload a TOML or JSON settings document
    Apply { path: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let client = ExportClient::new(&cli.server).context("failed to build HTTP client")?;

    match cli.command {
        Command::Form => {
            let form = client.form().await?;
            for button in form["buttons"].as_array().into_iter().flatten() {
                println!(
                    "{:<12} {}",
                    button["label"].as_str().unwrap_or_default(),
                    button["call"]["method"].as_str().unwrap_or_default()
                );
            }
        }
        Command::Click { label } => {
            let outcome = SettingsForm::new().click(&label, &client).await?;
            println!("{}", outcome.message());
            if !outcome.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Sync(SyncCommand::All) => {
            print_json(&client.call_method(&RemoteCall::sync_all()).await?)?;
        }
        Command::Sync(SyncCommand::Library { name }) => {
            print_json(&client.call_method(&RemoteCall::sync_library(&name)).await?)?;
        }
        Command::Cleanup { library } => {
            print_json(
                &client
                    .call_method(&RemoteCall::cleanup_library(&library))
                    .await?,
            )?;
        }
        Command::Settings(SettingsCommand::Show) => {
            print_json(&client.settings().await?)?;
        }
        Command::Settings(SettingsCommand::Apply { path }) => {
            let settings = read_settings_file(&path)?;
            print_json(&client.put_settings(&settings).await?)?;
        }
        Command::Jobs { limit } => print_json(&client.jobs(limit).await?)?,
        Command::Job { id } => print_json(&client.job(id).await?)?,
        Command::Exports {
            library,
            status,
            limit,
        } => {
            let query = ExportsQuery {
                library,
                status,
                limit,
            };
            print_json(&client.exports(&query).await?)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
