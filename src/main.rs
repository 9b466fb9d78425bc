mod auth;
mod config;

use anyhow::Context;
use clap::Parser;
use processor::{Clients, Settings, Submission};
use std::{path::PathBuf, sync::Arc};

/// Grades one contest submission against the configured test matrix.
#[derive(Parser)]
struct Args {
    /// Contestant name, as it appears in the results table
    #[clap(long)]
    author: String,
    /// Path to the submission archive
    #[clap(long)]
    zip: PathBuf,
    /// Path to the judge config manifest
    #[clap(long, default_value = "judge.yaml")]
    config: PathBuf,
    /// Path to the access token file
    #[clap(long, default_value = "token.json")]
    token: PathBuf,
    /// Run the full pipeline against in-memory stores instead of the
    /// remote services
    #[clap(long)]
    dry_run: bool,
}

async fn create_clients(args: &Args, config: &config::Config) -> anyhow::Result<Clients> {
    if args.dry_run {
        tracing::info!("dry run: using in-memory stores");
        return Ok(dry_run_clients(&args.author, config));
    }
    let token = auth::load_token(&args.token)
        .await
        .context("failed to load access token")?;
    tracing::info!("successful auth");
    Ok(Clients {
        store: Arc::new(drive_client::DriveClient::new(token.clone())),
        table: Arc::new(sheets_client::SheetsClient::new(
            token,
            config.spreadsheet_id.clone(),
        )),
    })
}

/// Fake stores pre-provisioned the way organizers provision the real
/// ones, so a dry run exercises every pipeline stage.
fn dry_run_clients(author: &str, config: &config::Config) -> Clients {
    use processor::fake::{FakeStore, FakeTable};
    let store = FakeStore::new();
    store.provision_folder(&config.round, &config.drive_root);
    let table = FakeTable::new();
    let tests: Vec<&str> = config.tests.iter().map(|t| t.name.as_str()).collect();
    table.add_sheet(author, &tests);
    Clients {
        store: Arc::new(store),
        table: Arc::new(table),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args: Args = Parser::parse();
    let config = config::Config::load(&args.config).await?;
    let clients = create_clients(&args, &config).await?;

    let submission = Submission {
        author: args.author,
        archive: args.zip,
    };
    let settings = Settings {
        scratch_dir: config.scratch_dir.clone(),
        drive_root: config.drive_root.clone(),
        round: config.round.clone(),
        timeout: config.timeout(),
        render_height: config.render_height,
    };
    processor::judge(&submission, &config.tests, &clients, &settings).await?;
    tracing::info!("done");
    Ok(())
}
