//! Answers infrastructure questions by querying a Steampipe database.

use std::process::ExitCode;

use clap::Parser;
use cloudscout::cli::{self, CommonArgs};
use cloudscout::prompts::STEAMPIPE_SYSTEM_PROMPT;
use cloudscout::telemetry::init_tracing;
use cloudscout::tools::steampipe::{connect, steampipe_toolkit};
use cloudscout::{Result, ScoutError};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "cloudscout-steampipe", version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Postgres connection string of the Steampipe service
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_tracing(args.common.debug) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "cloudscout-steampipe failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let cfg = args.common.load_config()?;

    let database_url = args
        .database_url
        .clone()
        .or_else(|| cfg.steampipe.database_url.clone())
        .ok_or_else(|| {
            ScoutError::Config(
                "no Steampipe database configured; set STEAMPIPE_DB or [steampipe] database_url"
                    .into(),
            )
        })?;

    let pool = connect(&database_url).await?;
    info!("connected to Steampipe");

    let system_prompt = cfg
        .agent
        .system_prompt
        .clone()
        .unwrap_or_else(|| STEAMPIPE_SYSTEM_PROMPT.to_string());

    cli::run(&args.common, &cfg, &system_prompt, steampipe_toolkit(pool)).await
}
