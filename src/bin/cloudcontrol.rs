//! Answers infrastructure questions using the AWS Cloud Control API.

use std::process::ExitCode;

use aws_config::BehaviorVersion;
use clap::Parser;
use cloudscout::cli::{self, CommonArgs};
use cloudscout::prompts::CLOUDCONTROL_SYSTEM_PROMPT;
use cloudscout::telemetry::init_tracing;
use cloudscout::tools::{cloudcontrol_toolkit, dns_toolkit};
use cloudscout::Result;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "cloudscout-cloudcontrol", version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Also register the DNS lookup tool
    #[arg(long)]
    with_dns: bool,
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
            error!(error = %err, "cloudscout-cloudcontrol failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let cfg = args.common.load_config()?;

    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    info!(region = ?sdk_config.region(), "loaded AWS configuration");

    let mut tools = cloudcontrol_toolkit(&sdk_config).await?;
    if args.with_dns {
        tools.extend(dns_toolkit());
    }

    let system_prompt = cfg
        .agent
        .system_prompt
        .clone()
        .unwrap_or_else(|| CLOUDCONTROL_SYSTEM_PROMPT.to_string());

    cli::run(&args.common, &cfg, &system_prompt, tools).await
}
