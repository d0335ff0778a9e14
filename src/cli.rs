//! Command line surface shared by the binaries: flags, one-shot mode and the REPL.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::agent::Agent;
use crate::config::AppConfig;
use crate::error::Result;
use crate::llm::{LanguageModel, OllamaClient};
use crate::tool::ToolRegistry;

const EXIT_KEYWORDS: &[&str] = &["exit", "quit", "bye", "cancel", "can", "stop"];
const RESET_KEYWORDS: &[&str] = &["reset", "clear", "forget"];

/// Flags common to every binary.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// The URL of the Ollama server
    #[arg(long)]
    pub ollama_url: Option<String>,

    /// The model to use for the LLM
    #[arg(long)]
    pub model: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Ask a single question, print the answer and exit
    #[arg(long)]
    pub prompt: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum model requests per question
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Wall-clock limit per question, in seconds
    #[arg(long)]
    pub time_budget_secs: Option<u64>,
}

impl CommonArgs {
    /// Configuration from file and environment, with flags taking precedence.
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut cfg = AppConfig::from_env_or_file(self.config.as_deref())?;
        if let Some(url) = &self.ollama_url {
            cfg.model.ollama_url = url.clone();
        }
        if let Some(model) = &self.model {
            cfg.model.model = model.clone();
        }
        if let Some(steps) = self.max_steps {
            cfg.agent.max_steps = steps;
        }
        if let Some(secs) = self.time_budget_secs {
            cfg.agent.time_budget_secs = Some(secs);
        }
        Ok(cfg)
    }
}

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    Reset,
    Skip,
    Prompt(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Command::Skip;
        }

        let lowered = trimmed.to_lowercase();
        if EXIT_KEYWORDS.contains(&lowered.as_str()) {
            Command::Exit
        } else if RESET_KEYWORDS.contains(&lowered.as_str()) {
            Command::Reset
        } else {
            Command::Prompt(trimmed.to_string())
        }
    }
}

/// Connects to Ollama, builds the agent and runs it in one-shot or interactive mode.
pub async fn run(
    args: &CommonArgs,
    cfg: &AppConfig,
    system_prompt: &str,
    tools: ToolRegistry,
) -> Result<()> {
    let client = OllamaClient::from_config(&cfg.model)?;
    let version = client.check_connection().await?;
    info!(url = client.base_url(), version = %version, model = %cfg.model.model, "connected to Ollama");

    let mut agent = Agent::new(Arc::new(client))
        .with_model_name(cfg.model.model.clone())
        .with_system_prompt(system_prompt)
        .with_tools(tools)
        .with_config(&cfg.agent);
    agent.validate_tools()?;
    debug!(tools = ?agent.tools().names(), "registered tools");

    let mut stdout = tokio::io::stdout();
    match &args.prompt {
        Some(prompt) => {
            debug!(prompt = %prompt, "running in one-shot mode");
            let reply = ask(&mut agent, prompt.clone()).await?;
            write_reply(&mut stdout, &reply).await
        }
        None => {
            debug!("running in interactive mode");
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            run_interactive(&mut agent, stdin, &mut stdout).await
        }
    }
}

/// Reads questions line by line until an exit keyword or end of input.
///
/// A failed exchange is logged and the loop keeps going.
pub async fn run_interactive<M, R, W>(agent: &mut Agent<M>, input: R, output: &mut W) -> Result<()>
where
    M: LanguageModel,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, exiting");
                break;
            }
        };
        let Some(line) = line else {
            info!("End of input, exiting");
            break;
        };

        match Command::parse(&line) {
            Command::Skip => continue,
            Command::Exit => {
                info!("Exiting");
                break;
            }
            Command::Reset => {
                info!("Resetting");
                agent.reset();
            }
            Command::Prompt(prompt) => match ask(agent, prompt).await {
                Ok(reply) => write_reply(output, &reply).await?,
                Err(err) => error!(error = %err, "Error calling chat"),
            },
        }
    }
    Ok(())
}

/// Runs one exchange; Ctrl-C cancels it without leaving the process.
async fn ask<M: LanguageModel>(agent: &mut Agent<M>, prompt: String) -> Result<String> {
    let cancel = CancellationToken::new();
    let chat = agent.chat(prompt, &cancel);
    tokio::pin!(chat);

    tokio::select! {
        result = &mut chat => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, cancelling the current question");
            cancel.cancel();
            chat.await
        }
    }
}

async fn write_reply<W: AsyncWrite + Unpin>(output: &mut W, reply: &str) -> Result<()> {
    output.write_all(reply.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        for word in ["exit", "QUIT", "Bye", "cancel", "can", "  stop  "] {
            assert_eq!(Command::parse(word), Command::Exit, "{word}");
        }
        for word in ["reset", "CLEAR", "Forget"] {
            assert_eq!(Command::parse(word), Command::Reset, "{word}");
        }
    }

    #[test]
    fn other_lines_are_prompts() {
        assert_eq!(Command::parse("   "), Command::Skip);
        assert_eq!(
            Command::parse(" how many buckets? "),
            Command::Prompt("how many buckets?".into())
        );
        assert_eq!(
            Command::parse("stop the instance"),
            Command::Prompt("stop the instance".into())
        );
    }

    #[test]
    fn flags_override_configuration() {
        let args = CommonArgs {
            model: Some("qwen2.5".into()),
            max_steps: Some(3),
            ..CommonArgs::default()
        };

        let cfg = args.load_config().unwrap();
        assert_eq!(cfg.model.model, "qwen2.5");
        assert_eq!(cfg.agent.max_steps, 3);
    }
}
