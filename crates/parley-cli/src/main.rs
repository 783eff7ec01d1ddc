mod prompt;
mod session;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use parley::conversation::{
    Conversation, ConversationConfig, MultiToolPolicy, DEFAULT_MAX_TOOL_CALLS,
};
use parley::peer::stdio::StdioPeer;
use parley::peer::sysinfo::SysinfoPeer;
use parley::peer::ToolPeer;
use parley::providers::openai::{OpenAiConfig, OpenAiModelClient};
use tracing_subscriber::EnvFilter;

use prompt::cliclack::CliclackPrompt;
use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// OpenAI API key (can also be set via OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// OpenAI-compatible completion host
    #[arg(long, default_value = "https://api.openai.com")]
    host: String,

    /// Model to use
    #[arg(short, long, default_value = "gpt-4o")]
    model: String,

    /// System prompt for the conversation
    #[arg(long, default_value = "You are a helpful assistant.")]
    system: String,

    /// Tool server command to spawn and talk to over stdio, e.g.
    /// "python sysinfo_server.py". Defaults to the built-in sysinfo tools.
    #[arg(long)]
    peer: Option<String>,

    /// Ceiling on tool calls within one turn
    #[arg(long, default_value_t = DEFAULT_MAX_TOOL_CALLS)]
    max_tool_calls: usize,

    /// Per-tool-call timeout in seconds
    #[arg(long, default_value_t = 30)]
    tool_timeout: u64,

    /// How to treat a completion carrying more than one tool call
    #[arg(long, value_enum, default_value = "first-only")]
    multi_tool: PolicyArg,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    FirstOnly,
    Sequential,
    RejectMultiple,
}

impl From<PolicyArg> for MultiToolPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::FirstOnly => MultiToolPolicy::FirstOnly,
            PolicyArg::Sequential => MultiToolPolicy::Sequential,
            PolicyArg::RejectMultiple => MultiToolPolicy::RejectMultiple,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| env::var("OPENAI_API_KEY").ok())
        .context("API key must be provided via --api-key or OPENAI_API_KEY")?;
    let model = OpenAiModelClient::new(OpenAiConfig::new(&cli.host, api_key, &cli.model))?;

    let peer = build_peer(&cli).await?;

    let config = ConversationConfig {
        system_prompt: cli.system.clone(),
        max_tool_calls: cli.max_tool_calls,
        multi_tool_policy: cli.multi_tool.into(),
        tool_timeout: Duration::from_secs(cli.tool_timeout),
    };
    let conversation = Conversation::new(Box::new(model), peer, config);

    println!(
        "parley {}",
        style("- type \"quit\" to end the session").dim()
    );
    println!();

    let mut session = Session::new(conversation, Box::new(CliclackPrompt::new()));
    session.start().await
}

async fn build_peer(cli: &Cli) -> Result<Arc<dyn ToolPeer>> {
    match &cli.peer {
        Some(command_line) => {
            let mut parts = command_line.split_whitespace();
            let command = parts.next().context("--peer must name a command")?;
            let args: Vec<String> = parts.map(str::to_string).collect();
            let peer = StdioPeer::spawn(command, &args)
                .await
                .with_context(|| format!("failed to start tool peer `{command_line}`"))?;
            Ok(Arc::new(peer))
        }
        None => Ok(Arc::new(SysinfoPeer::new())),
    }
}
