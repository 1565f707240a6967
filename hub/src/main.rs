use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mcp_hub::agent::{
    chat_channel, ChatEvent, ChatSummary, ConversationMessage, Orchestrator,
    DEFAULT_CHANNEL_CAPACITY,
};
use mcp_hub::config::{HubFileConfig, McpConfig};
use mcp_hub::llm::{build_provider, ProviderKind, ProviderSettings};
use mcp_hub::mcp::session::SessionManager;
use mcp_hub::web::{self, AppState, WebConfig};

#[derive(Parser)]
#[command(name = "hub")]
#[command(about = "Session manager and tool-calling agent for MCP tool servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// LLM provider (ollama, openai, anthropic)
    #[arg(long, env = "HUB_PROVIDER")]
    provider: Option<String>,

    /// Model to use
    #[arg(long, env = "HUB_MODEL")]
    model: Option<String>,

    /// Provider base URL
    #[arg(long, env = "HUB_URL")]
    url: Option<String>,

    /// Provider API key
    #[arg(long, env = "HUB_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(long, short, default_value_t = 8000)]
        port: u16,
        /// Connect every server in .mcp.json on startup
        #[arg(long)]
        preload: bool,
    },
    /// List tools from the servers in .mcp.json
    Tools {
        /// Only list tools from a specific server
        #[arg(long)]
        server: Option<String>,
    },
    /// Call a tool directly
    Call {
        /// Server name
        server: String,
        /// Tool name
        tool: String,
        /// Arguments as JSON
        #[arg(long, short)]
        args: Option<String>,
    },
    /// Chat with tools (interactive when no message is given)
    Chat {
        message: Option<String>,
        /// System prompt override
        #[arg(long, short)]
        system: Option<String>,
        /// Only offer tools from these servers
        #[arg(long = "server")]
        servers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    mcp_common::init_tracing("mcp_hub")?;

    let cli = Cli::parse();
    let file_config = HubFileConfig::load()?;
    let settings = provider_settings(&cli, &file_config)?;
    let sessions = Arc::new(SessionManager::new(file_config.session_config()));

    let result = match cli.command {
        Commands::Serve { port, preload } => {
            if preload {
                connect_configured(&sessions).await?;
            }
            let state = AppState::new(sessions.clone(), settings, file_config.orchestrator_config());
            web::serve(WebConfig { port }, state).await
        }
        Commands::Tools { server } => {
            connect_configured(&sessions).await?;
            run_tools(&sessions, server).await
        }
        Commands::Call { server, tool, args } => {
            connect_configured(&sessions).await?;
            run_call_tool(&sessions, &server, &tool, args).await
        }
        Commands::Chat {
            message,
            system,
            servers,
        } => {
            connect_configured(&sessions).await?;
            let mut config = file_config.orchestrator_config();
            if let Some(system) = system {
                config.system_prompt = system;
            }
            config.servers = servers;
            let orchestrator = Orchestrator::new(sessions.clone(), build_provider(&settings)?, config);
            run_chat(&orchestrator, &settings, message).await
        }
    };

    sessions.shutdown().await;
    result
}

/// File config, overridden by flags and environment
fn provider_settings(cli: &Cli, file_config: &HubFileConfig) -> Result<ProviderSettings> {
    let mut settings = file_config.provider_settings();
    if let Some(provider) = &cli.provider {
        let kind: ProviderKind = provider.parse()?;
        if kind != settings.kind {
            settings.api_key = kind
                .default_api_key_env()
                .and_then(|var| std::env::var(var).ok());
        }
        settings.kind = kind;
    }
    if let Some(model) = &cli.model {
        settings.model = model.clone();
    }
    if let Some(url) = &cli.url {
        settings.base_url = Some(url.clone());
    }
    if let Some(key) = &cli.api_key {
        settings.api_key = Some(key.clone());
    }
    Ok(settings)
}

/// Connect every server from .mcp.json; failures are reported, not fatal
async fn connect_configured(sessions: &SessionManager) -> Result<()> {
    let Some(config) = McpConfig::load()? else {
        println!("No .mcp.json found in current directory or parents.");
        println!("Create one to configure MCP servers.");
        return Ok(());
    };

    for (name, spec) in config.servers() {
        match sessions.connect(name, spec.clone()).await {
            Ok(response) => tracing::info!("Connected '{}' ({} tools)", name, response.count),
            Err(e) => eprintln!("Failed to connect '{}': {}", name, e),
        }
    }
    Ok(())
}

async fn run_tools(sessions: &SessionManager, server_filter: Option<String>) -> Result<()> {
    let connected = sessions.list_connected().await;
    if connected.is_empty() {
        println!("No servers connected.");
        return Ok(());
    }

    for server in connected {
        if server_filter.as_ref().is_some_and(|s| *s != server.name) {
            continue;
        }
        let tools = sessions.tools_for(&server.name).await.unwrap_or_default();
        println!("=== {} ({} tools) ===", server.name, tools.len());
        for tool in tools {
            let desc = tool
                .description
                .as_deref()
                .unwrap_or("No description")
                .lines()
                .next()
                .unwrap_or("");
            println!("  {}__{} - {}", server.name, tool.name, desc);
        }
        println!();
    }

    Ok(())
}

async fn run_call_tool(
    sessions: &SessionManager,
    server: &str,
    tool: &str,
    args: Option<String>,
) -> Result<()> {
    let arguments = match args {
        Some(json) => serde_json::from_str(&json).context("--args must be a JSON object")?,
        None => serde_json::Value::Null,
    };

    println!("Calling tool: {}__{}", server, tool);
    if !arguments.is_null() {
        println!("Arguments: {}", serde_json::to_string_pretty(&arguments)?);
    }
    println!();

    let result = sessions.execute_tool(server, tool, arguments).await?;

    println!("Result:");
    println!("{}", result.content);
    if let Some(structured) = result.structured {
        println!("{}", serde_json::to_string_pretty(&structured)?);
    }

    Ok(())
}

async fn run_chat(
    orchestrator: &Orchestrator,
    settings: &ProviderSettings,
    message: Option<String>,
) -> Result<()> {
    let tools = orchestrator.config().servers.len();
    println!("Provider: {} ({})", settings.kind, settings.model);
    if tools > 0 {
        println!("Servers: {}", orchestrator.config().servers.join(", "));
    }
    println!();

    let system = ConversationMessage::system(&orchestrator.config().system_prompt);

    if let Some(msg) = message {
        stream_turn(orchestrator, vec![system, ConversationMessage::user(msg)]).await?;
        return Ok(());
    }

    use std::io::{self, BufRead};

    println!("Interactive mode. Type 'quit' to exit, 'clear' to reset history.");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut history = vec![system.clone()];

    loop {
        print!("hub> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }
        if input == "clear" {
            history = vec![system.clone()];
            println!("History cleared.\n");
            continue;
        }

        let mut turn = history.clone();
        turn.push(ConversationMessage::user(input));
        if let Some(summary) = stream_turn(orchestrator, turn).await? {
            history = summary.history;
        }
        println!();
    }

    Ok(())
}

/// Run one chat turn, printing events as they arrive
async fn stream_turn(
    orchestrator: &Orchestrator,
    history: Vec<ConversationMessage>,
) -> Result<Option<ChatSummary>> {
    let (sink, mut stream) = chat_channel(DEFAULT_CHANNEL_CAPACITY);
    let runner = orchestrator.clone();
    let task = tokio::spawn(async move { runner.run_conversation(history, &sink).await });

    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next_event().await {
        match event {
            ChatEvent::Token { content } => {
                print!("{}", content);
                stdout.flush()?;
            }
            ChatEvent::ToolStart { name, arguments } => {
                eprintln!("\n[tool] {} {}", name, arguments);
            }
            ChatEvent::ToolComplete {
                name,
                duration,
                is_error,
                ..
            } => {
                let outcome = if is_error { "failed" } else { "ok" };
                eprintln!("[{:>7}ms] {} {}", duration.as_millis(), name, outcome);
            }
            ChatEvent::Done { .. } => println!(),
            ChatEvent::Iteration { .. } | ChatEvent::Error { .. } => {}
        }
    }

    match task.await? {
        Ok(summary) => Ok(Some(summary)),
        Err(e) => {
            eprintln!("\nError: {}", e);
            Ok(None)
        }
    }
}
