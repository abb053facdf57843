use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use bc_backend::BridgeClient;
use bc_core::batch::run_batch;
use bc_core::config::Config;
use bc_core::logging::init_logging;
use bc_core::renderer::{RenderOptions, TranscriptRenderer};
use bc_core::repl::run_repl;
use bc_core::style::Style;
use clap::Parser;
use tracing::debug;

/// Terminal client for a tool-using chat agent.
#[derive(Debug, Parser)]
#[command(name = "bridgechat", version, about)]
struct Cli {
    /// Send one message and exit (batch mode). Piped stdin works too.
    message: Option<String>,

    /// Agent service URL (overrides config and BRIDGECHAT_URL).
    #[arg(long)]
    url: Option<String>,

    /// Read configuration from this file instead of the default location.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// List the agent's tools and exit.
    #[arg(long)]
    tools: bool,

    /// Check that the agent service is reachable and exit.
    #[arg(long)]
    health: bool,

    /// In batch mode, wait for the whole reply instead of streaming it.
    #[arg(long)]
    sync: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path).map_err(|e| e.to_string())?,
        None => Config::load_or_default(),
    };
    let mut config = config.with_env();
    if let Some(url) = &cli.url {
        config.backend.base_url = url.clone();
    }
    if cli.no_color {
        config.display.color = false;
    }
    Ok(config)
}

/// Message from the command line, or from stdin when it is a pipe.
fn batch_message(cli: &Cli) -> Option<String> {
    if let Some(message) = &cli.message {
        return Some(message.clone());
    }
    if io::stdin().is_terminal() {
        return None;
    }
    let mut buf = String::new();
    if io::stdin().read_to_string(&mut buf).is_ok() && !buf.trim().is_empty() {
        Some(buf.trim().to_string())
    } else {
        None
    }
}

async fn run(cli: Cli, config: Config) -> i32 {
    let client = match BridgeClient::with_options(config.backend.client_options()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        }
    };
    debug!(url = client.base_url(), "backend configured");

    if cli.health {
        return match client.health().await {
            Ok(()) => {
                println!("{} is up", client.base_url());
                0
            }
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        };
    }

    if cli.tools {
        return match client.list_tools().await {
            Ok(tools) => {
                let style = Style::new(config.display.color && io::stdout().is_terminal());
                let mut renderer = TranscriptRenderer::new(
                    io::stdout(),
                    style,
                    RenderOptions::from_display(&config.display),
                );
                renderer.emit_catalog(&tools);
                0
            }
            Err(e) => {
                eprintln!("error: {e}");
                1
            }
        };
    }

    if let Some(message) = batch_message(&cli) {
        return run_batch(&config, &client, &message, cli.sync).await;
    }

    match run_repl(&config, client).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.log.level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(run(cli, config));
    std::process::exit(code);
}
