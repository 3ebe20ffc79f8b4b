//! Command-line interface for Polyroute
//!
//! Provides argument parsing and subcommand handling for the Polyroute
//! binary. Control operations live on the HTTP API; the CLI only starts
//! the server, emits a config template, and checks a running instance.

use clap::{Parser, Subcommand};

/// Hot-reloadable request-routing gateway for LLM providers
#[derive(Parser)]
#[command(name = "polyroute")]
#[command(version)]
#[command(about = "Hot-reloadable request-routing gateway for LLM providers")]
#[command(
    long_about = "Polyroute routes chat requests from a coding-assistant client to \
    heterogeneous LLM providers, with live config reload, versioned history, \
    router groups, and automatic rollback on bad configs."
)]
pub struct Cli {
    /// Path to the configuration file (defaults to ~/.polyroute/config.json)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the gateway (the default when no subcommand is given)
    Serve,
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Query a running instance's /config/status
    Status {
        /// Base URL of the running instance
        #[arg(long, default_value = "http://127.0.0.1:3456")]
        endpoint: String,
        /// Bearer token for the control API
        #[arg(long)]
        api_key: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"{
  "Providers": [
    {
      "name": "openrouter",
      "api_base_url": "https://openrouter.ai/api/v1/chat/completions",
      "api_key": "your-openrouter-key-here",
      "models": [
        "anthropic/claude-sonnet-4",
        "google/gemini-2.5-pro"
      ]
    },
    {
      "name": "ollama",
      "api_base_url": "http://localhost:11434/v1/chat/completions",
      "api_key": "ollama-local-key",
      "models": [
        "qwen2.5-coder:latest"
      ]
    }
  ],
  "Router": {
    "default": "openrouter,anthropic/claude-sonnet-4",
    "background": "ollama,qwen2.5-coder:latest",
    "think": "openrouter,anthropic/claude-sonnet-4",
    "longContext": "openrouter,google/gemini-2.5-pro",
    "longContextThreshold": 60000
  },
  "APIKEY": "change-me-to-a-long-random-token",
  "HOST": "127.0.0.1",
  "PORT": 3456,
  "API_TIMEOUT_MS": 600000
}
"#
}
