//! Polyroute HTTP server
//!
//! Starts the control API and routing surface, with the dynamic router
//! watching the config file for hot reloads.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use polyroute::cli::{Cli, Command};
use polyroute::config::store::ConfigStore;
use polyroute::dynamic::{DynamicRouter, DynamicRouterOptions};
use polyroute::handlers::{self, AppState};
use polyroute::telemetry;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(ConfigStore::default_path);

    let exit_code = match cli.command {
        Some(Command::Config { output }) => run_config_template(output),
        Some(Command::Status { endpoint, api_key }) => run_status(&endpoint, api_key).await,
        Some(Command::Serve) | None => run_serve(config_path).await,
    };

    std::process::exit(exit_code);
}

fn run_config_template(output: Option<String>) -> i32 {
    let template = polyroute::cli::generate_config_template();
    match output {
        None => {
            print!("{template}");
            0
        }
        Some(path) => match std::fs::write(&path, template) {
            Ok(()) => {
                println!("Template written to {path}");
                0
            }
            Err(e) => {
                eprintln!("Failed to write {path}: {e}");
                1
            }
        },
    }
}

async fn run_status(endpoint: &str, api_key: Option<String>) -> i32 {
    let url = format!("{}/config/status", endpoint.trim_end_matches('/'));
    let client = reqwest::Client::new();
    let mut request = client.get(&url);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            match response.text().await {
                Ok(body) => {
                    println!("{body}");
                    0
                }
                Err(e) => {
                    eprintln!("Failed to read response: {e}");
                    1
                }
            }
        }
        Ok(response) => {
            eprintln!("Service returned {}", response.status());
            1
        }
        Err(e) => {
            eprintln!("Service unreachable at {url}: {e}");
            1
        }
    }
}

async fn run_serve(config_path: PathBuf) -> i32 {
    let store = ConfigStore::new(config_path);

    let router =
        match DynamicRouter::initialize(store, None, DynamicRouterOptions::default()).await {
            Ok(router) => router,
            Err(e) => {
                eprintln!("Failed to initialize: {e}");
                return 1;
            }
        };

    let snapshot = router.snapshot();
    telemetry::init(&snapshot.config);

    let host = snapshot
        .config
        .host
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = snapshot.config.port.unwrap_or(3456);

    let ip_addr = match host.parse::<std::net::IpAddr>() {
        Ok(ip) => ip,
        Err(e) => {
            eprintln!(
                "Invalid HOST '{host}' in config: {e}. Expected format: 0.0.0.0 or 127.0.0.1"
            );
            return 1;
        }
    };
    let addr = SocketAddr::from((ip_addr, port));

    let state = AppState::new(Arc::clone(&router));
    let app = handlers::app(state);

    tracing::info!("Listening on {addr}");
    tracing::info!("Control API available at http://{addr}/config/status");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {addr}: {e}");
            return 1;
        }
    };

    match axum::serve(listener, app).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Server error: {e}");
            1
        }
    }
}
