use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use topology_watcher::topology::{flatten, parse_and_flatten};

#[derive(Parser)]
#[command(name = "watcher-cli")]
#[command(about = "Management CLI for the topology watcher", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8082")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show watcher state, store parameters and counters
    Status,
    /// Show the route spec of the last document the watcher read
    Routes,
    /// Flatten a local topology document without contacting the watcher
    Flatten {
        /// JSON topology document
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            if let Some(status) = fetch_status(&cli.url, &cli.key).await? {
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
        }
        Commands::Routes => {
            if let Some(status) = fetch_status(&cli.url, &cli.key).await? {
                let raw = &status["raw_topology"]["data"];
                if raw.is_null() {
                    eprintln!("The watcher has not read a topology document yet");
                    return Ok(());
                }
                let route_spec = flatten(raw)?;
                println!("{}", serde_json::to_string_pretty(&route_spec)?);
            }
        }
        Commands::Flatten { file } => {
            let content = std::fs::read(&file)?;
            let (_, route_spec) = parse_and_flatten(&content)?;
            println!("{}", serde_json::to_string_pretty(&route_spec)?);
        }
    }

    Ok(())
}

async fn fetch_status(url: &str, key: &str) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", key))?,
    );

    let res = client
        .get(format!("{}/admin/status", url))
        .headers(headers)
        .send()
        .await?;

    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(None);
    }

    Ok(Some(res.json().await?))
}
