use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use crm_bridge::security::signature::compute_signature;

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Management CLI for the CRM bridge", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "BRIDGE_ADMIN_API_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check bridge status
    Status,
    /// Show rate-limit ceilings and live buckets
    Limits,
    /// Show replay store state
    Replay,
    /// Print signature headers for a webhook payload
    Sign {
        /// Shared webhook secret
        #[arg(long, env = "BRIDGE_WEBHOOK_SECRET")]
        secret: String,

        /// File holding the raw JSON body
        #[arg(long)]
        file: PathBuf,

        /// Unix timestamp to sign with (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let path = match cli.command {
        Commands::Status => "status",
        Commands::Limits => "limits",
        Commands::Replay => "replay",
        Commands::Sign {
            secret,
            file,
            timestamp,
        } => {
            let body = std::fs::read(&file)?;
            let timestamp = timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp())
                .to_string();
            let signature = compute_signature(secret.as_bytes(), &timestamp, &body);
            println!("X-Timestamp: {timestamp}");
            println!("X-Signature: sha256={signature}");
            return Ok(());
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = reqwest::Client::new()
        .get(format!("{}/admin/{path}", cli.url.trim_end_matches('/')))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
