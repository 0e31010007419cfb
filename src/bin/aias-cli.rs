use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "aias-cli")]
#[command(about = "Management CLI for the AIAS resilience gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "AIAS_ADMIN_API_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List every circuit breaker with its counters
    Circuits,
    /// Show one circuit breaker
    Circuit { name: String },
    /// Reset one circuit breaker, or all of them when no name is given
    Reset { name: Option<String> },
    /// Show rate limiter backends and local entry count
    RateLimit,
    /// Purge expired rate limit entries now
    Cleanup,
}

impl Commands {
    fn request(&self) -> (Method, String) {
        match self {
            Commands::Status => (Method::GET, "/admin/status".to_string()),
            Commands::Circuits => (Method::GET, "/admin/circuits".to_string()),
            Commands::Circuit { name } => (Method::GET, format!("/admin/circuits/{}", name)),
            Commands::Reset { name: Some(name) } => (Method::POST, format!("/admin/circuits/{}/reset", name)),
            Commands::Reset { name: None } => (Method::POST, "/admin/circuits/reset".to_string()),
            Commands::RateLimit => (Method::GET, "/admin/rate-limit".to_string()),
            Commands::Cleanup => (Method::POST, "/admin/rate-limit/cleanup".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path) = cli.command.request();
    let res = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
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
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
