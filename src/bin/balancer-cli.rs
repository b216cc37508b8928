use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "balancer-cli")]
#[command(about = "Management CLI for the machine balancer", long_about = None)]
struct Cli {
    /// Main listener (registration endpoints).
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    /// Admin listener (status endpoints).
    #[arg(short, long, default_value = "http://localhost:3100")]
    admin_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a machine
    Register {
        host: String,
        port: u16,
        #[arg(short, long, default_value_t = 100)]
        max_connections: usize,
    },
    /// Deregister a machine
    Deregister { host: String, port: u16 },
    /// List machines with load and breaker state
    Machines,
    /// Check balancer status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Register {
            host,
            port,
            max_connections,
        } => {
            let res = client
                .post(format!("{}/register", cli.url))
                .json(&json!({ "host": host, "port": port, "maxConnections": max_connections }))
                .send()
                .await?;
            print_text(res).await?;
        }
        Commands::Deregister { host, port } => {
            let res = client
                .post(format!("{}/deregister", cli.url))
                .json(&json!({ "host": host, "port": port }))
                .send()
                .await?;
            print_text(res).await?;
        }
        Commands::Machines => {
            let res = client
                .get(format!("{}/admin/machines", cli.admin_url))
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.admin_url))
                .send()
                .await?;
            print_json(res).await?;
        }
    }

    Ok(())
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if status.is_success() {
        println!("{}", text);
    } else {
        eprintln!("Error: balancer returned status {}", status);
        eprintln!("Response: {}", text);
    }
    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
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
