mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::DaemonClient;
use shared::ipc::{Command, Response};

#[derive(Parser)]
#[command(name = "uniagent")]
#[command(about = "CLI for the uniagent voice-command daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the voice session pipeline.
    Start,
    /// Stop the voice session pipeline.
    Stop,
    /// Activate listening without a wake word.
    Trigger,
    /// Cancel the current listening session.
    Cancel,
    /// Show daemon status.
    Status,
    /// Show the last dispatched intent.
    Intent,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = DaemonClient::new();

    let command = match cli.command {
        Commands::Start => Command::Start,
        Commands::Stop => Command::Stop,
        Commands::Trigger => Command::Trigger,
        Commands::Cancel => Command::Cancel,
        Commands::Status => Command::Status,
        Commands::Intent => Command::LastIntent,
    };

    match client.send_command(command).await {
        Ok(Response::Ok) => {
            println!("Success");
        }
        Ok(Response::Status(info)) => {
            println!("Status:");
            println!("  Running: {}", info.is_running);
            println!("  Mode: {}", info.mode);
            println!("  Engine available: {}", info.engine_available);
        }
        Ok(Response::Intent(Some(intent))) => {
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }
        Ok(Response::Intent(None)) => {
            println!("No intent dispatched yet");
        }
        Ok(Response::Error(msg)) => {
            eprintln!("Error: {}", msg);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to connect to uniagentd: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
