//! Command-line interface

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::{self, Config};
use crate::tutor::RuleEngine;

#[derive(Parser)]
#[command(name = "lingua-coach", version, about = "Language-tutoring feedback and review scheduling service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Listen host (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Listen port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Configuration and credential management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the heuristic rules against a sentence and print the findings
    Analyze {
        /// The utterance to check
        text: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Store the model API key securely
    SetApiKey { key: String },
    /// Remove the stored model API key
    DeleteApiKey,
}

/// Parse arguments and dispatch
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let config = Config::load()?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            crate::server::start(&host, port, &config).await
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = Config::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
                println!(
                    "# model credential: {}",
                    if config::get_api_key().is_some() {
                        "configured"
                    } else {
                        "not configured (stub mode)"
                    }
                );
                Ok(())
            }
            ConfigAction::SetApiKey { key } => {
                config::set_api_key(&key)?;
                println!("API key stored securely.");
                Ok(())
            }
            ConfigAction::DeleteApiKey => {
                config::delete_api_key()?;
                println!("API key removed.");
                Ok(())
            }
        },
        Commands::Analyze { text } => {
            let findings = RuleEngine::new().analyze(&text, None);
            if findings.is_empty() {
                println!("No errors found.");
            } else {
                for finding in &findings {
                    println!(
                        "[{}] '{}' -> '{}': {}",
                        finding.kind, finding.original_text, finding.corrected_text,
                        finding.explanation
                    );
                }
                println!("{} finding(s).", findings.len());
            }
            Ok(())
        }
    }
}
