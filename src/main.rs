mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ragent::config::RagentConfig;

#[derive(Parser)]
#[command(name = "ragent", version, about = "Retrieval-augmented, tool-calling agent")]
struct Cli {
    /// Config file (defaults to ~/.ragent/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a task using the knowledge base, the model and the configured tools
    Ask {
        task: String,
        /// Also write the answer to this markdown file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Embed the knowledge directory into the vector store
    Ingest {
        /// Directory to scan (defaults to retrieval.knowledge_dir)
        dir: Option<PathBuf>,
    },
    /// Search the knowledge base
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// List tools offered by the configured tool servers
    Tools,
    /// Start the knowledge-base MCP server
    Serve {
        /// Serve streamable HTTP on server.host:server.port instead of stdio
        #[arg(long)]
        http: bool,
    },
    /// Check the embedding service, tool servers and vector store
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RagentConfig::load_from(path)?,
        None => RagentConfig::load()?,
    };

    // Log to stderr so stdout stays clean for MCP JSON-RPC and answers.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Ask { task, output } => cli::ask::ask(&config, &task, output).await?,
        Command::Ingest { dir } => cli::ingest::ingest(&config, dir).await?,
        Command::Search { query, top_k } => cli::search::search(&config, &query, top_k).await?,
        Command::Tools => cli::tools::list(&config).await?,
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                ragent::server::serve_http(config).await?;
            } else {
                ragent::server::serve_stdio(config).await?;
            }
        }
        Command::Doctor => cli::doctor::doctor(&config).await?,
    }

    Ok(())
}
