//! Hearth server binary

#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hearth_server::{ChatServer, ServerConfig};

#[derive(Parser)]
#[command(name = "hearth-server")]
#[command(about = "Self-hostable Hearth chat server", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat server
    Serve {
        /// Bind address, overriding the config file (host:port)
        #[arg(short, long)]
        addr: Option<String>,

        /// Configuration file (TOML)
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr, config } => {
            let mut config = match config {
                Some(path) => ServerConfig::load(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(addr) = addr {
                let (host, port) = addr
                    .rsplit_once(':')
                    .ok_or_else(|| anyhow::anyhow!("--addr must be host:port"))?;
                config.host = host.to_string();
                config.port = port.parse()?;
            }

            info!(
                version = env!("CARGO_PKG_VERSION"),
                addr = %config.bind_addr(),
                encryption_required = config.encryption.required,
                "starting hearth-server"
            );

            let server = ChatServer::new(config).await?;
            server.run().await
        }
    }
}
