use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use draw_together_core::config::{Config, LoggingConfig};
use draw_together_core::protocol::ColorSpec;

mod draw;

#[derive(Parser)]
#[command(
    name = "draw-together",
    about = "Shared drawing board: a line relay and a participant client",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server
    Relay {
        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (default: 12345)
        #[arg(long)]
        port: Option<u16>,

        /// Serve GET /health on this port
        #[arg(long)]
        health_port: Option<u16>,
    },

    /// Join a drawing session; reads pointer commands from stdin
    Draw {
        /// Relay address as host:port (default: 127.0.0.1:12345)
        #[arg(short, long)]
        server: Option<String>,

        /// Initial ink color
        #[arg(long)]
        color: Option<String>,

        /// Initial stroke width
        #[arg(long)]
        width: Option<f64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version, config location, and endpoints
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Check the configuration for problems
    Validate,
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let mut directives = if verbose {
        "debug".to_string()
    } else {
        logging.level.clone().unwrap_or_else(|| "info".to_string())
    };
    for filter in &logging.filters {
        directives.push(',');
        directives.push_str(filter);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (logging.format.as_str(), logging.output.as_str()) {
        ("json", "stdout") => builder.json().with_writer(std::io::stdout).init(),
        ("json", _) => builder.json().with_writer(std::io::stderr).init(),
        (_, "stdout") => builder.with_writer(std::io::stdout).init(),
        _ => builder.with_writer(std::io::stderr).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    init_logging(&config.logging(), cli.verbose);

    let (warnings, errors) = config.validate();
    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    match cli.command {
        Commands::Relay {
            bind,
            port,
            health_port,
        } => {
            if !errors.is_empty() {
                anyhow::bail!("Invalid config: {}", errors.join("; "));
            }
            let mut relay = config.relay();
            if bind.is_some() {
                relay.bind = bind;
            }
            if let Some(port) = port {
                relay.port = port;
            }
            if health_port.is_some() {
                relay.health_port = health_port;
            }

            #[cfg(feature = "metrics")]
            draw_together_relay::metrics::install_prometheus_recorder();

            let addr = format!(
                "{}:{}",
                relay.bind.as_deref().unwrap_or("0.0.0.0"),
                relay.port
            );
            tracing::info!("Starting Draw Together relay on {addr}");
            let state = Arc::new(draw_together_relay::RelayState::new(relay));
            draw_together_relay::start_relay(state, &addr).await?;
        }
        Commands::Draw {
            server,
            color,
            width,
        } => {
            let server = server.unwrap_or_else(|| config.server_addr());
            let ink = match color {
                Some(spec) => ColorSpec::new(spec)?,
                None => config.ink(),
            };
            let width = width.unwrap_or_else(|| config.width());
            draw::run(&server, ink, width).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at {key}"),
            },
            ConfigAction::Validate => {
                for warning in &warnings {
                    println!("warning: {warning}");
                }
                for error in &errors {
                    println!("error: {error}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("{} config error(s)", errors.len());
                }
                println!("Config OK");
            }
        },
        Commands::Status => {
            println!("Draw Together v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Relay listens on: {}", config.relay_addr());
            println!("Clients dial: {}", config.server_addr());
            match config.relay().health_port {
                Some(port) => println!("Health endpoint port: {port}"),
                None => println!("Health endpoint: disabled"),
            }
        }
    }

    Ok(())
}
