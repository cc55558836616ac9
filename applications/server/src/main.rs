/// Resound Server - audio transcoding service
use clap::{Parser, Subcommand};
use resound_audio::FormatRegistry;
use resound_server::{api, config::ServerConfig, services::TranscodingService, state::AppState};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "resound-server")]
#[command(about = "Job-oriented audio transcoding service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Configuration file path
        #[arg(short, long, env = "RESOUND_CONFIG")]
        config: Option<PathBuf>,
    },
    /// List supported formats and codec availability
    Formats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resound_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            serve(config).await?;
        }
        Commands::Formats => {
            list_formats();
        }
    }

    Ok(())
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::load_from(config_path.as_deref())?;
    config.validate()?;

    tracing::info!("Starting Resound Server");
    tracing::info!("Host: {}", config.server.host);
    tracing::info!("Port: {}", config.server.port);

    let transcoding = Arc::new(TranscodingService::new(&config));
    let tasks = transcoding.start();

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let app_state = AppState::new(Arc::clone(&transcoding), Arc::new(config));
    let app = api::router(app_state);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down transcoding workers");
    transcoding.shutdown();
    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn list_formats() {
    let registry = FormatRegistry::new();

    println!("{:<6} {:<16} {:<8} {:<7} {:<7}", "TAG", "MIME", "LOSSLESS", "DECODE", "ENCODE");
    for format in registry.formats() {
        println!(
            "{:<6} {:<16} {:<8} {:<7} {:<7}",
            format.tag.extension(),
            format.mime_type,
            format.lossless,
            format.decode,
            format.encode
        );
    }
}
