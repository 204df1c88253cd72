//! Memora service entry point.
//!
//! Binary name: `memora`
//!
//! Parses CLI arguments, loads configuration, wires the agent, then
//! starts the REST API server with graceful shutdown.

mod http;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use state::AppState;

#[derive(Parser)]
#[command(name = "memora", about = "Memory-augmented conversation agent service")]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Path to the configuration file
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,

        /// Export spans via OpenTelemetry (stdout exporter)
        #[arg(long)]
        otel: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "info,memora=debug,memora_core=debug,memora_infra=debug",
        _ => "trace",
    };

    match cli.command {
        Commands::Serve {
            host,
            port,
            config,
            otel,
        } => {
            memora_observe::tracing_setup::init_tracing(filter, otel)
                .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))?;

            let config = memora_infra::config::ServiceConfig::load(&config).await;
            let state = AppState::init(config).await?;
            let agent = Arc::clone(&state.agent);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Memora API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            // Drain background persistence before exiting.
            agent.close().await;
            memora_observe::tracing_setup::shutdown_tracing();

            println!("\n  Server stopped.");
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
