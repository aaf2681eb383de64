use clap::Parser;
use mysql_mcp_server::config::{parse_log_level, CliArgs, ConnectionConfig};
use mysql_mcp_server::server::McpServer;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Usage errors exit with status 2 here
    let args = CliArgs::parse();

    // stdout carries the protocol, so logs go to stderr
    let log_level = parse_log_level(std::env::var("LOG_LEVEL").ok().as_deref());
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = match ConnectionConfig::from_process(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.user_message());
            eprintln!("Provide user (-u), password (-P) and database (-d) via command line or MYSQL_USER, MYSQL_PASSWORD, MYSQL_DATABASE");
            std::process::exit(1);
        }
    };

    eprintln!("Starting MySQL MCP server with config:");
    eprintln!("Host: {}", config.host);
    eprintln!("Port: {}", config.port);
    eprintln!("User: {}", config.user);
    eprintln!("Database: {}", config.database);

    info!("Starting MySQL MCP server...");
    info!("Database config: {}/{} as {}", config.host, config.database, config.user);

    let server = McpServer::new(config);

    tokio::select! {
        result = server.serve_stdio() => {
            match result {
                Ok(()) => {
                    info!("Server stopped normally");
                    Ok(())
                }
                Err(e) => {
                    error!("Server error: {}", e.detailed_message());
                    Err(e.into())
                }
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server");
            Ok(())
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
