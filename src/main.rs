//! tty-relay CLI entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tty_relay::{SessionManager, Settings};

#[derive(Parser)]
#[command(name = "tty-relay")]
#[command(about = "Web-terminal multiplexer: PTY sessions fanned out over WebSocket")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay server.
    Serve {
        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on.
        #[arg(short, long, default_value_t = 57575)]
        port: u16,

        /// Shell to spawn when no per-session command override is given.
        #[arg(long)]
        shell: Option<String>,

        /// Global command override (e.g. "htop"), instead of a login shell.
        #[arg(long, default_value = "")]
        cmd: String,

        /// Session log directory.
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,

        /// Disable script(1)-compatible session logging.
        #[arg(long)]
        no_log: bool,

        /// Rolling history buffer size in bytes, per session.
        #[arg(long, default_value_t = 50_000)]
        history_size: usize,

        /// MOTD banner: "builtin", "none", or a path to a custom art file.
        #[arg(long, default_value = "builtin")]
        motd_art: String,

        /// Enable debug-level logging.
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        host: "127.0.0.1".to_string(),
        port: 57575,
        shell: None,
        cmd: String::new(),
        log_dir: PathBuf::from("logs"),
        no_log: false,
        history_size: 50_000,
        motd_art: "builtin".to_string(),
        debug: false,
    }) {
        Commands::Serve {
            host,
            port,
            shell,
            cmd,
            log_dir,
            no_log,
            history_size,
            motd_art,
            debug,
        } => {
            let filter = if debug { "debug" } else { "info" };
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
                )
                .init();

            let mut settings = Settings::default();
            settings.host = host;
            settings.port = port;
            if let Some(shell) = shell {
                settings.shell = shell;
            }
            settings.cmd = cmd;
            settings.log_dir = log_dir;
            settings.log_enabled = !no_log;
            settings.history_size = history_size;
            settings.motd_art = motd_art;
            settings.validate()?;

            run(settings).await
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let manager = SessionManager::new(settings);

    info!(%addr, "tty-relay starting");

    let app = tty_relay::server::router(manager.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let serve_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    manager.shutdown().await;
    info!("tty-relay stopped");

    serve_result.map_err(Into::into)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
