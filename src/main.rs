//! Session server over stdin/stdout
//!
//! This binary runs the session lifecycle core behind a newline-delimited
//! JSON transport: one `Input` object per line on stdin, one `Output` object
//! per line on stdout.
//!
//! Architecture:
//! - Main thread: Runs the dispatch loop that owns the session handler
//! - Background thread: Runs a tokio runtime with the async stdio transport
//! - Watchdog thread: Posts periodic cleanup commands

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ime_session::{
    dispatch, expand_path, run_dispatch_loop, Command, DispatchWorker, Engine, ErrorCode, Input,
    Output, ServerConfig, SessionError, SessionHandler, SessionWatchdog, SystemClock,
};
use std::sync::Arc;
use std::thread;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ime-session", version, about = "Input-method session server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Serve commands over stdin/stdout (default)
    Serve(ServeArgs),
    /// Print the effective configuration as JSON and exit
    PrintConfig(ServeArgs),
}

#[derive(Args, Default)]
struct ServeArgs {
    /// JSON file with a server configuration; flags override its values
    #[arg(long)]
    config: Option<String>,
    /// Shut down after the server has had no sessions for this many seconds
    #[arg(long)]
    timeout: Option<i64>,
    /// Maximum number of live sessions (2-128)
    #[arg(long)]
    max_session_size: Option<i64>,
    /// Minimum interval between session creations in seconds (0-10)
    #[arg(long)]
    create_session_min_interval: Option<i64>,
    /// Watchdog interval in seconds (1-3600)
    #[arg(long)]
    watch_dog_interval: Option<i64>,
    /// Remove sessions idle for this many seconds (10-7200)
    #[arg(long)]
    last_command_timeout: Option<i64>,
    /// Remove never-used sessions this many seconds after creation (1-600)
    #[arg(long)]
    last_create_session_timeout: Option<i64>,
    /// Launch with the restricted profile
    #[arg(long)]
    restricted: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging to stderr (stdout carries the protocol)
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ime_session=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Cmd::Serve(ServeArgs::default())) {
        Cmd::Serve(args) => run_server(load_config(&args)?),
        Cmd::PrintConfig(args) => {
            let config = load_config(&args)?;
            println!("{}", serde_json::to_string_pretty(&config.effective())?);
            Ok(())
        }
    }
}

fn load_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let path = expand_path(path);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => ServerConfig::default(),
    };

    if args.timeout.is_some() {
        config.timeout = args.timeout;
    }
    if let Some(v) = args.max_session_size {
        config.max_session_size = v;
    }
    if let Some(v) = args.create_session_min_interval {
        config.create_session_min_interval = v;
    }
    if let Some(v) = args.watch_dog_interval {
        config.watch_dog_interval = v;
    }
    if let Some(v) = args.last_command_timeout {
        config.last_command_timeout = v;
    }
    if let Some(v) = args.last_create_session_timeout {
        config.last_create_session_timeout = v;
    }
    config.restricted |= args.restricted;
    Ok(config)
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigquit = signal(SignalKind::quit())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = sigquit.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let effective = config.effective();
    info!(
        max_session_size = effective.max_session_size,
        watchdog_interval = effective.watchdog_interval,
        idle_shutdown_timeout = effective.idle_shutdown_timeout,
        restricted = effective.restricted,
        "Starting session server"
    );

    let (worker, rx) = dispatch::channel(dispatch::REQUEST_QUEUE_CAPACITY);
    let mut handler = SessionHandler::new(
        effective,
        Engine::local(Arc::new(SystemClock)),
        Arc::new(SystemClock),
    );
    if !handler.is_available() {
        anyhow::bail!("session handler failed to initialize");
    }

    let mut watchdog = SessionWatchdog::new(effective.watchdog_interval, worker.clone());
    handler.track_watchdog(watchdog.running_flag());
    watchdog.start().context("starting watchdog thread")?;

    // Wakes the transport on a signal, or once the dispatch loop has ended.
    let shutdown_notify = Arc::new(Notify::new());
    let notify_for_transport = shutdown_notify.clone();
    let worker_for_transport = worker.clone();
    let transport_handle = thread::Builder::new()
        .name("stdio-transport".to_string())
        .spawn(move || {
            let result = run_transport(worker_for_transport.clone(), notify_for_transport);
            if result.is_err() {
                // The transport died before it could stop the dispatch loop.
                if let Err(e) = worker_for_transport.shutdown_blocking() {
                    debug!(error = %e, "Dispatch loop already stopped");
                }
            }
            result
        })
        .context("spawning transport thread")?;
    drop(worker);

    info!("Starting dispatch loop");
    run_dispatch_loop(rx, handler);
    info!("Dispatch loop finished");

    watchdog.stop();
    shutdown_notify.notify_one();
    match transport_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Transport failed: {e:#}"),
        Err(e) => error!("Transport thread panicked: {:?}", e),
    }

    info!("Server stopped");
    Ok(())
}

fn run_transport(worker: DispatchWorker, shutdown_notify: Arc<Notify>) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;

    let result = rt.block_on(async move {
        let shutdown_signal = shutdown_notify.clone();
        tokio::spawn(async move {
            if wait_for_shutdown_signal().await.is_ok() {
                info!("Shutdown signal received");
                shutdown_signal.notify_one();
            } else {
                info!("Shutdown signal handler failed; server will continue running");
            }
        });

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        info!("Session server listening on stdio");

        loop {
            tokio::select! {
                _ = shutdown_notify.notified() => break,
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        info!("stdin closed");
                        break;
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let (output, available) = match serde_json::from_str::<Input>(&line) {
                        Ok(input) => match worker.dispatch(Command::new(input)).await {
                            Ok(dispatched) => (dispatched.command.output, dispatched.available),
                            Err(SessionError::WorkerClosed) => {
                                info!("Dispatch loop stopped, closing transport");
                                break;
                            }
                            Err(e) => return Err(e.into()),
                        },
                        Err(e) => {
                            warn!(error = %e, "Rejecting malformed input line");
                            let output = Output {
                                error_code: Some(ErrorCode::SessionFailure),
                                ..Output::default()
                            };
                            (output, true)
                        }
                    };

                    let mut encoded = serde_json::to_vec(&output)?;
                    encoded.push(b'\n');
                    stdout.write_all(&encoded).await?;
                    stdout.flush().await?;

                    if !available {
                        info!("Server is no longer available, closing transport");
                        break;
                    }
                }
            }
        }

        match worker.shutdown().await {
            Ok(()) | Err(SessionError::WorkerClosed) => Ok::<_, anyhow::Error>(()),
            Err(e) => Err(e.into()),
        }
    });
    // A pending stdin read would otherwise keep the runtime alive.
    rt.shutdown_background();
    result
}
