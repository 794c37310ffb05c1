//! Historical Alpaca WebSocket Endpoint Binary
//!
//! Replays one CSV file of minute bars to every client that completes the
//! Alpaca handshake on `wss://127.0.0.1:8765`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin historical_alpaca_ws_endpoint -- bars.csv --delay 0.25
//! ```
//!
//! # Environment Variables
//!
//! - `REPLAY_CSV_PATH`: CSV bar input (instead of the positional argument)
//! - `REPLAY_DELAY_SECS`: Pause after each bar (default: 1.0)
//! - `REPLAY_CERT_DIR`: Directory for `server.key` / `server.crt` (default: .)
//! - `REPLAY_CERT_GENERATOR`: openssl | rcgen (default: openssl)
//! - `REPLAY_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 0)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `RUST_LOG`: Log level (default: info)
//!
//! # Signals
//!
//! - SIGTERM: stop accepting, close running sessions with `1001`, wait for
//!   them, exit 0
//! - SIGINT / Ctrl+C: exit 0 immediately (also during a SIGTERM drain)
//!
//! The generated certificate files are removed on every exit path. An
//! interrupt during certificate generation kills the generator first.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use historical_alpaca_ws_endpoint::infrastructure::health::{HealthServer, HealthServerState};
use historical_alpaca_ws_endpoint::infrastructure::telemetry;
use historical_alpaca_ws_endpoint::{
    BarSource, CertificateMaterial, CertificateProvisioner, Cli, CsvBarSource, EndpointConfig,
    EndpointError, ReplayServer, SessionStats, generator_for, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _telemetry_guard = telemetry::init();
    let _metrics_handle = init_metrics();

    tracing::info!("Starting historical Alpaca endpoint");
    log_config(&config);

    // Owns the certificate files from here on; dropping it removes them.
    let material = config.certificates.material();
    let shutdown = CancellationToken::new();
    let interrupt = CancellationToken::new();

    tokio::spawn(watch_signals(shutdown.clone(), interrupt.clone()));

    // Dropping `run` on interrupt also drops a pending certificate
    // generator, which kills its child process before teardown.
    let result = tokio::select! {
        biased;
        () = interrupt.cancelled() => {
            tracing::info!("Interrupted, exiting");
            Ok(())
        }
        result = run(config, &material, shutdown) => result,
    };
    material.teardown();

    match result {
        Ok(()) => {
            tracing::info!("Endpoint stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Load bars, provision TLS, then serve until the shutdown token fires.
async fn run(
    config: EndpointConfig,
    material: &CertificateMaterial,
    shutdown: CancellationToken,
) -> Result<(), EndpointError> {
    let bars = CsvBarSource::new(config.csv_path.clone()).load()?;
    let Some(symbol) = bars.symbol().map(str::to_string) else {
        return Err(EndpointError::NoBars);
    };
    let bar_count = bars.len();

    let provisioner = CertificateProvisioner::new(generator_for(&config.certificates));
    let acceptor = provisioner.ensure(material).await?;

    let stats = Arc::new(SessionStats::new());
    let server = ReplayServer::bind(
        &config.server,
        acceptor,
        bars,
        Arc::clone(&stats),
        shutdown.clone(),
    )
    .await?;

    // Outlives the session drain so /health can report "draining".
    let health_cancel = CancellationToken::new();
    let health_task = config.health_addr().map(|addr| {
        let state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            symbol,
            bar_count,
            Arc::clone(&stats),
            shutdown.clone(),
        ));
        let health_server = HealthServer::new(addr, state, health_cancel.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        })
    });

    tracing::info!("Endpoint ready");
    let served = server.run().await;

    health_cancel.cancel();
    if let Some(task) = health_task {
        let _ = task.await;
    }

    served?;
    Ok(())
}

/// SIGTERM starts a graceful drain; SIGINT, including one received during
/// the drain, cancels `interrupt` so `main` stops at once.
#[allow(clippy::expect_used)]
async fn watch_signals(shutdown: CancellationToken, interrupt: CancellationToken) {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("SIGTERM handler installation is critical for graceful shutdown");

    #[cfg(unix)]
    let terminated = async {
        terminate.recv().await;
    };

    #[cfg(not(unix))]
    let terminated = std::future::pending::<()>();

    tokio::select! {
        () = interrupted() => {
            tracing::info!("Received Ctrl+C");
            interrupt.cancel();
            return;
        }
        () = terminated => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
            shutdown.cancel();
        }
    }

    interrupted().await;
    tracing::warn!("Received Ctrl+C during shutdown");
    interrupt.cancel();
}

#[allow(clippy::expect_used)]
async fn interrupted() {
    signal::ctrl_c()
        .await
        .expect("signal handler installation is critical for shutdown");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &EndpointConfig) {
    tracing::info!(
        csv = %config.csv_path.display(),
        addr = %config.server.listen_addr,
        delay = ?config.server.delay,
        cert_dir = %config.certificates.dir.display(),
        cert_generator = config.certificates.generator.as_str(),
        health_port = config.health_port,
        "Configuration loaded"
    );
}
