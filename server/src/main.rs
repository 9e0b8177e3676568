//! Palaver Relay – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging, verdrahtet das
//! Shutdown-Signal und startet den Server.

use anyhow::{bail, Result};
use clap::Parser;

use palaver_server::{config::ServerConfig, RelayServer};

/// Mehrparteien-Audiokonferenz-Relay
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Gemeinsames Passwort fuer alle Peers (ueberschreibt die Konfigurationsdatei)
    #[arg(long)]
    password: Option<String>,

    /// Pfad zur Konfigurationsdatei
    #[arg(long, env = "PALAVER_CONFIG", default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&cli.config)?;

    // Logging initialisieren
    logging_initialisieren(&config.logging.level, &config.logging.format);

    // Passwort: CLI-Flag schlaegt Konfigurationsdatei
    let passwort = cli
        .password
        .or_else(|| config.server.passwort.clone())
        .unwrap_or_default();
    if passwort.is_empty() {
        bail!("Passwort erforderlich; --password=<geheim> oder [server].passwort setzen");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config,
        "Palaver Relay wird initialisiert"
    );

    // Shutdown-Signal (SIGINT/SIGTERM) -> watch-Kanal
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal_abwarten().await;
        tracing::info!("Shutdown-Signal empfangen");
        let _ = shutdown_tx.send(true);
    });

    // Server binden und laufen lassen
    let server = RelayServer::binden(config, &passwort).await?;
    server.starten(shutdown_rx).await?;

    Ok(())
}

/// Wartet auf SIGINT (Ctrl-C) oder SIGTERM
async fn shutdown_signal_abwarten() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(fehler = %e, "SIGTERM-Handler nicht verfuegbar");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
