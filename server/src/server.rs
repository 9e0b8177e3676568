//! RelayServer – TCP-Listener und Lebenszyklus
//!
//! Bindet den TCP-Socket, startet den Mixer-Task und akzeptiert
//! Verbindungen in einer Loop. Jede Verbindung bekommt eine eigene
//! [`PeerSession`] in einem tokio-Task.
//!
//! ## Shutdown
//! Ein `watch`-Kanal traegt das Shutdown-Signal an alle Tasks:
//! die Accept-Loop stoppt, der Mixer beendet seine Tick-Loop, Sessions
//! deregistrieren sich und schliessen ihre Verbindungen.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;

use palaver_audio::FramePool;
use palaver_core::RelayStatistik;

use crate::config::ServerConfig;
use crate::mixer::Mixer;
use crate::registry::PeerRegistry;
use crate::session::{passwort_digest, PeerSession};

/// Haelt den laufenden Server-Zustand zusammen
pub struct RelayServer {
    config: ServerConfig,
    listener: TcpListener,
    registry: PeerRegistry,
    pool: FramePool,
    statistik: RelayStatistik,
    passwort_digest: [u8; 32],
}

impl RelayServer {
    /// Bindet den TCP-Socket und erstellt den Server
    ///
    /// Ein Bind-Fehler ist der einzige fatale Startfehler neben der
    /// Konfiguration.
    pub async fn binden(config: ServerConfig, passwort: &str) -> Result<Self> {
        let adresse = config.tcp_bind_adresse();
        let listener = TcpListener::bind(&adresse)
            .await
            .with_context(|| format!("Port-Bindung fehlgeschlagen ({adresse})"))?;

        let pool = FramePool::neu();
        let registry = PeerRegistry::neu(
            config.server.max_clients,
            config.audio.jitter_tiefe,
            pool.clone(),
        );

        Ok(Self {
            passwort_digest: passwort_digest(passwort),
            config,
            listener,
            registry,
            pool,
            statistik: RelayStatistik::neu(),
        })
    }

    /// Gibt die lokale Bind-Adresse zurueck (Port 0 wird vom OS aufgeloest)
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Gibt die Relay-Zaehler zurueck
    pub fn statistik(&self) -> RelayStatistik {
        self.statistik.clone()
    }

    /// Startet Mixer und Accept-Loop; laeuft bis zum Shutdown-Signal
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %self.lokale_adresse()?,
            max_clients = self.config.server.max_clients,
            "Relay-Server gestartet"
        );

        // --- Mixer-Task ---
        let mixer = Mixer::neu(
            self.registry.clone(),
            self.pool.clone(),
            self.statistik.clone(),
            self.config.audio.bitrate_kbps,
        )
        .map_err(|e| anyhow::anyhow!("Mixer-Encoder nicht erstellbar: {e}"))?;
        let mixer_task = tokio::spawn(mixer.tick_loop_starten(shutdown_rx.clone()));

        // --- Accept-Loop ---
        self.accept_loop(shutdown_rx).await;

        // --- Shutdown: Mixer innerhalb der Gnadenfrist abwarten ---
        if tokio::time::timeout(Duration::from_secs(1), mixer_task)
            .await
            .is_err()
        {
            tracing::warn!("Mixer hat die Gnadenfrist ueberschritten");
        }

        tracing::info!(
            statistik = ?self.statistik.schnappschuss(),
            "Relay-Server gestoppt"
        );
        Ok(())
    }

    /// Akzeptiert Verbindungen bis zum Shutdown-Signal
    async fn accept_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                ergebnis = self.listener.accept() => {
                    match ergebnis {
                        Ok((stream, peer_addr)) => self.verbindung_annehmen(stream, peer_addr, &shutdown_rx),
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            // Kurze Pause um Busy-Loop bei persistentem Fehler zu vermeiden
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                ergebnis = shutdown_rx.changed() => {
                    match ergebnis {
                        Ok(()) if !*shutdown_rx.borrow() => {}
                        _ => {
                            tracing::info!("Shutdown-Signal – Accept-Loop stoppt");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Prueft das Client-Limit und startet die Session
    ///
    /// Die autoritative Limit-Pruefung passiert bei der Aufnahme nach der
    /// Authentifizierung; der Schnellpfad hier lehnt Verbindungen ohne
    /// Lese-Arbeit ab, wenn der Server bereits voll ist.
    fn verbindung_annehmen(
        &self,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
        shutdown_rx: &watch::Receiver<bool>,
    ) {
        if self.registry.ist_voll() {
            tracing::warn!(
                peer = %peer_addr,
                maximum = self.config.server.max_clients,
                "Server voll – Verbindung abgelehnt"
            );
            drop(stream);
            return;
        }

        tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

        let session = PeerSession::neu(
            self.registry.clone(),
            self.pool.clone(),
            self.statistik.clone(),
            self.passwort_digest,
            peer_addr.to_string(),
        );
        tokio::spawn(session.verarbeiten(stream, shutdown_rx.clone()));
    }
}
