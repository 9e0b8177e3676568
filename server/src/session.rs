//! Peer-Session – Verwaltet eine einzelne Peer-Verbindung
//!
//! Jede akzeptierte Verbindung bekommt eine `PeerSession` in einem eigenen
//! tokio-Task. Die State Machine:
//!
//! ```text
//! Accepted -> Authenticating -> Admitted (Greeting-Byte) -> Running
//!                 |                  |                        |
//!                 v                  v                        v
//!              Closed  <---- Fehler / EOF / Shutdown ---------+
//! ```
//!
//! Erst nach erfolgreicher Authentifizierung wird ein Registry-Slot belegt
//! und das Greeting-Byte gesendet: ein Peer mit falschem Passwort sieht
//! keine ID und verbraucht nie einen Slot.
//!
//! ## Fehlersemantik
//! - IO-Fehler und uebergrosse Pakete sind terminal fuer diese Session,
//!   andere Peers bleiben unberuehrt.
//! - Decode-Fehler betreffen nur den einzelnen Frame; die Session laeuft
//!   weiter.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use palaver_audio::{FramePool, OpusDecoder, MAX_PAKET_BYTES};
use palaver_core::{PeerId, RelayError, RelayStatistik};
use palaver_protocol::wire::{self, WireError, AUTH_MAX_LEN};

use crate::registry::PeerRegistry;

// ---------------------------------------------------------------------------
// Passwort-Digest
// ---------------------------------------------------------------------------

/// Bildet den SHA-256-Digest des konfigurierten Passworts
///
/// Verglichen werden ausschliesslich Digests: die Vergleichslaufzeit haengt
/// damit nicht von uebereinstimmenden Passwort-Praefixen ab.
pub fn passwort_digest(passwort: &str) -> [u8; 32] {
    Sha256::digest(passwort.as_bytes()).into()
}

// ---------------------------------------------------------------------------
// PeerSession
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Peer-Verbindung
///
/// Generisch ueber den Stream, damit Tests `tokio::io::duplex` statt echter
/// Sockets verwenden koennen.
pub struct PeerSession {
    registry: PeerRegistry,
    pool: FramePool,
    statistik: RelayStatistik,
    passwort_digest: [u8; 32],
    /// Kennung fuer Logs vor der ID-Vergabe (z.B. die Remote-Adresse)
    kennung: String,
}

impl PeerSession {
    /// Erstellt eine neue PeerSession
    pub fn neu(
        registry: PeerRegistry,
        pool: FramePool,
        statistik: RelayStatistik,
        passwort_digest: [u8; 32],
        kennung: String,
    ) -> Self {
        Self {
            registry,
            pool,
            statistik,
            passwort_digest,
            kennung,
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird, ein terminaler Fehler
    /// auftritt oder ein Shutdown-Signal eingeht. Beim Ende wird der Peer
    /// deregistriert und die Verbindung geschlossen (Drop der Haelften).
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut leser, mut schreiber) = tokio::io::split(stream);

        // --- Authentifizierung (vor jeder Slot-Vergabe) ---
        if let Err(e) = self.authentifizieren(&mut leser).await {
            tracing::info!(peer = %self.kennung, fehler = %e, "Peer abgewiesen");
            return;
        }

        // --- Aufnahme in die Registry ---
        let aufnahme = match self.registry.aufnehmen() {
            Ok(aufnahme) => aufnahme,
            Err(e) => {
                tracing::warn!(peer = %self.kennung, fehler = %e, "Aufnahme abgelehnt");
                return;
            }
        };
        let id = aufnahme.id;
        self.statistik.peer_aufgenommen();

        // --- Greeting: die 1-Byte-ID ---
        if let Err(e) = schreiber.write_all(&[id.inner()]).await {
            tracing::warn!(peer = %id, fehler = %e, "Greeting fehlgeschlagen");
            self.registry.entfernen(id);
            return;
        }

        tracing::info!(peer = %id, kennung = %self.kennung, "Peer authentifiziert und aufgenommen");

        // --- Writer-Task: Egress-Queue -> Verbindung ---
        let writer_task = tokio::spawn(sende_loop(schreiber, aufnahme.sende_rx, id));

        // --- Decode-Loop ---
        self.decode_loop(&mut leser, id, aufnahme.pcm_tx, &mut shutdown_rx)
            .await;

        // --- Cleanup ---
        self.registry.entfernen(id);
        // Writer sofort beenden; das Droppen der Schreibhaelfte schliesst
        // die Verbindung.
        writer_task.abort();
        tracing::info!(peer = %id, "Session beendet");
    }

    /// Liest und prueft den Authentifizierungs-Blob
    ///
    /// Laengen ueber [`AUTH_MAX_LEN`] sowie jeder IO-Fehler in dieser Phase
    /// zaehlen als fehlgeschlagene Authentifizierung.
    async fn authentifizieren<R>(&self, leser: &mut R) -> palaver_core::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut blob = Vec::new();
        wire::read_frame_into(leser, &mut blob, AUTH_MAX_LEN)
            .await
            .map_err(|e| RelayError::auth(e.to_string()))?;

        let digest: [u8; 32] = Sha256::digest(&blob).into();
        if digest != self.passwort_digest {
            return Err(RelayError::auth("Falsches Passwort"));
        }

        Ok(())
    }

    /// Liest Pakete, dekodiert sie und reicht PCM-Frames an den Mixer
    ///
    /// Terminal bei EOF, IO-Fehler, uebergrossem Paket oder Shutdown.
    async fn decode_loop<R>(
        &self,
        leser: &mut R,
        id: PeerId,
        pcm_tx: mpsc::Sender<Vec<i16>>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) where
        R: AsyncRead + Unpin,
    {
        // Jeder Peer hat seinen eigenen Decoder: Opus-Zustand ist
        // frameuebergreifend und darf nicht geteilt werden.
        let mut decoder = match OpusDecoder::new() {
            Ok(decoder) => decoder,
            Err(e) => {
                tracing::error!(peer = %id, fehler = %e, "Decoder nicht erstellbar");
                return;
            }
        };

        let mut paket = self.pool.paket_holen();

        loop {
            let laenge = tokio::select! {
                ergebnis = wire::read_frame_into(leser, &mut paket, MAX_PAKET_BYTES) => {
                    match ergebnis {
                        Ok(laenge) => laenge,
                        Err(WireError::FrameZuGross { laenge, maximum }) => {
                            tracing::error!(
                                peer = %id,
                                laenge,
                                maximum,
                                "Uebergrosses Paket – Session wird beendet"
                            );
                            break;
                        }
                        Err(WireError::Io(e)) => {
                            tracing::warn!(peer = %id, fehler = %e, "Peer getrennt");
                            break;
                        }
                    }
                }

                ergebnis = shutdown_rx.changed() => {
                    match ergebnis {
                        Ok(()) if !*shutdown_rx.borrow() => continue,
                        _ => {
                            tracing::debug!(peer = %id, "Shutdown – Session wird beendet");
                            break;
                        }
                    }
                }
            };

            // DTX-Skip: leere Frames sind legal
            if laenge == 0 {
                continue;
            }

            tracing::trace!(peer = %id, bytes = laenge, "Paket gelesen");

            let mut pcm = self.pool.pcm_holen();
            if let Err(e) = decoder.decode(&paket, &mut pcm) {
                self.statistik.decode_fehlgeschlagen();
                tracing::error!(peer = %id, fehler = %e, "Decode-Fehler – Frame verworfen");
                self.pool.pcm_zurueckgeben(pcm);
                continue;
            }

            // Nicht-blockierende Uebergabe an den Mixer
            match pcm_tx.try_send(pcm) {
                Ok(()) => {
                    tracing::trace!(peer = %id, "PCM-Frame an den Mixer uebergeben");
                }
                Err(mpsc::error::TrySendError::Full(pcm)) => {
                    self.pool.pcm_zurueckgeben(pcm);
                    self.statistik.ingress_verworfen();
                    tracing::warn!(peer = %id, "Ingress-Queue voll – Frame verworfen");
                }
                Err(mpsc::error::TrySendError::Closed(pcm)) => {
                    self.pool.pcm_zurueckgeben(pcm);
                    break;
                }
            }
        }

        self.pool.paket_zurueckgeben(paket);
    }
}

// ---------------------------------------------------------------------------
// Writer-Task (Egress)
// ---------------------------------------------------------------------------

/// Liest kodierte Broadcast-Frames aus der Egress-Queue und schreibt sie
/// als Wire-Frames auf die Verbindung
///
/// Endet wenn alle Sender gedroppt wurden (Peer entfernt) oder ein
/// Schreibfehler auftritt. Schreibfehler entfernen den Peer NICHT – das
/// uebernimmt die Ingest-Seite, deren Read dann ebenfalls fehlschlaegt.
async fn sende_loop<W>(mut schreiber: W, mut sende_rx: mpsc::Receiver<Arc<Vec<u8>>>, id: PeerId)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = sende_rx.recv().await {
        if let Err(e) = wire::write_frame(&mut schreiber, &frame).await {
            tracing::warn!(peer = %id, fehler = %e, "Broadcast-Schreibfehler");
            break;
        }
        tracing::trace!(peer = %id, bytes = frame.len(), "Broadcast-Frame gesendet");
    }
    tracing::debug!(peer = %id, "Writer-Task beendet");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_audio::{OpusEncoder, FRAME_SAMPLES};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, ReadHalf, WriteHalf};

    const PASSWORT: &str = "geheim";

    struct TestUmgebung {
        registry: PeerRegistry,
        pool: FramePool,
        statistik: RelayStatistik,
        shutdown_tx: watch::Sender<bool>,
    }

    fn umgebung(max_clients: usize, jitter_tiefe: usize) -> TestUmgebung {
        let pool = FramePool::neu();
        TestUmgebung {
            registry: PeerRegistry::neu(max_clients, jitter_tiefe, pool.clone()),
            pool,
            statistik: RelayStatistik::neu(),
            shutdown_tx: watch::channel(false).0,
        }
    }

    /// Startet eine Session auf einem Duplex-Paar und gibt die Client-Seite zurueck
    fn session_starten(
        env: &TestUmgebung,
    ) -> (
        ReadHalf<tokio::io::DuplexStream>,
        WriteHalf<tokio::io::DuplexStream>,
        tokio::task::JoinHandle<()>,
    ) {
        let (client, server_seite) = tokio::io::duplex(64 * 1024);
        let session = PeerSession::neu(
            env.registry.clone(),
            env.pool.clone(),
            env.statistik.clone(),
            passwort_digest(PASSWORT),
            "test".into(),
        );
        let task = tokio::spawn(session.verarbeiten(server_seite, env.shutdown_tx.subscribe()));
        let (leser, schreiber) = tokio::io::split(client);
        (leser, schreiber, task)
    }

    /// Kodiert einen hoerbaren Sinuston als Opus-Paket
    fn opus_frame() -> Vec<u8> {
        let mut encoder = OpusEncoder::new(12).unwrap();
        let pcm: Vec<i16> = (0..FRAME_SAMPLES)
            .map(|i| {
                let t = i as f32 / 48_000.0;
                ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 8000.0) as i16
            })
            .collect();
        let mut paket = vec![0u8; MAX_PAKET_BYTES];
        let n = encoder.encode(&pcm, &mut paket).unwrap();
        paket.truncate(n);
        paket
    }

    /// Wartet bis die Bedingung erfuellt ist (maximal ~2 Sekunden)
    async fn warten_bis(bedingung: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if bedingung() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        bedingung()
    }

    #[tokio::test]
    async fn korrektes_passwort_wird_aufgenommen() {
        let env = umgebung(4, 4);
        let (mut leser, mut schreiber, task) = session_starten(&env);

        wire::write_frame(&mut schreiber, PASSWORT.as_bytes())
            .await
            .unwrap();

        // Greeting-Byte: erste ID ist 1
        let mut greeting = [0u8; 1];
        leser.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting[0], 1);
        assert_eq!(env.registry.anzahl(), 1);
        assert_eq!(env.statistik.schnappschuss().peers_aufgenommen, 1);

        // Client trennt -> Session deregistriert
        drop(schreiber);
        drop(leser);
        task.await.unwrap();
        assert_eq!(env.registry.anzahl(), 0);
    }

    #[tokio::test]
    async fn falsches_passwort_wird_abgewiesen() {
        let env = umgebung(4, 4);
        let (mut leser, mut schreiber, task) = session_starten(&env);

        wire::write_frame(&mut schreiber, b"falsch").await.unwrap();

        // Kein Greeting: die Verbindung wird kommentarlos geschlossen
        let mut byte = [0u8; 1];
        let gelesen = leser.read(&mut byte).await.unwrap();
        assert_eq!(gelesen, 0, "Abgewiesener Peer darf kein Greeting-Byte sehen");

        task.await.unwrap();
        assert_eq!(env.registry.anzahl(), 0, "Kein Slot darf belegt sein");
        assert_eq!(env.statistik.schnappschuss().peers_aufgenommen, 0);
    }

    #[tokio::test]
    async fn zu_langer_auth_blob_wird_abgewiesen() {
        let env = umgebung(4, 4);
        let (mut leser, mut schreiber, task) = session_starten(&env);

        // 33 Bytes ueberschreiten AUTH_MAX_LEN
        wire::write_frame(&mut schreiber, &[b'x'; AUTH_MAX_LEN + 1])
            .await
            .unwrap();

        let mut byte = [0u8; 1];
        let gelesen = leser.read(&mut byte).await.unwrap();
        assert_eq!(gelesen, 0);

        task.await.unwrap();
        assert_eq!(env.registry.anzahl(), 0);
    }

    #[tokio::test]
    async fn uebergrosses_paket_beendet_session() {
        let env = umgebung(4, 4);
        let (mut leser, mut schreiber, task) = session_starten(&env);

        wire::write_frame(&mut schreiber, PASSWORT.as_bytes())
            .await
            .unwrap();
        let mut greeting = [0u8; 1];
        leser.read_exact(&mut greeting).await.unwrap();

        // Laengen-Feld kuendigt 4001 Bytes an
        schreiber.write_all(&4001u32.to_be_bytes()).await.unwrap();

        task.await.unwrap();
        assert_eq!(env.registry.anzahl(), 0, "Session muss deregistriert sein");
    }

    #[tokio::test]
    async fn decode_fehler_ist_nicht_fatal() {
        let env = umgebung(4, 4);
        let (mut leser, mut schreiber, _task) = session_starten(&env);

        wire::write_frame(&mut schreiber, PASSWORT.as_bytes())
            .await
            .unwrap();
        let mut greeting = [0u8; 1];
        leser.read_exact(&mut greeting).await.unwrap();

        // Ungueltiges Opus-Paket (TOC-Code 3 ohne Frame-Count-Byte)
        wire::write_frame(&mut schreiber, &[0xFF]).await.unwrap();
        // Danach ein gueltiges Paket
        wire::write_frame(&mut schreiber, &opus_frame()).await.unwrap();

        let stats = env.statistik.clone();
        assert!(
            warten_bis(|| stats.schnappschuss().decode_fehler == 1).await,
            "Decode-Fehler muss gezaehlt werden"
        );

        // Das gueltige Paket kam trotzdem beim Mixer an
        let eintraege = env.registry.schnappschuss();
        assert_eq!(eintraege.len(), 1, "Session muss weiterlaufen");
        let registry = env.registry.clone();
        assert!(
            warten_bis(move || {
                registry.schnappschuss()[0].pcm_rx.lock().try_recv().is_ok()
            })
            .await,
            "Gueltiger Frame muss in der Ingress-Queue landen"
        );
    }

    #[tokio::test]
    async fn volle_ingress_queue_verwirft_statt_zu_blockieren() {
        let env = umgebung(4, 2);
        let (mut leser, mut schreiber, _task) = session_starten(&env);

        wire::write_frame(&mut schreiber, PASSWORT.as_bytes())
            .await
            .unwrap();
        let mut greeting = [0u8; 1];
        leser.read_exact(&mut greeting).await.unwrap();

        // 5 Frames ohne Konsumenten: Tiefe 2 -> 3 muessen verworfen werden
        let frame = opus_frame();
        for _ in 0..5 {
            wire::write_frame(&mut schreiber, &frame).await.unwrap();
        }

        let stats = env.statistik.clone();
        assert!(
            warten_bis(|| stats.schnappschuss().ingress_verworfen == 3).await,
            "Ueberzaehlige Frames muessen verworfen werden"
        );
    }

    #[tokio::test]
    async fn leere_frames_werden_uebersprungen() {
        let env = umgebung(4, 4);
        let (mut leser, mut schreiber, _task) = session_starten(&env);

        wire::write_frame(&mut schreiber, PASSWORT.as_bytes())
            .await
            .unwrap();
        let mut greeting = [0u8; 1];
        leser.read_exact(&mut greeting).await.unwrap();

        // DTX-Sentinel, dann ein echter Frame
        wire::write_frame(&mut schreiber, &[]).await.unwrap();
        wire::write_frame(&mut schreiber, &opus_frame()).await.unwrap();

        let registry = env.registry.clone();
        assert!(
            warten_bis(move || {
                let eintraege = registry.schnappschuss();
                !eintraege.is_empty() && eintraege[0].pcm_rx.lock().try_recv().is_ok()
            })
            .await,
            "Nur der echte Frame darf ankommen"
        );
        assert_eq!(env.statistik.schnappschuss().decode_fehler, 0);
    }

    #[tokio::test]
    async fn shutdown_beendet_session() {
        let env = umgebung(4, 4);
        let (mut leser, mut schreiber, task) = session_starten(&env);

        wire::write_frame(&mut schreiber, PASSWORT.as_bytes())
            .await
            .unwrap();
        let mut greeting = [0u8; 1];
        leser.read_exact(&mut greeting).await.unwrap();
        assert_eq!(env.registry.anzahl(), 1);

        env.shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(env.registry.anzahl(), 0);
    }
}
