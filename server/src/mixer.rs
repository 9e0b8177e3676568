//! Mixer – Periodischer Misch-Tick mit Broadcast
//!
//! Laeuft als einzelner dedizierter Task mit fester Periode von 20 ms
//! (eine Frame-Dauer). Jeder Tick:
//!
//! 1. Akkumulator nullen
//! 2. Registry-Schnappschuss ziehen (Lock nur fuer die Kopie)
//! 3. Pro Peer hoechstens einen PCM-Frame nicht-blockierend entnehmen
//!    und aufsummieren; entnommene Puffer zurueck in den Pool
//! 4. Skip-Regeln: keine aktiven Frames oder weniger als zwei Peers
//! 5. Mix klemmen, kodieren; leere Encoder-Ausgabe (DTX) ueberspringen
//! 6. Broadcast per `try_send` in jede Egress-Queue (Drop-on-Full)
//!
//! Der Tick selbst ist synchron und enthaelt kein I/O: der Mixer blockiert
//! nie auf einer Peer-Verbindung. Jeder Peer erhaelt den vollen Mix,
//! einschliesslich des eigenen Beitrags (Echo-Unterdrueckung ist
//! Client-Sache).

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use palaver_audio::{
    akku_abschliessen, frame_mischen, AudioResult, FramePool, OpusEncoder, FRAME_DAUER,
    FRAME_SAMPLES, MAX_PAKET_BYTES,
};
use palaver_core::RelayStatistik;

use crate::registry::PeerRegistry;

/// Mischt pro Tick die anliegenden PCM-Frames und sendet den kodierten
/// Mix an alle registrierten Peers
///
/// Besitzt exklusiv: einen Encoder-Zustand, den i32-Akkumulator, den
/// i16-Mix-Frame und den wiederverwendeten Encode-Ausgabepuffer.
pub struct Mixer {
    registry: PeerRegistry,
    pool: FramePool,
    statistik: RelayStatistik,
    encoder: OpusEncoder,
    akku: Vec<i32>,
    mix_frame: Vec<i16>,
    paket_buf: Vec<u8>,
}

impl Mixer {
    /// Erstellt einen neuen Mixer mit eigenem Encoder
    pub fn neu(
        registry: PeerRegistry,
        pool: FramePool,
        statistik: RelayStatistik,
        bitrate_kbps: u32,
    ) -> AudioResult<Self> {
        Ok(Self {
            registry,
            pool,
            statistik,
            encoder: OpusEncoder::new(bitrate_kbps)?,
            akku: vec![0i32; FRAME_SAMPLES],
            mix_frame: vec![0i16; FRAME_SAMPLES],
            paket_buf: vec![0u8; MAX_PAKET_BYTES],
        })
    }

    /// Startet die Tick-Loop (laeuft bis zum Shutdown-Signal)
    pub async fn tick_loop_starten(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut intervall = tokio::time::interval(FRAME_DAUER);
        // Verpasste Ticks nicht nachholen: Echtzeit-Audio kennt kein
        // sinnvolles Aufholen
        intervall.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            periode_ms = FRAME_DAUER.as_millis() as u64,
            bitrate_kbps = self.encoder.bitrate_kbps(),
            "Mixer gestartet"
        );

        loop {
            tokio::select! {
                _ = intervall.tick() => self.tick(),

                ergebnis = shutdown_rx.changed() => {
                    match ergebnis {
                        Ok(()) if !*shutdown_rx.borrow() => {}
                        _ => break,
                    }
                }
            }
        }

        tracing::info!("Mixer beendet");
    }

    /// Fuehrt einen einzelnen Misch-Tick aus
    fn tick(&mut self) {
        self.akku.fill(0);

        let eintraege = self.registry.schnappschuss();

        // Pro Peer hoechstens ein Frame, nicht-blockierend
        let mut aktive = 0usize;
        for eintrag in &eintraege {
            let entnommen = eintrag.pcm_rx.lock().try_recv();
            if let Ok(pcm) = entnommen {
                frame_mischen(&mut self.akku, &pcm);
                self.pool.pcm_zurueckgeben(pcm);
                aktive += 1;
            }
        }

        // Skip-Regeln: nichts anliegend, oder ein Peer allein hoert nichts
        if aktive == 0 || eintraege.len() < 2 {
            return;
        }
        self.statistik.tick_gemischt();

        akku_abschliessen(&self.akku, &mut self.mix_frame);

        let bytes = match self.encoder.encode(&self.mix_frame, &mut self.paket_buf) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(fehler = %e, "Encode-Fehler – Tick uebersprungen");
                return;
            }
        };

        // DTX: Stille wird nicht ausgesendet
        if bytes == 0 {
            tracing::trace!("DTX-Stille – kein Broadcast");
            return;
        }

        // Ein Frame, per Arc an alle Egress-Queues (kein Memcpy pro Peer)
        let frame = Arc::new(self.paket_buf[..bytes].to_vec());
        for eintrag in &eintraege {
            match eintrag.sende_tx.try_send(Arc::clone(&frame)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.statistik.egress_verworfen();
                    tracing::warn!(peer = %eintrag.id, "Egress-Queue voll – Broadcast verworfen");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(peer = %eintrag.id, "Egress-Queue geschlossen (Peer getrennt)");
                }
            }
        }
        self.statistik.broadcast_gesendet();

        tracing::trace!(
            aktive,
            peers = eintraege.len(),
            bytes,
            "Mix ausgesendet"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
