//! Peer-Registry – Mitgliederverwaltung aller aktiven Peers
//!
//! Die Registry ist der einzige prozessweite veraenderliche Zustand: eine
//! Map von Peer-ID auf die beiden Queue-Enden des Peers, geschuetzt durch
//! einen einzelnen Mutex. Der Lock deckt ausschliesslich Map-Operationen
//! ab und wird nie ueber I/O oder Codec-Aufrufe gehalten; der Mixer
//! arbeitet auf einem Schnappschuss.
//!
//! ## Queues pro Peer
//! - **Ingress** (Session -> Mixer): beschraenkte PCM-Queue der Tiefe
//!   `jitter_tiefe`; `try_send` verwirft bei voller Queue (Audio ist
//!   latenzempfindlich, Verwerfen schlaegt Anstauen).
//! - **Egress** (Mixer -> Writer-Task): beschraenkte Queue kodierter
//!   Broadcast-Frames, ebenfalls mit Drop-on-Full.
//!
//! Zulaessiges Rennen: ein mitten im Tick entfernter Peer kann noch einen
//! letzten Broadcast in seine Egress-Queue erhalten; der `try_send` auf
//! die bereits geschlossene Queue schlaegt fehl und wird ignoriert.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use palaver_audio::FramePool;
use palaver_core::{PeerId, RelayError};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Tiefe der Egress-Queue pro Peer (kodierte Broadcast-Frames)
pub const EGRESS_QUEUE_TIEFE: usize = 16;

// ---------------------------------------------------------------------------
// Eintraege
// ---------------------------------------------------------------------------

/// Ergebnis einer erfolgreichen Aufnahme
///
/// Die Session behaelt das Producer-Ende der Ingress-Queue und das
/// Consumer-Ende der Egress-Queue; die Gegenseiten liegen in der Registry.
pub struct Aufnahme {
    /// Zugewiesene Peer-ID
    pub id: PeerId,
    /// Producer-Ende der Ingress-PCM-Queue (gehoert der Session)
    pub pcm_tx: mpsc::Sender<Vec<i16>>,
    /// Consumer-Ende der Egress-Queue (gehoert dem Writer-Task)
    pub sende_rx: mpsc::Receiver<Arc<Vec<u8>>>,
}

/// Schnappschuss-Eintrag fuer den Mixer
///
/// Haelt nur Queue-Enden; der Mixer iteriert darueber ohne den
/// Registry-Lock zu halten.
#[derive(Clone)]
pub struct PeerEintrag {
    /// Peer-ID
    pub id: PeerId,
    /// Consumer-Ende der Ingress-Queue (nur der Mixer entnimmt)
    pub pcm_rx: Arc<Mutex<mpsc::Receiver<Vec<i16>>>>,
    /// Producer-Ende der Egress-Queue (Broadcast)
    pub sende_tx: mpsc::Sender<Arc<Vec<u8>>>,
}

struct PeerHandle {
    pcm_rx: Arc<Mutex<mpsc::Receiver<Vec<i16>>>>,
    sende_tx: mpsc::Sender<Arc<Vec<u8>>>,
}

struct RegistryInner {
    peers: HashMap<PeerId, PeerHandle>,
    /// Monoton steigender ID-Zaehler; IDs werden nie wiederverwendet
    naechste_id: u32,
}

// ---------------------------------------------------------------------------
// PeerRegistry
// ---------------------------------------------------------------------------

/// Mitglieder-Registry aller aktiven Peers
///
/// Thread-safe und `Clone`-faehig (innerer Arc).
#[derive(Clone)]
pub struct PeerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
    pool: FramePool,
    max_clients: usize,
    jitter_tiefe: usize,
}

impl PeerRegistry {
    /// Erstellt eine neue leere Registry
    pub fn neu(max_clients: usize, jitter_tiefe: usize, pool: FramePool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                peers: HashMap::new(),
                naechste_id: 0,
            })),
            pool,
            max_clients,
            jitter_tiefe: jitter_tiefe.max(1),
        }
    }

    /// Nimmt einen neuen Peer auf
    ///
    /// Prueft das Client-Limit, vergibt die naechste ID und legt beide
    /// Queues an. Gibt [`RelayError::ServerVoll`] zurueck wenn das Limit
    /// erreicht ist; der Aufrufer schliesst die Verbindung ausserhalb
    /// des Locks.
    pub fn aufnehmen(&self) -> Result<Aufnahme, RelayError> {
        let mut inner = self.inner.lock();

        if inner.peers.len() >= self.max_clients {
            return Err(RelayError::ServerVoll {
                maximum: self.max_clients,
            });
        }

        // Greeting ist 1 Byte: IDs ueber 255 duerfen nie entstehen
        if inner.naechste_id >= u32::from(u8::MAX) {
            return Err(RelayError::IdentitaetenErschoepft);
        }

        inner.naechste_id += 1;
        let id = PeerId(inner.naechste_id as u8);

        let (pcm_tx, pcm_rx) = mpsc::channel(self.jitter_tiefe);
        let (sende_tx, sende_rx) = mpsc::channel(EGRESS_QUEUE_TIEFE);

        inner.peers.insert(
            id,
            PeerHandle {
                pcm_rx: Arc::new(Mutex::new(pcm_rx)),
                sende_tx,
            },
        );

        tracing::info!(peer = %id, peers = inner.peers.len(), "Peer aufgenommen");

        Ok(Aufnahme {
            id,
            pcm_tx,
            sende_rx,
        })
    }

    /// Entfernt einen Peer und leert seine Ingress-Queue
    ///
    /// Restliche PCM-Frames gehen zurueck in den Pool. Das Droppen des
    /// Egress-Senders beendet den Writer-Task des Peers, sobald auch der
    /// letzte Schnappschuss-Klon des Mixers verschwunden ist.
    pub fn entfernen(&self, id: PeerId) {
        let handle = self.inner.lock().peers.remove(&id);

        if let Some(handle) = handle {
            // Queue ausserhalb des Registry-Locks leeren
            let mut pcm_rx = handle.pcm_rx.lock();
            while let Ok(pcm) = pcm_rx.try_recv() {
                self.pool.pcm_zurueckgeben(pcm);
            }
            tracing::info!(peer = %id, "Peer entfernt");
        }
    }

    /// Kopiert alle Eintraege in eine lokale Liste
    ///
    /// Der Mixer iteriert ueber den Schnappschuss, damit der Lock nicht
    /// waehrend der Misch- und Broadcast-Arbeit gehalten wird.
    pub fn schnappschuss(&self) -> Vec<PeerEintrag> {
        self.inner
            .lock()
            .peers
            .iter()
            .map(|(&id, handle)| PeerEintrag {
                id,
                pcm_rx: Arc::clone(&handle.pcm_rx),
                sende_tx: handle.sende_tx.clone(),
            })
            .collect()
    }

    /// Gibt die Anzahl der registrierten Peers zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.lock().peers.len()
    }

    /// Prueft ob das Client-Limit erreicht ist
    pub fn ist_voll(&self) -> bool {
        self.anzahl() >= self.max_clients
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
