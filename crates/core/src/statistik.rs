//! Relay-Statistiken – Zaehler fuer den laufenden Betrieb
//!
//! Alle Zaehler sind atomar und koennen lock-frei aus jedem Task erhoeht
//! werden. `schnappschuss()` liefert einen konsistent genug gelesenen
//! Momentanwert fuer Logs und Tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Momentaufnahme aller Relay-Zaehler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatistikSchnappschuss {
    /// Anzahl erfolgreich aufgenommener Peers seit Prozessstart
    pub peers_aufgenommen: u64,
    /// Dekodierte Frames, die wegen voller Ingress-Queue verworfen wurden
    pub ingress_verworfen: u64,
    /// Broadcast-Frames, die wegen voller Egress-Queue verworfen wurden
    pub egress_verworfen: u64,
    /// Anzahl Ticks, in denen mindestens ein Frame gemischt wurde
    pub ticks_gemischt: u64,
    /// Anzahl ausgesendeter Broadcast-Frames (ein Frame pro Tick)
    pub broadcasts: u64,
    /// Fehlgeschlagene Einzelframe-Dekodierungen
    pub decode_fehler: u64,
}

/// Gemeinsame Relay-Zaehler (thread-safe, via Arc geteilt)
#[derive(Clone, Default)]
pub struct RelayStatistik {
    inner: Arc<Zaehler>,
}

#[derive(Default)]
struct Zaehler {
    peers_aufgenommen: AtomicU64,
    ingress_verworfen: AtomicU64,
    egress_verworfen: AtomicU64,
    ticks_gemischt: AtomicU64,
    broadcasts: AtomicU64,
    decode_fehler: AtomicU64,
}

impl RelayStatistik {
    /// Erstellt neue, auf null stehende Zaehler
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn peer_aufgenommen(&self) {
        self.inner.peers_aufgenommen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ingress_verworfen(&self) {
        self.inner.ingress_verworfen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn egress_verworfen(&self) {
        self.inner.egress_verworfen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_gemischt(&self) {
        self.inner.ticks_gemischt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_gesendet(&self) {
        self.inner.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_fehlgeschlagen(&self) {
        self.inner.decode_fehler.fetch_add(1, Ordering::Relaxed);
    }

    /// Liest alle Zaehler als Momentaufnahme
    pub fn schnappschuss(&self) -> StatistikSchnappschuss {
        StatistikSchnappschuss {
            peers_aufgenommen: self.inner.peers_aufgenommen.load(Ordering::Relaxed),
            ingress_verworfen: self.inner.ingress_verworfen.load(Ordering::Relaxed),
            egress_verworfen: self.inner.egress_verworfen.load(Ordering::Relaxed),
            ticks_gemischt: self.inner.ticks_gemischt.load(Ordering::Relaxed),
            broadcasts: self.inner.broadcasts.load(Ordering::Relaxed),
            decode_fehler: self.inner.decode_fehler.load(Ordering::Relaxed),
        }
    }
}
