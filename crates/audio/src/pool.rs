//! Frame-Pool – Wiederverwendbare PCM- und Paketpuffer
//!
//! Dekodierte PCM-Frames entstehen mit bis zu `MaxClients * 50` pro Sekunde
//! und werden im gleichen Takt wieder verworfen. Der Pool vermeidet die
//! Allokations-Churn im eingeschwungenen Zustand: `*_holen` liefert einen
//! Puffer aus der Freiliste (oder allokiert frisch), `*_zurueckgeben` legt
//! ihn zurueck. Die logische Laenge wird zurueckgesetzt, die Kapazitaet
//! bleibt erhalten.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::{FRAME_SAMPLES, MAX_PAKET_BYTES};

/// Obergrenze je Freiliste – darueber hinaus zurueckgegebene Puffer
/// werden fallen gelassen statt gehortet
const MAX_FREILISTE: usize = 64;

/// Thread-safe Pool fuer PCM- und Paketpuffer
///
/// `Clone`-faehig (innerer Arc); alle Klone teilen dieselben Freilisten.
#[derive(Clone, Default)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    pcm: Mutex<Vec<Vec<i16>>>,
    pakete: Mutex<Vec<Vec<u8>>>,
}

impl FramePool {
    /// Erstellt einen neuen leeren Pool
    pub fn neu() -> Self {
        Self::default()
    }

    /// Holt einen PCM-Puffer mit exakt [`FRAME_SAMPLES`] Samples
    ///
    /// Der Inhalt ist unspezifiziert; der Decoder ueberschreibt alle Samples.
    pub fn pcm_holen(&self) -> Vec<i16> {
        let mut puffer = self
            .inner
            .pcm
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(FRAME_SAMPLES));
        puffer.resize(FRAME_SAMPLES, 0);
        puffer
    }

    /// Gibt einen PCM-Puffer an den Pool zurueck
    pub fn pcm_zurueckgeben(&self, puffer: Vec<i16>) {
        let mut freiliste = self.inner.pcm.lock();
        if freiliste.len() < MAX_FREILISTE {
            freiliste.push(puffer);
        }
    }

    /// Holt einen leeren Paketpuffer mit Kapazitaet [`MAX_PAKET_BYTES`]
    pub fn paket_holen(&self) -> Vec<u8> {
        let mut puffer = self
            .inner
            .pakete
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(MAX_PAKET_BYTES));
        puffer.clear();
        puffer
    }

    /// Gibt einen Paketpuffer an den Pool zurueck
    pub fn paket_zurueckgeben(&self, puffer: Vec<u8>) {
        let mut freiliste = self.inner.pakete.lock();
        if freiliste.len() < MAX_FREILISTE {
            freiliste.push(puffer);
        }
    }

    /// Aktuelle Groesse der PCM-Freiliste (fuer Tests)
    pub fn pcm_freiliste_len(&self) -> usize {
        self.inner.pcm.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_holen_liefert_volle_frame_laenge() {
        let pool = FramePool::neu();
        let puffer = pool.pcm_holen();
        assert_eq!(puffer.len(), FRAME_SAMPLES);
    }

    #[test]
    fn zurueckgegebener_puffer_wird_wiederverwendet() {
        let pool = FramePool::neu();
        let mut puffer = pool.pcm_holen();
        puffer[0] = 1234;
        let kapazitaet = puffer.capacity();
        pool.pcm_zurueckgeben(puffer);

        assert_eq!(pool.pcm_freiliste_len(), 1);
        let wieder = pool.pcm_holen();
        assert_eq!(wieder.capacity(), kapazitaet, "Kapazitaet muss erhalten bleiben");
        assert_eq!(pool.pcm_freiliste_len(), 0);
    }

    #[test]
    fn leerer_pool_allokiert_frisch() {
        let pool = FramePool::neu();
        // Mehr holen als je zurueckgegeben wurde
        let a = pool.pcm_holen();
        let b = pool.pcm_holen();
        assert_eq!(a.len(), FRAME_SAMPLES);
        assert_eq!(b.len(), FRAME_SAMPLES);
    }

    #[test]
    fn paketpuffer_ist_leer_mit_kapazitaet() {
        let pool = FramePool::neu();
        let mut puffer = pool.paket_holen();
        assert!(puffer.is_empty());
        assert!(puffer.capacity() >= MAX_PAKET_BYTES);

        puffer.extend_from_slice(&[1, 2, 3]);
        pool.paket_zurueckgeben(puffer);
        let wieder = pool.paket_holen();
        assert!(wieder.is_empty(), "Logische Laenge muss zurueckgesetzt sein");
    }

    #[test]
    fn freiliste_ist_begrenzt() {
        let pool = FramePool::neu();
        for _ in 0..(MAX_FREILISTE + 10) {
            pool.pcm_zurueckgeben(vec![0i16; FRAME_SAMPLES]);
        }
        assert_eq!(pool.pcm_freiliste_len(), MAX_FREILISTE);
    }

    #[test]
    fn clone_teilt_freilisten() {
        let pool1 = FramePool::neu();
        let pool2 = pool1.clone();
        pool1.pcm_zurueckgeben(vec![0i16; FRAME_SAMPLES]);
        assert_eq!(pool2.pcm_freiliste_len(), 1);
    }
}
