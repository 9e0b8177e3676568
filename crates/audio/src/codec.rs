//! Opus Encoder/Decoder Wrapper
//!
//! Kapselt audiopus und stellt eine i16-PCM basierte API bereit, fest
//! konfiguriert auf das Relay-Format (48 kHz mono, 20-ms-Frames).
//! Encoder: Low-Delay-Profil mit DTX, Decoder: ein Exemplar pro Peer
//! (Opus-Zustand ist frameuebergreifend, niemals zwischen Peers teilen).

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Bitrate, Channels, SampleRate,
};
use tracing::debug;

use crate::error::{AudioError, AudioResult};
use crate::FRAME_SAMPLES;

/// Opus-CTL-Request fuer DTX (audiopus 0.2 hat kein set_dtx)
const OPUS_SET_DTX_REQUEST: i32 = 4016;

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Opus-Encoder: kodiert i16-PCM-Frames zu Opus-Bytes
pub struct OpusEncoder {
    encoder: Encoder,
    bitrate_kbps: u32,
}

impl OpusEncoder {
    /// Erstellt einen neuen Encoder mit der gegebenen Bitrate
    ///
    /// Low-Delay-Profil, DTX aktiviert: bei erkannter Stille liefert
    /// `encode` leere bzw. minimale Ausgaben.
    pub fn new(bitrate_kbps: u32) -> AudioResult<Self> {
        if bitrate_kbps == 0 {
            return Err(AudioError::Konfiguration(
                "Bitrate muss groesser als 0 sein".into(),
            ));
        }

        let mut encoder = Encoder::new(SampleRate::Hz48000, Channels::Mono, Application::LowDelay)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        encoder
            .set_bitrate(Bitrate::BitsPerSecond((bitrate_kbps as i32) * 1000))
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        // DTX aktivieren
        encoder
            .set_encoder_ctl_request(OPUS_SET_DTX_REQUEST, 1)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        debug!(bitrate_kbps, frame_samples = FRAME_SAMPLES, "OpusEncoder erstellt");

        Ok(Self {
            encoder,
            bitrate_kbps,
        })
    }

    /// Kodiert einen PCM-Frame in den Ausgabepuffer
    ///
    /// Die Eingabe muss exakt [`FRAME_SAMPLES`] Samples lang sein. Gibt die
    /// Anzahl geschriebener Bytes zurueck; 0 ist die DTX-Stille-Anzeige.
    pub fn encode(&mut self, pcm: &[i16], output: &mut [u8]) -> AudioResult<usize> {
        if pcm.len() != FRAME_SAMPLES {
            return Err(AudioError::FrameLaenge {
                erwartet: FRAME_SAMPLES,
                erhalten: pcm.len(),
            });
        }

        self.encoder
            .encode(pcm, output)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))
    }

    /// Gibt die konfigurierte Bitrate zurueck
    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_kbps
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Opus-Decoder: dekodiert Opus-Bytes zu i16-PCM
pub struct OpusDecoder {
    decoder: Decoder,
}

impl OpusDecoder {
    /// Erstellt einen neuen Decoder (48 kHz mono)
    pub fn new() -> AudioResult<Self> {
        let decoder = Decoder::new(SampleRate::Hz48000, Channels::Mono)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        Ok(Self { decoder })
    }

    /// Dekodiert ein Opus-Paket in den PCM-Puffer
    ///
    /// Der Puffer muss mindestens [`FRAME_SAMPLES`] Samples fassen. Ein Paket,
    /// das nicht exakt einen vollen 20-ms-Frame ergibt, wird abgelehnt.
    pub fn decode(&mut self, paket: &[u8], pcm: &mut [i16]) -> AudioResult<usize> {
        let dekodiert = self
            .decoder
            .decode(Some(paket), pcm, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        if dekodiert != FRAME_SAMPLES {
            return Err(AudioError::FrameLaenge {
                erwartet: FRAME_SAMPLES,
                erhalten: dekodiert,
            });
        }

        Ok(dekodiert)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
