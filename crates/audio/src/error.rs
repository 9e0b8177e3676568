//! Fehlertypen fuer die Audio-Schicht

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Schicht
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Unerwartete Frame-Laenge: {erhalten} Samples (erwartet {erwartet})")]
    FrameLaenge { erwartet: usize, erhalten: usize },
}

pub type AudioResult<T> = Result<T, AudioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_laenge_anzeige() {
        let e = AudioError::FrameLaenge {
            erwartet: 960,
            erhalten: 480,
        };
        assert!(e.to_string().contains("480"));
        assert!(e.to_string().contains("960"));
    }
}
