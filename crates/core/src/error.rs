//! Fehlertypen fuer Palaver
//!
//! Zentraler Fehler-Enum fuer die Server-Seite. Untermodule (Wire-Framing,
//! Audio-Codec) definieren eigene Fehler und werden an den Aufrufstellen
//! konvertiert.

use thiserror::Error;

/// Globaler Result-Alias fuer Palaver
pub type Result<T> = std::result::Result<T, RelayError>;

/// Alle moeglichen Fehler im Palaver-Relay
#[derive(Debug, Error)]
pub enum RelayError {
    // --- Authentifizierung ---
    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentifizierung(String),

    // --- Aufnahme ---
    #[error("Server voll: maximale Peeranzahl {maximum} erreicht")]
    ServerVoll { maximum: usize },

    #[error("Keine freien Peer-IDs mehr (Vorrat von 255 erschoepft)")]
    IdentitaetenErschoepft,

    // --- Verbindung & Netzwerk ---
    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl RelayError {
    /// Erstellt einen Authentifizierungsfehler aus einer beliebigen Nachricht
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentifizierung(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler nur die eine Peer-Session betrifft
    /// und der Rest des Servers unbeeinflusst weiterlaeuft
    pub fn ist_peer_lokal(&self) -> bool {
        !matches!(self, Self::Konfiguration(_))
    }
}
