//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Laenge (u32 big-endian) + rohe Payload-Bytes.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Eine Laenge von 0 ist legal und bedeutet "Frame ueberspringen" (DTX).
//! Das maximal erlaubte Payload wird vom Aufrufer vorgegeben: Audio-Frames
//! sind auf die Opus-Obergrenze begrenzt, der Auth-Blob auf [`AUTH_MAX_LEN`].
//!
//! Gelesen wird immer exakt (keine Short-Reads); geschrieben wird vollstaendig
//! oder mit Fehler.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Maximale Laenge des Authentifizierungs-Blobs (Passwort) in Bytes
pub const AUTH_MAX_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Lesen oder Schreiben eines Frames
#[derive(Debug, Error)]
pub enum WireError {
    /// Der angekuendigte Frame ueberschreitet das erlaubte Maximum.
    /// Fuer Audio-Frames ist das ein terminaler Protokollverstoss.
    #[error("Frame zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)")]
    FrameZuGross { laenge: usize, maximum: usize },

    /// IO-Fehler auf der Verbindung (inkl. EOF mitten im Frame)
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Lese-/Schreibprimitiven
// ---------------------------------------------------------------------------

/// Liest einen Frame in den uebergebenen Puffer
///
/// Der Puffer wird auf die Frame-Laenge gebracht (Kapazitaet bleibt erhalten,
/// damit gepoolte Puffer wiederverwendet werden koennen). Gibt die Anzahl
/// gelesener Payload-Bytes zurueck; 0 ist das legale Skip-Sentinel.
///
/// # Fehler
/// - [`WireError::FrameZuGross`] wenn die Laenge `max_len` ueberschreitet
/// - [`WireError::Io`] mit `UnexpectedEof` wenn die Verbindung vor Abschluss
///   des Frames getrennt wird
pub async fn read_frame_into<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_len: usize,
) -> Result<usize, WireError>
where
    R: AsyncRead + Unpin,
{
    // Laengen-Feld lesen
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let laenge = u32::from_be_bytes(len_buf) as usize;

    // Skip-Sentinel
    if laenge == 0 {
        buf.clear();
        return Ok(0);
    }

    // Groesse pruefen
    if laenge > max_len {
        return Err(WireError::FrameZuGross {
            laenge,
            maximum: max_len,
        });
    }

    // Payload exakt lesen
    buf.clear();
    buf.resize(laenge, 0);
    reader.read_exact(buf).await?;

    Ok(laenge)
}

/// Schreibt einen Frame (Laengen-Feld + Payload)
///
/// # Fehler
/// - [`WireError::Io`] bei jedem Schreibfehler
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let len_bytes = (payload.len() as u32).to_be_bytes();
    writer.write_all(&len_bytes).await?;
    writer.write_all(payload).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
