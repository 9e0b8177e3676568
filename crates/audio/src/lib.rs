//! palaver-audio – Opus-Codec, Frame-Pool und Misch-Routinen
//!
//! Alle Audio-Parameter des Relays sind hier zentral definiert:
//! 48 kHz mono, 16-bit signed PCM, 20-ms-Frames.

pub mod codec;
pub mod error;
pub mod mix;
pub mod pool;

pub use codec::{OpusDecoder, OpusEncoder};
pub use error::{AudioError, AudioResult};
pub use mix::{akku_abschliessen, frame_mischen};
pub use pool::FramePool;

use std::time::Duration;

// ---------------------------------------------------------------------------
// Audio-Konstanten
// ---------------------------------------------------------------------------

/// Abtastrate in Hz
pub const SAMPLE_RATE: u32 = 48_000;

/// Anzahl Audiokanaele (mono)
pub const KANAELE: u32 = 1;

/// Samples pro Frame (20 ms bei 48 kHz mono)
pub const FRAME_SAMPLES: usize = 960;

/// Dauer eines Frames – zugleich die Periode des Mixer-Ticks
pub const FRAME_DAUER: Duration = Duration::from_millis((FRAME_SAMPLES as u64) / 48);

/// Obergrenze eines komprimierten Opus-Frames in Bytes
pub const MAX_PAKET_BYTES: usize = 4000;

/// Standard-Bitrate des Mix-Encoders in kbit/s
pub const STANDARD_BITRATE_KBPS: u32 = 12;
