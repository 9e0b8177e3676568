//! palaver-core – Gemeinsame Typen, Fehler und Statistiken
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Palaver-Crates gemeinsam genutzt werden.

pub mod error;
pub mod statistik;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{RelayError, Result};
pub use statistik::{RelayStatistik, StatistikSchnappschuss};
pub use types::PeerId;
