//! palaver-protocol – Wire-Format fuer Palaver-Verbindungen
//!
//! Definiert das frame-basierte TCP-Protokoll (Laengenpraefix + Payload)
//! und die Lese-/Schreibprimitiven darauf.

pub mod wire;

pub use wire::{read_frame_into, write_frame, WireError, AUTH_MAX_LEN, LENGTH_FIELD_SIZE};
