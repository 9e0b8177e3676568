//! palaver-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;
pub mod mixer;
pub mod registry;
pub mod server;
pub mod session;

pub use registry::PeerRegistry;
pub use server::RelayServer;
pub use session::{passwort_digest, PeerSession};
