//! Shared Application State
//!
//! `AppState` holds the shared, clonable resources every handler needs:
//! the protocol engine (which owns the session store) and the external
//! transcription collaborator.

use crate::config::Config;
use rouse_core::protocol::WakeProtocol;
use rouse_core::speech::Transcriber;
use rouse_core::store::InMemorySessionStore;
use std::sync::Arc;

/// The concrete protocol the service runs: single-process in-memory
/// session authority. The store stays swappable at the type seam.
pub type Protocol = WakeProtocol<InMemorySessionStore>;

#[derive(Clone)]
pub struct AppState {
    pub protocol: Arc<Protocol>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub config: Arc<Config>,
}
