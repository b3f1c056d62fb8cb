//! Rouse API Library Crate
//!
//! Core logic for the wake-session web service: application state,
//! configuration, HTTP speech engine clients, history persistence, API
//! handlers, and routing. The `api` binary is a thin wrapper around this
//! library.

pub mod config;
pub mod handlers;
pub mod history;
pub mod models;
pub mod router;
pub mod speech_http;
pub mod state;
