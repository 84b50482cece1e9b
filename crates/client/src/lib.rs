//! Reconciliation Service client, shared by every front end.
//!
//! This crate owns the HTTP side of the wire contract: endpoint paths,
//! JSON vs multipart encoding, and the mapping of failures onto
//! [`TransportError`](recon_core::TransportError). Request and response
//! shapes themselves live in `recon-core`.
//!
//! No retries. No async runtime.

mod client;
mod settings;

pub use client::{ServiceClient, APPROVE_PATH, RECONCILE_PATH};
pub use settings::{
    load_settings, load_settings_from, settings_file_path, ClientSettings, SettingsError,
    API_BASE_ENV, DEFAULT_API_BASE, DEFAULT_TIMEOUT_SECS,
};
