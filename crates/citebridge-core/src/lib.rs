//! # citebridge core
//!
//! Host-agnostic logic for citebridge: citation key parsing and generation,
//! search query construction, the [`Host`](host::Host) abstraction, the key
//! resolver with its resolution cache, response formatting, and the
//! endpoint registry.
//!
//! This crate contains no HTTP listener, database driver, or filesystem
//! I/O. The application crate binds it to axum and SQLite; tests bind it to
//! [`MemoryHost`](host::memory::MemoryHost).
//!
//! ```text
//! request ─▶ EndpointRegistry ─▶ Api::dispatch ─▶ Resolver ─▶ Host::search
//!                                       │                         │
//!                                       ▼                         ▼
//!                                 format_items ◀──────────── Item ids
//!                                       │
//!                                       ▼
//!                          Reply { status, content_type, body }
//! ```

pub mod endpoints;
pub mod error;
pub mod format;
pub mod host;
pub mod key;
pub mod keygen;
pub mod query;
pub mod resolver;

pub use error::{Error, Result};
