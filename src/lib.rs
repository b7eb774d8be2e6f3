//! # citebridge
//!
//! A local HTTP API that resolves compact citation keys (`DoeTitle2000`,
//! `doe:2000title`) against a reference library and renders the matching
//! items as identifiers, CSL-JSON, bibliographies, export text, or
//! attachment paths.
//!
//! The resolution and formatting logic lives in [`citebridge_core`]. This
//! crate binds it to a SQLite library, an axum server, and a CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────┐
//! │  CSL-JSON  │──▶│    import    │──▶│   SQLite   │
//! └────────────┘   └──────────────┘   └─────┬──────┘
//!                                            │ SqliteHost
//!                       ┌────────────────────┤
//!                       ▼                    ▼
//!                 ┌───────────┐        ┌───────────┐
//!                 │    CLI    │        │   HTTP    │
//!                 │ resolve   │        │  (axum)   │
//!                 └───────────┘        └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! citebridge init
//! citebridge import library.json --collection "My citations"
//! citebridge resolve DoeBook2005 --format bibliography
//! citebridge serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`import`] | CSL-JSON import |
//! | [`sqlite_host`] | `Host` implementation over SQLite |
//! | [`commands`] | One-shot `resolve` and `search` |
//! | [`server`] | HTTP server |

pub mod commands;
pub mod config;
pub mod db;
pub mod import;
pub mod migrate;
pub mod server;
pub mod sqlite_host;
