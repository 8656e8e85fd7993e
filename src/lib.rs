//! # Document Librarian
//!
//! A background agent that watches folders of text documents and files
//! each one into a canonical library tree.
//!
//! Every document that settles after a write is read once, given a dated
//! and slugged filename, routed to a category, copied into
//! `<library>/<category>/`, linked to similar documents of the same
//! category, and recorded in a JSON index. A ledger of source mtimes keeps
//! unchanged files from being processed twice.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────────────────┐
//! │  watcher    │──▶│ bounded mpsc │──▶│ worker (single writer)   │
//! │ + backlog   │   │  FileEvent   │   │ read → classify → store  │
//! └─────────────┘   └──────────────┘   │ → index → ledger         │
//!                                       └────────────┬─────────────┘
//!                        ┌───────────────────────────┤
//!                        ▼                           ▼
//!                 ┌─────────────┐            ┌──────────────┐
//!                 │ library/    │            │ index.json   │
//!                 │ <category>/ │            │ ledger.json  │
//!                 └─────────────┘            └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`sources`] | Source roots, path filters, `sources` command |
//! | [`watcher`] | Debounced watching and backlog scan |
//! | [`ledger`] | Source path → processed mtime |
//! | [`library`] | Atomic copies into the library tree |
//! | [`index`] | Entry id → metadata, persisted as JSON |
//! | [`ingest`] | The per-file pipeline |
//! | [`agent`] | Lifecycle, worker loop, reindex |
//! | [`status`] | Agent state, counters, periodic report |
//! | [`stats`] | `stats` command |
//! | [`error`] | Typed pipeline errors |
//! | [`fsutil`] | Atomic writes and mtime helpers |
//!
//! Pure heuristics (metadata extraction, name normalization,
//! classification, similarity) live in the `librarian-core` crate.

pub mod agent;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod index;
pub mod ingest;
pub mod ledger;
pub mod library;
pub mod sources;
pub mod stats;
pub mod status;
pub mod watcher;

pub use librarian_core::models::{EventKind, FileEvent, IndexEntry};
