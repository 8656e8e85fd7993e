//! # Librarian Core
//!
//! Shared, I/O-free logic for Doc Librarian: the index entry model, metadata
//! extraction, filename normalization, category classification, and the
//! relationship heuristic.
//!
//! This crate contains no tokio, filesystem access, or watcher code. Every
//! function here is deterministic given its inputs, which is what makes the
//! normalized filename usable as an idempotency key.

pub mod classify;
pub mod extract;
pub mod models;
pub mod normalize;
pub mod relate;
