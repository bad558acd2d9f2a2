//! GoalGraph Core Engine
//!
//! This crate provides the document model, layout engine, progress ledger and
//! sync plumbing for the GoalGraph personal goal tracker.
//!
//! # Architecture
//!
//! - **Arena Document**: every node lives exactly once in an id→node map;
//!   roots and per-container children are views derived on demand
//! - **Lenient Ingest**: several legacy wire shapes normalize into the same
//!   document; cyclic `parents` relations are the one typed rejection
//! - **Layered Layout**: longest-path leveling into columns, then slice
//!   geometry with a pluggable position solver
//! - **Versioned Sync**: store writes carry monotonic versions; a service
//!   drops echoes of its own writes by version watermark, never by timing
//!
//! # Modules
//!
//! - [`models`] - Node, document, wire conversion, time abstractions
//! - [`layout`] - Column leveling and slice positioning
//! - [`progress`] - Weighted rollup and the day-by-day completion ledger
//! - [`db`] - Store seam and change broadcasting
//! - [`services`] - The graph service and sync reconciler

pub mod db;
pub mod layout;
pub mod models;
pub mod progress;
pub mod services;

// Re-export commonly used types
pub use db::*;
pub use models::*;
pub use services::*;
