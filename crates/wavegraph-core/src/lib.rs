//! # wavegraph-core
//!
//! The signal kernel for Wavegraph - THE LOGIC.
//!
//! This crate implements the core substrate: a graph of nodes that
//! accumulate timestamped points, derive periodic decaying wave-function
//! signals from their recent history, and stream signal updates live to
//! subscribers through per-node tailer tasks.
//!
//! ## Layering
//!
//! - `store` — the narrow adapter over a durable keyed store, with
//!   in-memory and redb backends
//! - `wave` — the pure wave-function algebra, no I/O
//! - `graph` / `points` / `delta` — node records, point events, and the
//!   append-only change streams between them
//! - `deriver` — history in, wave function out
//! - `fanout` — per-node tailers pushing envelopes to a broadcast callback
//! - `engine` — the facade an interface layer talks to

// =============================================================================
// MODULES
// =============================================================================

pub mod delta;
pub mod deriver;
pub mod engine;
pub mod fanout;
pub mod graph;
pub mod points;
pub mod primitives;
pub mod store;
pub mod types;
pub mod wave;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{Node, NodeUuid, Point, PointUuid, WavegraphError, epoch_now, utc_from_epoch};

// =============================================================================
// RE-EXPORTS: Kernel
// =============================================================================

pub use delta::{DeltaRecord, append_delta};
pub use deriver::derive_signal;
pub use engine::SignalEngine;
pub use fanout::{Broadcast, SignalEnvelope, SignalFanout};
pub use graph::NodeStore;
pub use points::PointStore;
pub use store::{LogEntry, LogId, MemoryStore, RedbStore, SignalStore};
pub use wave::{Basis, BasisTerm, GatedWaveFunc, WaveExpr, WaveFunc, base_position};
