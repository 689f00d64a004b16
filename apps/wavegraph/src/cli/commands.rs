//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{AppState, run_server};
use crate::config::{DEFAULT_HOST, DEFAULT_PORT, FileConfig};
use std::path::Path;
use std::sync::Arc;
use wavegraph_core::{
    Broadcast, MemoryStore, NodeUuid, Point, RedbStore, SignalEngine, SignalEnvelope,
    WavegraphError,
};

// =============================================================================
// ENGINE SELECTION
// =============================================================================

/// Engine over the store backend the flags selected.
///
/// One variant per backend; the CLI surface is identical for both.
pub enum CliEngine {
    Memory(SignalEngine<MemoryStore>),
    Redb(SignalEngine<RedbStore>),
}

fn silent_broadcast() -> Broadcast {
    // One-shot commands have no subscribers to push to
    Arc::new(|_, _| {})
}

impl CliEngine {
    /// Open the backend at `database`, or a volatile in-memory store.
    pub fn open(database: &Path, in_memory: bool) -> Result<Self, WavegraphError> {
        if in_memory {
            Ok(Self::Memory(SignalEngine::new(
                Arc::new(MemoryStore::new()),
                silent_broadcast(),
            )))
        } else {
            let store = Arc::new(RedbStore::open(database)?);
            Ok(Self::Redb(SignalEngine::new(store, silent_broadcast())))
        }
    }

    fn add_point(
        &self,
        node: &NodeUuid,
        timestamp: Option<f64>,
    ) -> Result<Point, WavegraphError> {
        match self {
            Self::Memory(engine) => engine.add_point(node, timestamp),
            Self::Redb(engine) => engine.add_point(node, timestamp),
        }
    }

    fn snapshot(&self, node: &NodeUuid) -> Result<Option<SignalEnvelope>, WavegraphError> {
        match self {
            Self::Memory(engine) => engine.snapshot(node),
            Self::Redb(engine) => engine.snapshot(node),
        }
    }

    fn history(
        &self,
        node: &NodeUuid,
        anchor: Option<f64>,
        window: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<Point>, WavegraphError> {
        match self {
            Self::Memory(engine) => engine.history(node, anchor, window, limit),
            Self::Redb(engine) => engine.history(node, anchor, window, limit),
        }
    }

    fn connect(&self, from: &NodeUuid, to: &NodeUuid) -> Result<(), WavegraphError> {
        match self {
            Self::Memory(engine) => engine.connect(from, to),
            Self::Redb(engine) => engine.connect(from, to),
        }
    }
}

fn parse_uuid(raw: &str) -> Result<NodeUuid, WavegraphError> {
    let node = NodeUuid::from(raw);
    if !node.is_well_formed() {
        return Err(WavegraphError::InvalidParameter(format!(
            "malformed node uuid: {raw}"
        )));
    }
    Ok(node)
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Start the HTTP/WebSocket server.
pub async fn cmd_serve(
    database: &Path,
    in_memory: bool,
    config: &FileConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), WavegraphError> {
    let host = host
        .or_else(|| config.host.clone())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = port.or(config.port).unwrap_or(DEFAULT_PORT);
    let addr = format!("{host}:{port}");

    println!("Wavegraph Live Signal Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {host}");
    println!("  Port:     {port}");
    if in_memory {
        println!("  Store:    in-memory (volatile)");
    } else {
        println!("  Store:    {}", database.display());
    }
    println!();

    if in_memory {
        run_server(&addr, AppState::new(Arc::new(MemoryStore::new()))).await
    } else {
        let store = Arc::new(RedbStore::open(database)?);
        run_server(&addr, AppState::new(store)).await
    }
}

// =============================================================================
// POINT COMMANDS
// =============================================================================

/// Record a point for a node.
pub async fn cmd_add_point(
    engine: &CliEngine,
    node: &str,
    time: Option<f64>,
    json_mode: bool,
) -> Result<(), WavegraphError> {
    let node = parse_uuid(node)?;
    let point = engine.add_point(&node, time)?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&point)
                .map_err(|e| WavegraphError::Serialization(e.to_string()))?
        );
    } else {
        println!("Point recorded:");
        println!("  Node:  {node}");
        println!("  Point: {}", point.uuid);
        println!("  Time:  {} ({})", point.timestamp_epoch, point.timestamp_utc);
    }
    Ok(())
}

/// Show a node's current signal.
pub async fn cmd_snapshot(
    engine: &CliEngine,
    node: &str,
    json_mode: bool,
) -> Result<(), WavegraphError> {
    let node = parse_uuid(node)?;
    let signal = engine.snapshot(&node)?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&signal)
                .map_err(|e| WavegraphError::Serialization(e.to_string()))?
        );
        return Ok(());
    }

    match signal {
        Some(envelope) => {
            let wave = envelope.data.wave();
            println!("Signal for {node}:");
            println!("  Ref time: {}", wave.ref_time);
            println!("  Period:   {:.3}s", wave.period);
            println!("  Decay:    {}", wave.decay);
        }
        None => println!("No signal derivable for {node} (fewer than 2 recent points)"),
    }
    Ok(())
}

/// Show a node's point history, newest first.
pub async fn cmd_history(
    engine: &CliEngine,
    node: &str,
    anchor: Option<f64>,
    window: Option<f64>,
    limit: Option<usize>,
    json_mode: bool,
) -> Result<(), WavegraphError> {
    let node = parse_uuid(node)?;
    let points = engine.history(&node, anchor, window, limit)?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&points)
                .map_err(|e| WavegraphError::Serialization(e.to_string()))?
        );
        return Ok(());
    }

    if points.is_empty() {
        println!("No points for {node} in range");
        return Ok(());
    }
    println!("History for {node} ({} points, newest first):", points.len());
    for point in &points {
        println!("  {}  {}  {}", point.timestamp_epoch, point.timestamp_utc, point.uuid);
    }
    Ok(())
}

// =============================================================================
// MAINTENANCE COMMANDS
// =============================================================================

/// Compact the signal database in place.
pub async fn cmd_compact(
    database: &Path,
    in_memory: bool,
    json_mode: bool,
) -> Result<(), WavegraphError> {
    if in_memory {
        return Err(WavegraphError::InvalidParameter(
            "nothing to compact: the in-memory store is volatile".to_string(),
        ));
    }

    let mut store = RedbStore::open(database)?;
    store.compact()?;

    if json_mode {
        println!(
            "{}",
            serde_json::json!({"compacted": database.display().to_string()})
        );
    } else {
        println!("Compacted {}", database.display());
    }
    Ok(())
}

// =============================================================================
// GRAPH COMMANDS
// =============================================================================

/// Connect two nodes, from -> to.
pub async fn cmd_connect(
    engine: &CliEngine,
    from: &str,
    to: &str,
    json_mode: bool,
) -> Result<(), WavegraphError> {
    let from = parse_uuid(from)?;
    let to = parse_uuid(to)?;
    engine.connect(&from, &to)?;

    if json_mode {
        println!(
            "{}",
            serde_json::json!({"connected": {"from": from, "to": to}})
        );
    } else {
        println!("Connected {from} -> {to}");
    }
    Ok(())
}
