//! Warren - a reverse-tunneling HTTP gateway.
//!
//! Warren is a publicly reachable server that accepts inbound HTTP requests
//! on behalf of privately hosted services. Each private service ("peer")
//! connects *out* to Warren over a persistent WebSocket control channel and
//! registers under a hostname; Warren routes incoming requests by Host
//! header, forwards them as JSON frames over the peer's channel, and writes
//! the peer's reply back to the public client, buffered or chunk-streamed
//! for server-sent events. Completed exchanges are captured for inspection
//! and can be replayed through the live tunnel.
//!
//! # Features
//! - Hostname-based routing with single-writer eviction semantics
//! - Many concurrent exchanges multiplexed over one channel per peer
//! - Buffered and chunk-streamed response modes with client-abort propagation
//! - Exchange capture with age-based pruning, and replay against the
//!   currently bound peer
//! - Token-gated, Host-scoped inspector with constant-time credential checks
//! - Structured tracing via `tracing` and `metrics`-facade instrumentation
//! - Graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use warren::{
//!     adapters::{MemoryCredentialStore, MemoryLogStore},
//!     config::ServerConfig,
//!     core::{Dispatcher, PeerRegistry, Recorder},
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = ServerConfig::default();
//! let registry = Arc::new(PeerRegistry::new());
//! let store = Arc::new(MemoryLogStore::new());
//! let recorder = Recorder::spawn(store.clone(), &config.recorder);
//! let dispatcher = Arc::new(Dispatcher::new(recorder, &config.dispatch));
//! // Wire these into the provided axum handlers (see the binary crate).
//! # let _ = (registry, dispatcher);
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations)
//! while keeping the forwarding engine inside `core`. The relational store
//! behind [`ports::log_store::LogStore`] and
//! [`ports::credential_store::CredentialStore`] is an external collaborator;
//! in-memory adapters are provided for embedding and tests.
//!
//! # Error Handling
//! Domain failures use per-module `thiserror` enums; the binary and handler
//! edges use `eyre::Result` with attached context.
//!
//! # Concurrency & Data Structures
//! Shared maps (the peer registry, per-peer handler maps) use `scc::HashMap`
//! so the request hot path reads without locking. Each dispatch is a logically
//! serial task whose suspension points are race-composed with `select!` and
//! torn down by RAII guards.
//!
//! # License
//! Dual-licensed under either MIT or Apache-2.0 at your option.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{ControlSocket, GatewayHandler, Inspector, MemoryCredentialStore, MemoryLogStore},
    core::{Dispatcher, PeerRegistry, Recorder, ReplayEngine},
    utils::GracefulShutdown,
};
