//! # E-Series Collector Library
//!
//! This crate serves as the core library for the `eseries-collector` daemon.
//! It polls a storage-array web services proxy for performance counters,
//! failure states, and event-log records, and forwards them to an
//! InfluxDB-compatible time-series store. Organizing the project as a library
//! keeps the collection engine testable against in-memory collaborators while
//! `main.rs` wires up the real HTTP clients.
//!
//! ## Crate Structure
//!
//! - **`config`**: Strongly-typed configuration loaded from TOML and the
//!   environment, with CLI overrides applied by the binary. See
//!   `config::CollectorConfig`.
//! - **`error`**: The `CollectorError` enum for centralized error handling,
//!   and the `AppResult` alias used throughout.
//! - **`point`**: The transient data model: measurements, metric points,
//!   event-log and failure records, and per-array collection batches.
//! - **`proxy`**: The `ProxyApi` trait and its reqwest-backed `ProxyClient`
//!   for the upstream management endpoint.
//! - **`store`**: The `PointStore` trait and its InfluxDB v1 line-protocol
//!   implementation, including the state-reconstruction queries.
//! - **`collect`**: The three collection tasks: system metrics, event-log
//!   synchronization, and failure-state deduplication.
//! - **`scheduler`**: The drift-compensated polling loop and the bounded
//!   three-phase fan-out executor.
//! - **`tracing_setup`**: Structured logging initialization.

pub mod collect;
pub mod config;
pub mod error;
pub mod point;
pub mod proxy;
pub mod scheduler;
pub mod store;
pub mod tracing_setup;
