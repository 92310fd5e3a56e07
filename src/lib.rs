//! EdgeHost - Multi-Tenant Subdomain Worker
//!
//! This crate is the edge worker for a subdomain hosting platform: it
//! registers tenant subdomains, reconciles billing webhook events into
//! tenant state and revenue records, and proxies everything else to a
//! backing static origin.
//!
//! # Features
//!
//! - **Tenant Registry**: first-claim subdomain ownership with idempotent
//!   re-registration and email backfill
//! - **Billing Reconciler**: typed webhook event dispatch, subscription and
//!   invoice records, monthly revenue ledger, HMAC signature verification
//! - **Aggregate Stats**: materialized counters rebuilt from the records
//!   they summarize, never incremented in place
//! - **Static Proxy**: single-shot origin passthrough that merges CORS
//!   headers into non-HTML responses only
//!
//! # Architecture
//!
//! ```text
//! request ──▶ Router ──── OPTIONS ──▶ 204 + CORS
//!               │
//!               ├──▶ /api/*          ──▶ Tenant Registry ───┐
//!               ├──▶ <webhook path>  ──▶ Billing Reconciler ┼──▶ KV store
//!               └──▶ everything else ──▶ Static Proxy ──────┘   <deployment>:*
//!                                              │
//!                                              ▼
//!                                        static origin
//! ```
//!
//! All state lives in one key-value store; every key is prefixed with the
//! deployment identifier, so independent deployments share a store without
//! collisions.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use edgehost::store::InMemoryStore;
//! use edgehost::{build_router, AppState, WorkerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WorkerConfig::from_env()?;
//!     let state = Arc::new(AppState::new(config, Arc::new(InMemoryStore::new()))?);
//!     let app = build_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8787").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod billing;
pub mod config;
pub mod cors;
pub mod error;
pub mod proxy;
pub mod registry;
pub mod router;
pub mod stats;
pub mod store;
pub mod tenant;

// Re-exports for convenience
pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use router::{build_router, AppState};
pub use store::{InMemoryStore, KeyValueStore, SharedStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
