//! # LedgerLink Adapter
//!
//! Client adapter exposing one remote HTTP/WebSocket ledger as a uniform
//! "ledger" abstraction:
//! - Resilient HTTP requester with unbounded exponential-backoff retry
//! - Cached, single-flight ledger metadata resolution
//! - Supervised WebSocket subscription with auto-reconnect
//! - Notification normalization into a typed event taxonomy
//! - Transfer operations with a deterministic error-code mapping
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              LedgerAdapter (facade)                 │
//! └───────┬──────────────┬──────────────┬───────────────┘
//!         │              │              │
//! ┌───────▼──────┐ ┌─────▼───────┐ ┌────▼──────────────┐
//! │  Transfer    │ │ Connection  │ │ Metadata Resolver │
//! │  Operations  │ │  Manager    │ │ (single-flight)   │
//! └───────┬──────┘ └─────┬───────┘ └────┬──────────────┘
//!         │              │              │
//!         │        ┌─────▼───────┐      │
//!         │        │ Notification│      │
//!         │        │ Normalizer  │      │
//!         │        └─────┬───────┘      │
//! ┌───────▼──────────────▼──────────────▼──────────────┐
//! │     Resilient HTTP Requester / Event Dispatcher    │
//! └────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod adapter;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod events;
pub mod metrics;
pub mod resolver;

mod notifications;
mod operations;
mod requester;
mod wire;

pub use adapter::{LedgerAdapter, LedgerInfo};
pub use connection::ConnectionState;
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use events::{EventDispatcher, EventHandler};
pub use resolver::{LedgerMetadata, ServiceUrls};

// Canonical model, re-exported for host callers
pub use ledger_protocol::{Direction, LedgerEvent, Message, Transfer};

/// First retry delay after a transport failure
pub const MIN_RETRY_DELAY_MS: u64 = 1000;

/// Retry delay growth factor per attempt
pub const RETRY_MULTIPLIER: f64 = 1.5;

/// Retry delay ceiling
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
