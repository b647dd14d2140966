//! # LedgerLink Protocol
//!
//! Canonical data model shared by ledger adapters:
//! - Canonical transfers and messages, normalized away from any one
//!   ledger's wire format
//! - The typed event taxonomy emitted by an adapter's notification stream
//! - Address parsing within a ledger's routing prefix
//!
//! No I/O lives here; everything is plain data.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod address;
pub mod events;
pub mod transfer;

pub use address::{parse_address, AddressError, ParsedAddress};
pub use events::LedgerEvent;
pub use transfer::{Direction, Message, Transfer};
