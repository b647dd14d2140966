//! Typed event taxonomy emitted by a ledger adapter.
//!
//! The source of truth for transfer lifecycle fan-out: one variant per
//! named event an adapter can emit, instead of stringly-typed emitter
//! channels. Events are cheap to clone and are delivered to every
//! subscribed handler in registration order.

use crate::transfer::{Direction, Message, Transfer};

/// An event emitted by a ledger adapter
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    /// The notification stream opened
    Connect,
    /// The notification stream closed
    Disconnect,
    /// A conditional transfer crediting the local account was prepared
    IncomingPrepare(Transfer),
    /// An unconditional transfer crediting the local account executed
    IncomingTransfer(Transfer),
    /// A conditional transfer crediting the local account was fulfilled
    IncomingFulfill {
        /// The normalized transfer
        transfer: Transfer,
        /// The fulfillment proof from the notification's related resources
        fulfillment: String,
    },
    /// A transfer crediting the local account was cancelled
    IncomingCancel {
        /// The normalized transfer
        transfer: Transfer,
        /// Cancellation proof or a generic timeout reason
        reason: serde_json::Value,
    },
    /// A transfer crediting the local account was explicitly rejected
    IncomingReject {
        /// The normalized transfer
        transfer: Transfer,
        /// The decoded rejection message
        reason: serde_json::Value,
    },
    /// A conditional transfer debiting the local account was prepared
    OutgoingPrepare(Transfer),
    /// An unconditional transfer debiting the local account executed
    OutgoingTransfer(Transfer),
    /// A conditional transfer debiting the local account was fulfilled
    OutgoingFulfill {
        /// The normalized transfer
        transfer: Transfer,
        /// The fulfillment proof
        fulfillment: String,
    },
    /// A transfer debiting the local account was cancelled
    OutgoingCancel {
        /// The normalized transfer
        transfer: Transfer,
        /// Cancellation proof or a generic timeout reason
        reason: serde_json::Value,
    },
    /// A transfer debiting the local account was explicitly rejected
    OutgoingReject {
        /// The normalized transfer
        transfer: Transfer,
        /// The decoded rejection message
        reason: serde_json::Value,
    },
    /// A message addressed to the local account arrived
    IncomingMessage(Message),
}

impl LedgerEvent {
    /// Prepare event for the transfer's direction
    pub fn prepare(transfer: Transfer) -> Self {
        match transfer.direction {
            Direction::Incoming => LedgerEvent::IncomingPrepare(transfer),
            Direction::Outgoing => LedgerEvent::OutgoingPrepare(transfer),
        }
    }

    /// Direct (unconditional) settlement event for the transfer's direction
    pub fn transfer(transfer: Transfer) -> Self {
        match transfer.direction {
            Direction::Incoming => LedgerEvent::IncomingTransfer(transfer),
            Direction::Outgoing => LedgerEvent::OutgoingTransfer(transfer),
        }
    }

    /// Fulfillment event for the transfer's direction
    pub fn fulfill(transfer: Transfer, fulfillment: String) -> Self {
        match transfer.direction {
            Direction::Incoming => LedgerEvent::IncomingFulfill {
                transfer,
                fulfillment,
            },
            Direction::Outgoing => LedgerEvent::OutgoingFulfill {
                transfer,
                fulfillment,
            },
        }
    }

    /// Cancellation event for the transfer's direction
    pub fn cancel(transfer: Transfer, reason: serde_json::Value) -> Self {
        match transfer.direction {
            Direction::Incoming => LedgerEvent::IncomingCancel { transfer, reason },
            Direction::Outgoing => LedgerEvent::OutgoingCancel { transfer, reason },
        }
    }

    /// Rejection event for the transfer's direction
    pub fn reject(transfer: Transfer, reason: serde_json::Value) -> Self {
        match transfer.direction {
            Direction::Incoming => LedgerEvent::IncomingReject { transfer, reason },
            Direction::Outgoing => LedgerEvent::OutgoingReject { transfer, reason },
        }
    }

    /// Stable event name, for logging and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Connect => "connect",
            LedgerEvent::Disconnect => "disconnect",
            LedgerEvent::IncomingPrepare(_) => "incoming_prepare",
            LedgerEvent::IncomingTransfer(_) => "incoming_transfer",
            LedgerEvent::IncomingFulfill { .. } => "incoming_fulfill",
            LedgerEvent::IncomingCancel { .. } => "incoming_cancel",
            LedgerEvent::IncomingReject { .. } => "incoming_reject",
            LedgerEvent::OutgoingPrepare(_) => "outgoing_prepare",
            LedgerEvent::OutgoingTransfer(_) => "outgoing_transfer",
            LedgerEvent::OutgoingFulfill { .. } => "outgoing_fulfill",
            LedgerEvent::OutgoingCancel { .. } => "outgoing_cancel",
            LedgerEvent::OutgoingReject { .. } => "outgoing_reject",
            LedgerEvent::IncomingMessage(_) => "incoming_message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn transfer(direction: Direction) -> Transfer {
        Transfer {
            id: Uuid::nil(),
            direction,
            account: "example.red.bob".to_string(),
            ledger: "example.red.".to_string(),
            amount: "1".to_string(),
            data: None,
            note_to_self: None,
            execution_condition: None,
            cancellation_condition: None,
            expires_at: None,
            cases: Vec::new(),
        }
    }

    #[test]
    fn constructors_follow_direction() {
        let event = LedgerEvent::prepare(transfer(Direction::Incoming));
        assert_eq!(event.name(), "incoming_prepare");

        let event = LedgerEvent::fulfill(transfer(Direction::Outgoing), "cf:0:".to_string());
        assert_eq!(event.name(), "outgoing_fulfill");

        let event = LedgerEvent::cancel(
            transfer(Direction::Incoming),
            serde_json::Value::String("transfer timed out".to_string()),
        );
        assert_eq!(event.name(), "incoming_cancel");
    }
}
