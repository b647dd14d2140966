//! Canonical transfer and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of a transfer the local account is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The local account is a credited party
    Incoming,
    /// The local account is a debited party
    Outgoing,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Incoming => write!(f, "incoming"),
            Direction::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// Normalized view of a ledger transfer, as relevant to one local account.
///
/// Derived from the ledger-native record for the duration of a single
/// notification or operation; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Canonical transfer id (the trailing UUID of the ledger-native id)
    pub id: Uuid,
    /// Which side the local account is on
    pub direction: Direction,
    /// Counterparty address (prefix + account name)
    pub account: String,
    /// Routing prefix of the ledger this transfer lives on
    pub ledger: String,
    /// Amount as the ledger's decimal string
    pub amount: String,
    /// Opaque payload data carried on the credit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Note the local account attached for itself on the debit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_to_self: Option<serde_json::Value>,
    /// Execution condition gating the transfer, if conditional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_condition: Option<String>,
    /// Cancellation condition, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_condition: Option<String>,
    /// Expiry after which the ledger rolls the transfer back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Case (atomic-mode escrow) identifiers attached to the transfer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<String>,
}

impl Transfer {
    /// True if the transfer carries an execution condition
    pub fn is_conditional(&self) -> bool {
        self.execution_condition.is_some()
    }
}

/// Normalized ledger message, derived per-notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Routing prefix of the ledger the message arrived on
    pub ledger: String,
    /// Sender (for inbound) or destination (for outbound) address
    pub account: String,
    /// Opaque payload
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Incoming.to_string(), "incoming");
        assert_eq!(Direction::Outgoing.to_string(), "outgoing");
    }

    #[test]
    fn transfer_serializes_without_empty_optionals() {
        let transfer = Transfer {
            id: Uuid::nil(),
            direction: Direction::Incoming,
            account: "example.red.alice".to_string(),
            ledger: "example.red.".to_string(),
            amount: "10".to_string(),
            data: None,
            note_to_self: None,
            execution_condition: None,
            cancellation_condition: None,
            expires_at: None,
            cases: Vec::new(),
        };

        let json = serde_json::to_value(&transfer).unwrap();
        assert!(json.get("execution_condition").is_none());
        assert!(json.get("cases").is_none());
        assert_eq!(json["direction"], "incoming");
    }
}
