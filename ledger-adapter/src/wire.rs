//! Ledger-native wire format.
//!
//! The shapes the remote ledger actually speaks: notification envelopes,
//! the transfer record with its debit/credit parties, message resources,
//! and the `{id, message}` error body. Everything here is an internal
//! detail; the public surface speaks only the canonical model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Inbound notification frame: `{type, resource, related_resources}`
#[derive(Debug, Deserialize)]
pub(crate) struct NotificationEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub resource: Option<serde_json::Value>,
    #[serde(default)]
    pub related_resources: Option<RelatedResources>,
}

/// Proofs that can accompany a transfer notification
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RelatedResources {
    #[serde(default)]
    pub execution_condition_fulfillment: Option<String>,
    #[serde(default)]
    pub cancellation_condition_fulfillment: Option<String>,
}

/// Ledger-native transfer record, used both for notification resources
/// and as the body of a transfer submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireTransfer {
    pub id: String,
    pub ledger: String,
    #[serde(default)]
    pub debits: Vec<WireEntry>,
    #[serde(default)]
    pub credits: Vec<WireEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<AdditionalInfo>,
}

/// Extra transfer attributes; only atomic-mode case URIs matter here
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct AdditionalInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<String>,
}

/// One debit or credit party of a ledger transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireEntry {
    pub account: String,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_message: Option<String>,
}

/// Message resource, inbound and outbound
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub ledger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub data: serde_json::Value,
}

/// Remote application error body
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RemoteErrorBody {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
}

/// Canonicalize a ledger-native transfer id to its trailing UUID.
pub(crate) fn canonical_transfer_id(native: &str) -> Result<Uuid> {
    let tail = native
        .len()
        .checked_sub(36)
        .and_then(|start| native.get(start..))
        .ok_or_else(|| {
            Error::UnrelatedNotification(format!("transfer id {native} does not end in a UUID"))
        })?;
    Uuid::parse_str(tail).map_err(|err| {
        Error::UnrelatedNotification(format!("transfer id {native} does not end in a UUID: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_is_the_trailing_uuid() {
        let id =
            canonical_transfer_id("https://red.example/transfers/6851929f-5a91-4d02-b9f4-4ae6b7f1768c")
                .unwrap();
        assert_eq!(id.to_string(), "6851929f-5a91-4d02-b9f4-4ae6b7f1768c");
    }

    #[test]
    fn bare_uuid_is_accepted() {
        assert!(canonical_transfer_id("6851929f-5a91-4d02-b9f4-4ae6b7f1768c").is_ok());
    }

    #[test]
    fn short_or_malformed_ids_are_rejected() {
        assert!(canonical_transfer_id("transfers/42").is_err());
        assert!(canonical_transfer_id("https://red.example/transfers/not-a-uuid-aaaaaaaaaaaaaaaaaaaaaa").is_err());
    }
}
