//! Notification normalization and dispatch.
//!
//! Decodes inbound stream frames, validates they concern this
//! account/ledger, maps ledger transfer states into the canonical event
//! taxonomy and emits through the dispatcher. A malformed frame is logged
//! and dropped (the remote sender cannot be corrected); a well-formed
//! frame that concerns a foreign ledger or account escalates as an
//! unrelated-notification error, since it indicates a misconfigured
//! subscription.

use crate::events::EventDispatcher;
use crate::metrics::NOTIFICATIONS_TOTAL;
use crate::resolver::ResolvedLedger;
use crate::wire::{
    canonical_transfer_id, NotificationEnvelope, RelatedResources, WireEntry, WireMessage,
    WireTransfer,
};
use crate::{Error, Result};
use base64::Engine;
use ledger_protocol::{Direction, LedgerEvent, Message, Transfer};
use std::sync::Arc;
use tracing::{debug, warn};

/// Generic reason attached when the ledger rolls a transfer back with no
/// explicit rejection
const TIMED_OUT_REASON: &str = "transfer timed out";

pub(crate) struct NotificationHandler {
    ledger: Arc<ResolvedLedger>,
    prefix: String,
    dispatcher: EventDispatcher,
}

impl NotificationHandler {
    pub(crate) fn new(
        ledger: Arc<ResolvedLedger>,
        prefix: String,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            ledger,
            prefix,
            dispatcher,
        }
    }

    /// Process one raw frame from the notification stream.
    pub(crate) async fn handle(&self, raw: &str) -> Result<()> {
        let envelope: NotificationEnvelope = match serde_json::from_str(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping malformed notification frame");
                return Ok(());
            }
        };
        NOTIFICATIONS_TOTAL
            .with_label_values(&[envelope.kind.as_str()])
            .inc();

        match envelope.kind.as_str() {
            "connect" => {
                debug!("ledger acknowledged the subscription");
                Ok(())
            }
            "transfer" => self.handle_transfer(envelope).await,
            "message" => self.handle_message(envelope).await,
            other => Err(Error::UnrelatedNotification(format!(
                "unsupported notification type {other}"
            ))),
        }
    }

    async fn handle_transfer(&self, envelope: NotificationEnvelope) -> Result<()> {
        let resource = envelope.resource.ok_or_else(|| {
            Error::UnrelatedNotification("transfer notification carries no resource".to_string())
        })?;
        let wire: WireTransfer = serde_json::from_value(resource).map_err(|err| {
            Error::UnrelatedNotification(format!("transfer resource did not parse: {err}"))
        })?;
        self.require_local_ledger(&wire.ledger)?;
        let related = envelope.related_resources.unwrap_or_default();

        // A transfer may involve this account on both sides (self-transfer);
        // each side is normalized and emitted independently, credits first.
        let mut matched = false;
        for entry in &wire.credits {
            if self.is_local_account(&entry.account) {
                matched = true;
                self.process_side(&wire, entry, Direction::Incoming, &related)
                    .await?;
            }
        }
        for entry in &wire.debits {
            if self.is_local_account(&entry.account) {
                matched = true;
                self.process_side(&wire, entry, Direction::Outgoing, &related)
                    .await?;
            }
        }

        if !matched {
            return Err(Error::UnrelatedNotification(format!(
                "transfer {} does not involve account {}",
                wire.id, self.ledger.account_uri
            )));
        }
        Ok(())
    }

    async fn handle_message(&self, envelope: NotificationEnvelope) -> Result<()> {
        let resource = envelope.resource.ok_or_else(|| {
            Error::UnrelatedNotification("message notification carries no resource".to_string())
        })?;
        let wire: WireMessage = serde_json::from_value(resource).map_err(|err| {
            Error::UnrelatedNotification(format!("message resource did not parse: {err}"))
        })?;
        self.require_local_ledger(&wire.ledger)?;

        let sender = wire.from.or(wire.account).ok_or_else(|| {
            Error::UnrelatedNotification("message carries no sender".to_string())
        })?;
        let message = Message {
            ledger: self.prefix.clone(),
            account: self.address_for(&sender)?,
            data: wire.data,
        };
        self.dispatcher
            .emit(LedgerEvent::IncomingMessage(message))
            .await;
        Ok(())
    }

    async fn process_side(
        &self,
        wire: &WireTransfer,
        entry: &WireEntry,
        direction: Direction,
        related: &RelatedResources,
    ) -> Result<()> {
        let transfer = self.normalize(wire, entry, direction)?;

        match wire.state.as_deref() {
            Some("prepared") => {
                self.dispatcher.emit(LedgerEvent::prepare(transfer)).await;
            }
            Some("executed") => {
                // Two independent checks: an unconditional transfer settles
                // directly; a conditional one settles through its proof.
                if transfer.execution_condition.is_none() {
                    self.dispatcher
                        .emit(LedgerEvent::transfer(transfer.clone()))
                        .await;
                }
                if let Some(proof) = &related.execution_condition_fulfillment {
                    self.dispatcher
                        .emit(LedgerEvent::fulfill(transfer, proof.clone()))
                        .await;
                }
            }
            Some("rejected") => {
                if let Some(proof) = &related.cancellation_condition_fulfillment {
                    self.dispatcher
                        .emit(LedgerEvent::cancel(
                            transfer,
                            serde_json::Value::String(proof.clone()),
                        ))
                        .await;
                } else if let Some(flagged) =
                    wire.credits.iter().find(|credit| credit.rejected == Some(true))
                {
                    let reason = decode_rejection_message(flagged.rejection_message.as_deref());
                    self.dispatcher
                        .emit(LedgerEvent::reject(transfer, reason))
                        .await;
                } else {
                    self.dispatcher
                        .emit(LedgerEvent::cancel(
                            transfer,
                            serde_json::Value::String(TIMED_OUT_REASON.to_string()),
                        ))
                        .await;
                }
            }
            state => {
                debug!(id = %wire.id, ?state, "no event for transfer state");
            }
        }
        Ok(())
    }

    fn normalize(
        &self,
        wire: &WireTransfer,
        entry: &WireEntry,
        direction: Direction,
    ) -> Result<Transfer> {
        let id = canonical_transfer_id(&wire.id)?;

        let counterparty_side = match direction {
            Direction::Incoming => &wire.debits,
            Direction::Outgoing => &wire.credits,
        };
        let counterparty = counterparty_side.first().ok_or_else(|| {
            Error::UnrelatedNotification(format!(
                "transfer {} has no counterparty entries",
                wire.id
            ))
        })?;

        // Payload data travels on the credit; a debit memo is the sender's
        // note to itself.
        let (data, note_to_self) = match direction {
            Direction::Incoming => (entry.memo.clone(), None),
            Direction::Outgoing => (
                wire.credits.first().and_then(|credit| credit.memo.clone()),
                entry.memo.clone(),
            ),
        };

        Ok(Transfer {
            id,
            direction,
            account: self.address_for(&counterparty.account)?,
            ledger: self.prefix.clone(),
            amount: entry.amount.clone(),
            data,
            note_to_self,
            execution_condition: wire.execution_condition.clone(),
            cancellation_condition: wire.cancellation_condition.clone(),
            expires_at: wire.expires_at,
            cases: wire
                .additional_info
                .as_ref()
                .map(|info| info.cases.clone())
                .unwrap_or_default(),
        })
    }

    fn require_local_ledger(&self, wire_ledger: &str) -> Result<()> {
        if wire_ledger.trim_end_matches('/') != self.ledger.host {
            warn!(
                notification_ledger = %wire_ledger,
                local_ledger = %self.ledger.host,
                "notification for a foreign ledger"
            );
            return Err(Error::UnrelatedNotification(format!(
                "notification belongs to foreign ledger {wire_ledger}"
            )));
        }
        Ok(())
    }

    fn is_local_account(&self, account_uri: &str) -> bool {
        account_uri.trim_end_matches('/') == self.ledger.account_uri.trim_end_matches('/')
    }

    /// Routing address for a ledger-local account URI
    fn address_for(&self, account_uri: &str) -> Result<String> {
        let name = account_uri
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| {
                Error::UnrelatedNotification(format!(
                    "cannot derive an account name from {account_uri}"
                ))
            })?;
        Ok(format!("{}{}", self.prefix, name))
    }
}

/// Decode a base64 rejection message; the payload is usually JSON, but a
/// payload that fails to decode surfaces as the raw string rather than
/// being dropped.
fn decode_rejection_message(encoded: Option<&str>) -> serde_json::Value {
    let Some(encoded) = encoded else {
        return serde_json::Value::String(TIMED_OUT_REASON.to_string());
    };
    match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        },
        Err(err) => {
            warn!(error = %err, "rejection message is not valid base64");
            serde_json::Value::String(encoded.to_string())
        }
    }
}
