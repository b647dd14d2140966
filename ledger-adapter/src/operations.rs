//! Transfer operations.
//!
//! Each operation validates its input before any network call, builds the
//! ledger-native request, executes it through the resilient requester and
//! maps remote error codes into the canonical taxonomy.

use crate::adapter::LedgerAdapter;
use crate::requester::RequestMode;
use crate::wire::{AdditionalInfo, RemoteErrorBody, WireEntry, WireMessage, WireTransfer};
use crate::{Error, Result};
use ledger_protocol::{parse_address, Message, Transfer};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

impl LedgerAdapter {
    /// Send an adapter-level message to another account on this ledger.
    pub async fn send_message(&self, message: &Message) -> Result<()> {
        if message.ledger != self.credentials.prefix {
            warn!(
                message_ledger = %message.ledger,
                prefix = %self.credentials.prefix,
                "message ledger does not match adapter prefix"
            );
            return Err(Error::InvalidFields(
                "message ledger does not match adapter prefix".to_string(),
            ));
        }
        if message.account.is_empty() {
            return Err(Error::InvalidFields(
                "message account must be a non-empty address".to_string(),
            ));
        }
        if message.data.is_null() {
            return Err(Error::InvalidFields("message data is required".to_string()));
        }
        let destination = parse_address(&self.credentials.prefix, &message.account)?;

        let ledger = self.resolver.resolve().await?;
        let body = WireMessage {
            ledger: ledger.host.clone(),
            from: Some(ledger.account_uri.clone()),
            to: Some(
                ledger
                    .metadata
                    .urls
                    .account
                    .replace(":name", &destination.username),
            ),
            account: None,
            data: message.data.clone(),
        };

        let response = self
            .requester
            .request("send_message", RequestMode::Operation, |client| {
                client.post(&ledger.metadata.urls.message).json(&body)
            })
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        let (status, remote) = remote_error(response).await;
        Err(match remote.id.as_str() {
            "InvalidBodyError" => Error::InvalidFields(remote.message),
            _ => Error::NotAccepted(format!(
                "message submission failed with {status}: {}",
                remote.message
            )),
        })
    }

    /// Submit a transfer debiting this account.
    pub async fn send_transfer(&self, transfer: &Transfer) -> Result<()> {
        if transfer.account.is_empty() {
            return Err(Error::InvalidFields(
                "transfer account must be a non-empty address".to_string(),
            ));
        }
        let amount = Decimal::from_str(&transfer.amount).map_err(|err| {
            Error::InvalidFields(format!("transfer amount {}: {err}", transfer.amount))
        })?;
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidFields(format!(
                "transfer amount must be positive, got {}",
                transfer.amount
            )));
        }
        if transfer.ledger != self.credentials.prefix {
            warn!(
                transfer_ledger = %transfer.ledger,
                prefix = %self.credentials.prefix,
                "transfer ledger does not match adapter prefix"
            );
        }
        let destination = parse_address(&self.credentials.prefix, &transfer.account)?;

        let ledger = self.resolver.resolve().await?;
        let urls = &ledger.metadata.urls;
        let id = transfer.id.to_string();
        let transfer_url = urls.transfer.replace(":id", &id);
        let fulfillment_url = urls.transfer_fulfillment.replace(":id", &id);

        let body = WireTransfer {
            id: transfer_url.clone(),
            ledger: ledger.host.clone(),
            debits: vec![WireEntry {
                account: ledger.account_uri.clone(),
                amount: transfer.amount.clone(),
                memo: transfer.note_to_self.clone(),
                authorized: Some(true),
                rejected: None,
                rejection_message: None,
            }],
            credits: vec![WireEntry {
                account: urls.account.replace(":name", &destination.username),
                amount: transfer.amount.clone(),
                memo: transfer.data.clone(),
                authorized: None,
                rejected: None,
                rejection_message: None,
            }],
            execution_condition: transfer.execution_condition.clone(),
            cancellation_condition: transfer.cancellation_condition.clone(),
            expires_at: transfer.expires_at,
            state: None,
            additional_info: if transfer.cases.is_empty() {
                None
            } else {
                Some(AdditionalInfo {
                    cases: transfer.cases.clone(),
                })
            },
        };

        // Atomic mode: the fulfillment endpoint must be registered as a
        // notification target on every case before the transfer exists.
        for case in &transfer.cases {
            let targets_url = format!("{}/targets", case.trim_end_matches('/'));
            let targets = vec![fulfillment_url.clone()];
            let response = self
                .requester
                .request("register_case_target", RequestMode::Operation, |client| {
                    client.post(&targets_url).json(&targets)
                })
                .await?;
            if !response.status().is_success() {
                return Err(Error::ExternalProtocol(format!(
                    "case target registration on {case} failed with {}",
                    response.status()
                )));
            }
        }

        let response = self
            .requester
            .request("send_transfer", RequestMode::Operation, |client| {
                client.put(&transfer_url).json(&body)
            })
            .await?;
        if response.status().is_success() {
            info!(id = %transfer.id, amount = %transfer.amount, "transfer submitted");
            return Ok(());
        }
        let (status, remote) = remote_error(response).await;
        Err(match remote.id.as_str() {
            "InvalidBodyError" => Error::InvalidFields(remote.message),
            "InvalidModificationError" => Error::DuplicateId(remote.message),
            _ => Error::NotAccepted(format!(
                "transfer submission failed with {status}: {}",
                remote.message
            )),
        })
    }

    /// Submit the fulfillment proof for a conditional transfer.
    pub async fn fulfill_condition(&self, transfer_id: Uuid, fulfillment: &str) -> Result<()> {
        let ledger = self.resolver.resolve().await?;
        let url = ledger
            .metadata
            .urls
            .transfer_fulfillment
            .replace(":id", &transfer_id.to_string());
        let body = fulfillment.to_string();

        let response = self
            .requester
            .request("fulfill_condition", RequestMode::Operation, |client| {
                client
                    .put(&url)
                    .header(CONTENT_TYPE, "text/plain")
                    .body(body.clone())
            })
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                info!(id = %transfer_id, "fulfillment submitted");
                Ok(())
            }
            _ => {
                let (status, remote) = remote_error(response).await;
                Err(match remote.id.as_str() {
                    "InvalidBodyError" => Error::InvalidFields(remote.message),
                    "UnmetConditionError" => Error::NotAccepted(remote.message),
                    "TransferNotConditionalError" => Error::TransferNotConditional(remote.message),
                    "NotFoundError" => Error::TransferNotFound(remote.message),
                    "InvalidModificationError" if remote.message.contains("rejected") => {
                        Error::AlreadyRolledBack(remote.message)
                    }
                    _ => Error::ExternalProtocol(format!(
                        "fulfillment submission failed with {status}: {}",
                        remote.message
                    )),
                })
            }
        }
    }

    /// Fetch the fulfillment of an executed conditional transfer.
    pub async fn get_fulfillment(&self, transfer_id: Uuid) -> Result<String> {
        let ledger = self.resolver.resolve().await?;
        let url = ledger
            .metadata
            .urls
            .transfer_fulfillment
            .replace(":id", &transfer_id.to_string());

        let response = self
            .requester
            .request("get_fulfillment", RequestMode::Operation, |client| {
                client.get(&url)
            })
            .await?;
        if response.status() == StatusCode::OK {
            return response.text().await.map_err(|err| {
                Error::ExternalProtocol(format!("reading fulfillment body: {err}"))
            });
        }
        let (status, remote) = remote_error(response).await;
        Err(match remote.id.as_str() {
            "MissingFulfillmentError" => Error::MissingFulfillment(remote.message),
            "TransferNotFoundError" => Error::TransferNotFound(remote.message),
            "AlreadyRolledBackError" => Error::AlreadyRolledBack(remote.message),
            "TransferNotConditionalError" => Error::TransferNotConditional(remote.message),
            _ => Error::ExternalProtocol(format!(
                "fulfillment lookup failed with {status}: {}",
                remote.message
            )),
        })
    }

    /// Reject an incoming conditional transfer with a reason.
    pub async fn reject_incoming_transfer(
        &self,
        transfer_id: Uuid,
        reason: serde_json::Value,
    ) -> Result<()> {
        let ledger = self.resolver.resolve().await?;
        let url = ledger
            .metadata
            .urls
            .transfer_rejection
            .replace(":id", &transfer_id.to_string());

        let response = self
            .requester
            .request(
                "reject_incoming_transfer",
                RequestMode::Operation,
                |client| client.put(&url).json(&reason),
            )
            .await?;
        if response.status().is_success() {
            info!(id = %transfer_id, "transfer rejected");
            return Ok(());
        }
        let (status, remote) = remote_error(response).await;
        Err(match remote.id.as_str() {
            "UnauthorizedError" => Error::NotAccepted(remote.message),
            "NotFoundError" => Error::TransferNotFound(remote.message),
            "InvalidModificationError" => Error::AlreadyFulfilled(remote.message),
            "TransferNotConditionalError" => Error::TransferNotConditional(remote.message),
            _ => Error::ExternalProtocol(format!(
                "transfer rejection failed with {status}: {}",
                remote.message
            )),
        })
    }
}

/// Read the remote `{id, message}` error body; an unparsable body maps to
/// the catch-all arm of each operation's table.
async fn remote_error(response: reqwest::Response) -> (StatusCode, RemoteErrorBody) {
    let status = response.status();
    let body = response.json::<RemoteErrorBody>().await.unwrap_or_default();
    (status, body)
}
