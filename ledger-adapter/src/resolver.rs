//! Ledger metadata resolver.
//!
//! Given the account URI, discovers the owning ledger's base URL, the
//! account's canonical name, numeric precision/scale and the six required
//! service URLs. The result is immutable and cached for the connection's
//! lifetime; first resolution is single-flight so concurrent operations
//! trigger at most one round of network calls.

use crate::requester::{HttpRequester, RequestMode};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// The six service endpoints a ledger must advertise
#[derive(Debug, Clone, Serialize)]
pub struct ServiceUrls {
    /// Transfer submission (template parameter `:id`)
    pub transfer: String,
    /// Fulfillment read/write (template parameter `:id`)
    pub transfer_fulfillment: String,
    /// Transfer rejection (template parameter `:id`)
    pub transfer_rejection: String,
    /// Account lookup (template parameter `:name`)
    pub account: String,
    /// Per-account transfer subscription stream (template parameter `:name`)
    pub account_transfers: String,
    /// Messaging endpoint
    pub message: String,
}

impl ServiceUrls {
    fn from_map(mut map: HashMap<String, String>) -> Result<Self> {
        let mut take = |key: &str| {
            map.remove(key).ok_or_else(|| {
                Error::ExternalProtocol(format!("ledger metadata is missing required url {key}"))
            })
        };

        let urls = Self {
            transfer: take("transfer")?,
            transfer_fulfillment: take("transfer_fulfillment")?,
            transfer_rejection: take("transfer_rejection")?,
            account: take("account")?,
            account_transfers: take("account_transfers")?,
            message: take("message")?,
        };
        urls.validate()?;
        Ok(urls)
    }

    fn validate(&self) -> Result<()> {
        require_scheme("transfer", &self.transfer, &["http", "https"])?;
        require_scheme(
            "transfer_fulfillment",
            &self.transfer_fulfillment,
            &["http", "https"],
        )?;
        require_scheme(
            "transfer_rejection",
            &self.transfer_rejection,
            &["http", "https"],
        )?;
        require_scheme("account", &self.account, &["http", "https"])?;
        require_scheme("account_transfers", &self.account_transfers, &["ws", "wss"])?;
        require_scheme("message", &self.message, &["http", "https"])?;
        Ok(())
    }
}

fn require_scheme(name: &str, raw: &str, schemes: &[&str]) -> Result<()> {
    let url = reqwest::Url::parse(raw).map_err(|err| {
        Error::ExternalProtocol(format!("ledger metadata url {name} ({raw}) is not absolute: {err}"))
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(Error::ExternalProtocol(format!(
            "ledger metadata url {name} ({raw}) must use scheme {schemes:?}"
        )));
    }
    Ok(())
}

/// Immutable ledger metadata, valid for the connection's lifetime
#[derive(Debug, Clone, Serialize)]
pub struct LedgerMetadata {
    /// Total significant digits the ledger tracks
    pub precision: u32,
    /// Digits after the decimal point
    pub scale: u32,
    /// ISO currency code, if the ledger declares one
    pub currency_code: Option<String>,
    /// Currency symbol, if declared
    pub currency_symbol: Option<String>,
    /// Connectors the ledger advertises
    pub connectors: Vec<serde_json::Value>,
    /// Required service endpoints
    pub urls: ServiceUrls,
}

#[derive(Debug, Deserialize)]
struct RawLedgerMetadata {
    precision: Option<u32>,
    scale: Option<u32>,
    #[serde(default)]
    currency_code: Option<String>,
    #[serde(default)]
    currency_symbol: Option<String>,
    #[serde(default)]
    connectors: Vec<serde_json::Value>,
    #[serde(default)]
    urls: HashMap<String, String>,
}

/// The account resource as the ledger returns it
#[derive(Debug, Deserialize)]
pub(crate) struct AccountResource {
    pub ledger: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub balance: Option<serde_json::Value>,
}

/// Everything resolution produces: the ledger host, this account's
/// canonical name and URI, and the validated metadata.
#[derive(Debug)]
pub(crate) struct ResolvedLedger {
    pub host: String,
    pub account_name: String,
    pub account_uri: String,
    pub metadata: LedgerMetadata,
}

/// Single-flight, memoizing resolver
pub(crate) struct Resolver {
    requester: HttpRequester,
    account_uri: String,
    cached: RwLock<Option<Arc<ResolvedLedger>>>,
    flight: Mutex<()>,
}

impl Resolver {
    pub(crate) fn new(requester: HttpRequester, account_uri: String) -> Self {
        Self {
            requester,
            account_uri,
            cached: RwLock::new(None),
            flight: Mutex::new(()),
        }
    }

    /// Resolve the ledger, serving from cache after the first success.
    pub(crate) async fn resolve(&self) -> Result<Arc<ResolvedLedger>> {
        if let Some(resolved) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(resolved));
        }

        let _flight = self.flight.lock().await;
        // A concurrent caller may have resolved while we waited.
        if let Some(resolved) = self.cached.read().await.as_ref() {
            return Ok(Arc::clone(resolved));
        }

        let resolved = Arc::new(self.resolve_uncached().await?);
        *self.cached.write().await = Some(Arc::clone(&resolved));
        info!(
            host = %resolved.host,
            account = %resolved.account_name,
            precision = resolved.metadata.precision,
            scale = resolved.metadata.scale,
            "resolved ledger metadata"
        );
        Ok(resolved)
    }

    async fn resolve_uncached(&self) -> Result<ResolvedLedger> {
        let account = self.fetch_account().await?;

        let host = account.ledger.trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(Error::ExternalProtocol(format!(
                "account {} does not reference a ledger",
                self.account_uri
            )));
        }
        let account_name = match account.name {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(Error::ExternalProtocol(format!(
                    "account {} has no canonical name",
                    self.account_uri
                )))
            }
        };

        let response = self
            .requester
            .request("get_ledger_metadata", RequestMode::Operation, |client| {
                client.get(&host)
            })
            .await?;
        if !response.status().is_success() {
            return Err(Error::ExternalProtocol(format!(
                "ledger metadata request failed with {}",
                response.status()
            )));
        }
        let raw: RawLedgerMetadata = response.json().await.map_err(|err| {
            Error::ExternalProtocol(format!("ledger metadata is not valid JSON: {err}"))
        })?;

        let precision = raw.precision.ok_or_else(|| {
            Error::ExternalProtocol("ledger metadata is missing numeric precision".to_string())
        })?;
        let scale = raw.scale.ok_or_else(|| {
            Error::ExternalProtocol("ledger metadata is missing numeric scale".to_string())
        })?;
        let urls = ServiceUrls::from_map(raw.urls)?;

        Ok(ResolvedLedger {
            host,
            account_name,
            account_uri: self.account_uri.clone(),
            metadata: LedgerMetadata {
                precision,
                scale,
                currency_code: raw.currency_code,
                currency_symbol: raw.currency_symbol,
                connectors: raw.connectors,
                urls,
            },
        })
    }

    /// Fetch the account resource. 4xx here is terminal: a bad account URI
    /// must fail fast rather than retry.
    pub(crate) async fn fetch_account(&self) -> Result<AccountResource> {
        let response = self
            .requester
            .request(
                "resolve_account",
                RequestMode::AccountResolution,
                |client| client.get(&self.account_uri),
            )
            .await?;
        if !response.status().is_success() {
            return Err(Error::ExternalProtocol(format!(
                "account resolution failed with {}",
                response.status()
            )));
        }
        response.json().await.map_err(|err| {
            Error::ExternalProtocol(format!("account resource is not valid JSON: {err}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url_map() -> HashMap<String, String> {
        [
            ("transfer", "https://red.example/transfers/:id"),
            (
                "transfer_fulfillment",
                "https://red.example/transfers/:id/fulfillment",
            ),
            (
                "transfer_rejection",
                "https://red.example/transfers/:id/rejection",
            ),
            ("account", "https://red.example/accounts/:name"),
            (
                "account_transfers",
                "wss://red.example/accounts/:name/transfers",
            ),
            ("message", "https://red.example/messages"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn accepts_a_complete_url_map() {
        let urls = ServiceUrls::from_map(url_map()).unwrap();
        assert_eq!(urls.message, "https://red.example/messages");
    }

    #[test]
    fn rejects_a_missing_url() {
        let mut map = url_map();
        map.remove("transfer_rejection");
        let err = ServiceUrls::from_map(map).unwrap_err();
        assert!(matches!(err, Error::ExternalProtocol(_)));
        assert!(err.to_string().contains("transfer_rejection"));
    }

    #[test]
    fn rejects_a_request_scheme_on_the_subscription_url() {
        let mut map = url_map();
        map.insert(
            "account_transfers".to_string(),
            "https://red.example/accounts/:name/transfers".to_string(),
        );
        assert!(ServiceUrls::from_map(map).is_err());
    }

    #[test]
    fn rejects_a_streaming_scheme_on_a_request_url() {
        let mut map = url_map();
        map.insert(
            "transfer".to_string(),
            "wss://red.example/transfers/:id".to_string(),
        );
        assert!(ServiceUrls::from_map(map).is_err());
    }

    #[test]
    fn rejects_a_relative_url() {
        let mut map = url_map();
        map.insert("message".to_string(), "/messages".to_string());
        assert!(ServiceUrls::from_map(map).is_err());
    }
}
