//! The public adapter facade.
//!
//! Owns the requester, resolver, dispatcher and connection manager, and
//! exposes the uniform ledger surface a payment-routing host calls into.

use crate::connection::{ConnectionManager, ConnectionState};
use crate::credentials::Credentials;
use crate::events::{EventDispatcher, EventHandler};
use crate::notifications::NotificationHandler;
use crate::requester::HttpRequester;
use crate::resolver::{LedgerMetadata, Resolver};
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

/// Ledger properties as exposed to the host caller
#[derive(Debug, Clone, Serialize)]
pub struct LedgerInfo {
    /// Routing-address prefix of this ledger
    pub prefix: String,
    /// Total significant digits
    pub precision: u32,
    /// Digits after the decimal point
    pub scale: u32,
    /// ISO currency code, if declared
    pub currency_code: Option<String>,
    /// Currency symbol, if declared
    pub currency_symbol: Option<String>,
    /// Connectors the ledger advertises
    pub connectors: Vec<serde_json::Value>,
}

/// Client adapter for one account on one remote ledger
pub struct LedgerAdapter {
    pub(crate) credentials: Credentials,
    pub(crate) requester: HttpRequester,
    pub(crate) resolver: Resolver,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) connection: ConnectionManager,
}

impl LedgerAdapter {
    /// Build an adapter for the given account credentials.
    pub fn new(credentials: Credentials) -> Result<Self> {
        if !credentials.prefix.ends_with('.') {
            return Err(Error::InvalidFields(format!(
                "ledger prefix {} must end with '.'",
                credentials.prefix
            )));
        }
        let requester = HttpRequester::new(&credentials)?;
        let resolver = Resolver::new(requester.clone(), credentials.account_uri.clone());
        Ok(Self {
            credentials,
            requester,
            resolver,
            dispatcher: EventDispatcher::new(),
            connection: ConnectionManager::new(),
        })
    }

    /// Register a handler for adapter events.
    pub async fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.dispatcher.subscribe(handler).await;
    }

    /// Resolve the ledger and open the notification subscription.
    ///
    /// Idempotent: returns immediately while connecting or connected.
    /// Resolves once the stream has opened; resolution or validation
    /// failures propagate and no stream is opened.
    pub async fn connect(&self) -> Result<()> {
        if self.connection.state().await != ConnectionState::Disconnected {
            return Ok(());
        }
        let ledger = self.resolver.resolve().await?;
        let ws_url = ledger
            .metadata
            .urls
            .account_transfers
            .replace(":name", &ledger.account_name);
        let notifications = Arc::new(NotificationHandler::new(
            Arc::clone(&ledger),
            self.credentials.prefix.clone(),
            self.dispatcher.clone(),
        ));
        self.connection
            .connect(
                ws_url,
                self.requester.basic_auth_header(),
                notifications,
                self.dispatcher.clone(),
            )
            .await
    }

    /// Intentionally close the notification subscription. Idempotent.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Whether the notification stream is currently open.
    pub async fn is_connected(&self) -> bool {
        self.connection.state().await == ConnectionState::Connected
    }

    /// Current connection lifecycle state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Ledger properties; resolved once, then served from cache with no
    /// further network round trips.
    pub async fn get_info(&self) -> Result<LedgerInfo> {
        let ledger = self.resolver.resolve().await?;
        let LedgerMetadata {
            precision,
            scale,
            currency_code,
            currency_symbol,
            connectors,
            ..
        } = ledger.metadata.clone();
        Ok(LedgerInfo {
            prefix: self.credentials.prefix.clone(),
            precision,
            scale,
            currency_code,
            currency_symbol,
            connectors,
        })
    }

    /// The routing-address prefix this adapter is configured for.
    pub fn get_prefix(&self) -> &str {
        &self.credentials.prefix
    }

    /// This account's own routing address (prefix + canonical name).
    pub async fn get_account(&self) -> Result<String> {
        let ledger = self.resolver.resolve().await?;
        Ok(format!("{}{}", self.credentials.prefix, ledger.account_name))
    }

    /// Current balance of the account, fetched fresh from the ledger.
    pub async fn get_balance(&self) -> Result<Decimal> {
        let account = self.resolver.fetch_account().await?;
        let balance = account.balance.ok_or_else(|| {
            Error::ExternalProtocol("account resource carries no balance".to_string())
        })?;
        let raw = match &balance {
            serde_json::Value::String(value) => value.clone(),
            serde_json::Value::Number(value) => value.to_string(),
            other => {
                return Err(Error::ExternalProtocol(format!(
                    "account balance has unexpected shape: {other}"
                )))
            }
        };
        Decimal::from_str(&raw)
            .map_err(|err| Error::ExternalProtocol(format!("account balance {raw}: {err}")))
    }
}
