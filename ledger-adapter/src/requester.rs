//! Resilient HTTP requester.
//!
//! Issues a single HTTP call with unbounded exponential-backoff retry for
//! transport-level failures (connection refused, timeout, DNS). Any HTTP
//! response stops the retry loop and is returned to the caller as-is,
//! including 4xx/5xx. The exception is account-resolution mode, where a
//! 4xx is terminal: a bad account URI must fail fast, while a busy or
//! restarting ledger is retried transparently.

use crate::credentials::Credentials;
use crate::metrics::{LEDGER_REQUESTS_TOTAL, LEDGER_REQUEST_DURATION, LEDGER_REQUEST_RETRIES_TOTAL};
use crate::{Error, Result, MAX_RETRY_DELAY_MS, MIN_RETRY_DELAY_MS, RETRY_MULTIPLIER};
use backoff::future::retry_notify;
use backoff::ExponentialBackoff;
use base64::Engine;
use std::time::Duration;
use tracing::warn;

/// How client-error responses are treated for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestMode {
    /// 4xx responses are terminal failures (account resolution path)
    AccountResolution,
    /// All HTTP responses are returned to the caller for mapping
    Operation,
}

/// The retry policy every ledger request runs under: first delay
/// `MIN_RETRY_DELAY_MS`, grown by `RETRY_MULTIPLIER` per attempt, capped
/// at `MAX_RETRY_DELAY_MS`, never giving up.
pub(crate) fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: Duration::from_millis(MIN_RETRY_DELAY_MS),
        initial_interval: Duration::from_millis(MIN_RETRY_DELAY_MS),
        randomization_factor: 0.0,
        multiplier: RETRY_MULTIPLIER,
        max_interval: Duration::from_millis(MAX_RETRY_DELAY_MS),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

/// HTTP requester carrying the adapter's auth material
#[derive(Clone)]
pub(crate) struct HttpRequester {
    client: reqwest::Client,
    username: String,
    password: String,
}

impl HttpRequester {
    pub(crate) fn new(credentials: &Credentials) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(pem) = &credentials.client_cert_pem {
            let identity = reqwest::Identity::from_pem(pem)
                .map_err(|err| Error::InvalidFields(format!("client certificate: {err}")))?;
            builder = builder.identity(identity);
        }
        let client = builder
            .build()
            .map_err(|err| Error::ExternalProtocol(format!("building HTTP client: {err}")))?;

        Ok(Self {
            client,
            username: credentials.auth_username().to_string(),
            password: credentials.password.clone(),
        })
    }

    /// `Authorization` header value for surfaces that cannot use
    /// reqwest's own basic auth (the websocket handshake).
    pub(crate) fn basic_auth_header(&self) -> String {
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        format!("Basic {credentials}")
    }

    /// Perform one logical request, rebuilding it per attempt via `build`.
    ///
    /// `operation` names the caller for logs/metrics and failure messages.
    pub(crate) async fn request<F>(
        &self,
        operation: &str,
        mode: RequestMode,
        build: F,
    ) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let timer = LEDGER_REQUEST_DURATION
            .with_label_values(&[operation])
            .start_timer();

        let result = retry_notify(
            retry_policy(),
            || async {
                let response = build(&self.client)
                    .basic_auth(&self.username, Some(&self.password))
                    .send()
                    .await
                    .map_err(|err| classify_transport(operation, err))?;

                if mode == RequestMode::AccountResolution && response.status().is_client_error() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(backoff::Error::permanent(Error::ExternalProtocol(format!(
                        "{operation} rejected with {status}: {body}"
                    ))));
                }

                Ok(response)
            },
            |err: Error, delay: Duration| {
                LEDGER_REQUEST_RETRIES_TOTAL
                    .with_label_values(&[operation])
                    .inc();
                warn!(
                    operation,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "transient ledger request failure, retrying"
                );
            },
        )
        .await;

        timer.observe_duration();
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        LEDGER_REQUESTS_TOTAL
            .with_label_values(&[operation, outcome])
            .inc();

        result
    }
}

/// Transport failures retry forever; a request we could not even build is
/// a contract violation and terminal.
fn classify_transport(operation: &str, err: reqwest::Error) -> backoff::Error<Error> {
    if err.is_builder() {
        backoff::Error::permanent(Error::ExternalProtocol(format!(
            "{operation}: malformed request: {err}"
        )))
    } else {
        backoff::Error::transient(Error::UnreachableEndpoint(format!("{operation}: {err}")))
    }
}
