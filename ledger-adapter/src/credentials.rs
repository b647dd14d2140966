//! Adapter credentials

use serde::Deserialize;

/// Credentials and addressing for one ledger account.
///
/// Immutable after construction; the account's canonical name resolved
/// during connection setup lives on the resolved-ledger record, not here.
/// `Deserialize` so a host process can embed this in its own config layer.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    /// URI of the account resource on the ledger
    pub account_uri: String,
    /// Username for HTTP basic auth; defaults to the trailing path
    /// segment of `account_uri` when absent
    #[serde(default)]
    pub username: Option<String>,
    /// Password for HTTP basic auth
    pub password: String,
    /// Routing-address prefix this ledger occupies; must end with `.`
    pub prefix: String,
    /// Optional client certificate + key, PEM encoded
    #[serde(default)]
    pub client_cert_pem: Option<Vec<u8>>,
}

impl Credentials {
    /// Username to authenticate with: the configured one, or the trailing
    /// path segment of the account URI.
    pub fn auth_username(&self) -> &str {
        match &self.username {
            Some(name) => name,
            None => self
                .account_uri
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default(),
        }
    }
}
