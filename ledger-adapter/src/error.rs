//! Error taxonomy for ledger operations.
//!
//! Every public operation either resolves with a well-typed result or
//! fails with exactly one of these kinds. No bare transport error leaks:
//! transport failures either retry transparently inside the requester or
//! surface as [`Error::ExternalProtocol`] / [`Error::UnreachableEndpoint`].

use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Adapter errors
#[derive(Error, Debug)]
pub enum Error {
    /// A request field failed validation before or at the ledger
    #[error("invalid fields: {0}")]
    InvalidFields(String),

    /// The referenced transfer does not exist on the ledger
    #[error("transfer not found: {0}")]
    TransferNotFound(String),

    /// The referenced transfer carries no condition
    #[error("transfer not conditional: {0}")]
    TransferNotConditional(String),

    /// The transfer has no fulfillment (yet, or ever)
    #[error("missing fulfillment: {0}")]
    MissingFulfillment(String),

    /// The ledger refused the operation
    #[error("not accepted by ledger: {0}")]
    NotAccepted(String),

    /// The transfer was already rejected/rolled back
    #[error("transfer already rolled back: {0}")]
    AlreadyRolledBack(String),

    /// The transfer was already executed
    #[error("transfer already fulfilled: {0}")]
    AlreadyFulfilled(String),

    /// A different transfer already exists under this id
    #[error("duplicate transfer id: {0}")]
    DuplicateId(String),

    /// A notification arrived that does not concern this account/ledger
    #[error("unrelated notification: {0}")]
    UnrelatedNotification(String),

    /// The notification stream endpoint could not be reached
    #[error("unreachable endpoint: {0}")]
    UnreachableEndpoint(String),

    /// The remote ledger responded outside any known ledger contract
    #[error("external protocol failure: {0}")]
    ExternalProtocol(String),
}

impl Error {
    /// Stable kind label, for logging and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidFields(_) => "invalid_fields",
            Error::TransferNotFound(_) => "transfer_not_found",
            Error::TransferNotConditional(_) => "transfer_not_conditional",
            Error::MissingFulfillment(_) => "missing_fulfillment",
            Error::NotAccepted(_) => "not_accepted",
            Error::AlreadyRolledBack(_) => "already_rolled_back",
            Error::AlreadyFulfilled(_) => "already_fulfilled",
            Error::DuplicateId(_) => "duplicate_id",
            Error::UnrelatedNotification(_) => "unrelated_notification",
            Error::UnreachableEndpoint(_) => "unreachable_endpoint",
            Error::ExternalProtocol(_) => "external_protocol",
        }
    }
}

impl From<ledger_protocol::AddressError> for Error {
    fn from(err: ledger_protocol::AddressError) -> Self {
        Error::InvalidFields(err.to_string())
    }
}
