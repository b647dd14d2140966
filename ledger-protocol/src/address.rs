//! Address parsing within a ledger's routing prefix.
//!
//! An externally-visible address must begin with the adapter's ledger
//! prefix. The remainder, split on `.`, yields the account's username
//! (first segment) and an opaque additional-routing suffix (the rest,
//! rejoined).

use thiserror::Error;

/// Address parsing failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    /// The address does not start with the expected ledger prefix
    #[error("address {address} does not start with ledger prefix {prefix}")]
    PrefixMismatch {
        /// The offending address
        address: String,
        /// The expected prefix
        prefix: String,
    },
    /// The address has no username after the prefix
    #[error("address {0} has no local part")]
    MissingUsername(String),
}

/// An address decomposed against a ledger prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    /// Account username on the ledger (first segment after the prefix)
    pub username: String,
    /// Remaining routing segments, rejoined on `.`; empty if none
    pub additional: String,
}

/// Split `address` into username and additional-routing suffix, requiring
/// it to live under `prefix`.
pub fn parse_address(prefix: &str, address: &str) -> Result<ParsedAddress, AddressError> {
    let local = address
        .strip_prefix(prefix)
        .ok_or_else(|| AddressError::PrefixMismatch {
            address: address.to_string(),
            prefix: prefix.to_string(),
        })?;

    let mut segments = local.split('.');
    let username = match segments.next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(AddressError::MissingUsername(address.to_string())),
    };

    Ok(ParsedAddress {
        username,
        additional: segments.collect::<Vec<_>>().join("."),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_username_and_suffix() {
        let parsed = parse_address("example.red.", "example.red.alice.ilpdemo.receiver").unwrap();
        assert_eq!(parsed.username, "alice");
        assert_eq!(parsed.additional, "ilpdemo.receiver");
    }

    #[test]
    fn bare_username_has_empty_suffix() {
        let parsed = parse_address("example.red.", "example.red.bob").unwrap();
        assert_eq!(parsed.username, "bob");
        assert_eq!(parsed.additional, "");
    }

    #[test]
    fn rejects_foreign_prefix() {
        let err = parse_address("example.red.", "example.blue.bob").unwrap_err();
        assert!(matches!(err, AddressError::PrefixMismatch { .. }));
    }

    #[test]
    fn rejects_prefix_without_local_part() {
        let err = parse_address("example.red.", "example.red.").unwrap_err();
        assert!(matches!(err, AddressError::MissingUsername(_)));
    }
}
