use thiserror::Error;

/// Errors returned by a [`crate::LedgerClient`].
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Endpoint unreachable, timed out, or answered a query with an error.
    #[error("network error: {0}")]
    Network(String),

    /// Rejected locally before any request was made.
    #[error("invalid address: {0}")]
    AddressFormat(String),

    /// The ledger refused the transaction, or it landed with an error.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_rejected() {
        let err = LedgerError::Rejected("Blockhash not found".into());
        assert_eq!(err.to_string(), "transaction rejected: Blockhash not found");
    }

    #[test]
    fn display_address_format() {
        let err = LedgerError::AddressFormat("expected 32 bytes, got 1".into());
        assert!(err.to_string().starts_with("invalid address"));
    }
}
