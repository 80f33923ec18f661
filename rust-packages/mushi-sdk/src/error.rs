use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

use crate::submitter::{ExpiryReason, FailureReport};

pub type MushiResult<T> = Result<T, MushiError>;

#[derive(Error, Debug)]
pub enum MushiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("timestamp {0} is outside 1970-01-01..=9999-12-31")]
    InvalidTimestamp(i64),

    #[error("{kind} account not found at {address}")]
    AccountNotFound { kind: &'static str, address: Pubkey },

    #[error("failed to decode {kind} at {address}: {reason}")]
    Decode {
        kind: &'static str,
        address: Pubkey,
        reason: String,
    },

    #[error("failed to encode {0}")]
    Encode(String),

    #[error("signing failed: {0}")]
    Sign(String),

    #[error("RPC client error: {0}")]
    Rpc(String),

    #[error("transaction {signature} failed: {report}")]
    TransactionFailed {
        signature: Signature,
        report: FailureReport,
    },

    #[error("transaction expired: {0}")]
    TransactionExpired(ExpiryReason),

    #[error("configuration error: {0}")]
    Config(String),
}

impl MushiError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Errors the caller may retry by rebuilding and re-signing the batch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::TransactionExpired(_))
    }
}

impl From<solana_client::client_error::ClientError> for MushiError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        Self::Rpc(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(MushiError::Rpc("timeout".into()).is_retryable());
        assert!(MushiError::TransactionExpired(ExpiryReason::BlockhashExpired).is_retryable());
        assert!(!MushiError::invalid_input("zero amount").is_retryable());
        assert!(!MushiError::Sign("no key".into()).is_retryable());
    }

    #[test]
    fn not_found_names_the_record() {
        let err = MushiError::AccountNotFound {
            kind: "UserLoan",
            address: Pubkey::default(),
        };
        assert!(err.to_string().starts_with("UserLoan account not found"));
    }
}
