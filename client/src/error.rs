//! Error types for the interaction layer.
//!
//! Every fallible operation exposed to the presentation layer returns a
//! [`ClientError`]. The first three variants are precondition failures and
//! are always raised before any network call is made.

use thiserror::Error;

use crate::chain::ChainError;

/// Errors surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The operation needs a connected account and there is none.
    #[error("no wallet account is connected")]
    NotConnected,

    /// The amount is non-numeric, negative, or does not fit in 256 bits.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The amount must be strictly greater than zero.
    #[error("amount must be greater than zero")]
    AmountNotPositive,

    /// The chain refused a spend that exceeds the approved allowance.
    #[error("insufficient allowance: {0}")]
    InsufficientAllowance(String),

    /// No wallet provider is reachable.
    #[error("no wallet provider available")]
    ProviderUnavailable,

    /// A ledger poll cycle failed. Never fatal to the session.
    #[error("ledger fetch failed: {0}")]
    FetchFailed(String),

    /// The user declined the request in their wallet.
    #[error("request rejected by user")]
    UserRejected,

    /// The chain rejected or reverted the call for another reason.
    #[error("rejected on-chain: {0}")]
    ChainRejected(String),

    /// The chain answered with something we could not decode.
    #[error("malformed chain response: {0}")]
    MalformedResponse(String),

    /// The RPC endpoint could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<ChainError> for ClientError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::UserRejected => ClientError::UserRejected,
            ChainError::InsufficientAllowance(reason) => ClientError::InsufficientAllowance(reason),
            ChainError::Reverted(reason) => ClientError::ChainRejected(reason),
            ChainError::Decode(reason) => ClientError::MalformedResponse(reason),
            ChainError::Transport(reason) => ClientError::Transport(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowance_rejection_maps_to_named_kind() {
        let err: ClientError = ChainError::InsufficientAllowance("0 < 5".into()).into();
        assert_eq!(err, ClientError::InsufficientAllowance("0 < 5".into()));
    }

    #[test]
    fn user_rejection_is_distinct_from_revert() {
        let rejected: ClientError = ChainError::UserRejected.into();
        let reverted: ClientError = ChainError::Reverted("paused".into()).into();
        assert_eq!(rejected, ClientError::UserRejected);
        assert_eq!(reverted, ClientError::ChainRejected("paused".into()));
    }
}
