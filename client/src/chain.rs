//! # External Interfaces
//!
//! The two collaborators this crate never implements for real: the wallet
//! provider injected by the browser extension, and the chain client that
//! talks to an RPC endpoint. Both are async traits so the session can be
//! driven by a live provider, a devnet, or a test double.
//!
//! Calls are described by [`ContractCall`]: a target contract, a method from
//! the fixed [`ContractMethod`] set, and positional JSON arguments. Integers
//! travel as decimal strings.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// An opaque on-chain address (account or contract).
///
/// The layer never inspects the contents; checksum validation belongs to the
/// wallet and the node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A connected user's address. "Disconnected" is `Option::<Account>::None`,
/// never an empty string.
pub type Account = Address;

// ---------------------------------------------------------------------------
// Contract Calls
// ---------------------------------------------------------------------------

/// The contract methods this layer knows how to call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContractMethod {
    /// ERC-20 `approve(spender, amount)`. State-changing.
    Approve,
    /// Pool `provide(amount)`. State-changing.
    Provide,
    /// ERC-20 `allowance(owner, spender)`. Read-only.
    Allowance,
    /// DAO `getAllRegulations()`. Read-only; returns the full ledger.
    GetAllRegulations,
}

impl ContractMethod {
    /// The method name as it appears in the contract ABI.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractMethod::Approve => "approve",
            ContractMethod::Provide => "provide",
            ContractMethod::Allowance => "allowance",
            ContractMethod::GetAllRegulations => "getAllRegulations",
        }
    }

    /// Whether the method changes chain state (and therefore needs signing).
    pub fn is_state_changing(&self) -> bool {
        matches!(self, ContractMethod::Approve | ContractMethod::Provide)
    }
}

impl fmt::Display for ContractMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully encoded contract invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractCall {
    /// The contract being called.
    pub contract: Address,
    /// Which method.
    pub method: ContractMethod,
    /// Positional arguments. Integers are decimal strings.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl ContractCall {
    pub fn new(contract: &Address, method: ContractMethod, args: Vec<serde_json::Value>) -> Self {
        Self {
            contract: contract.clone(),
            method,
            args,
        }
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Returned as soon as a transaction is handed to the chain client.
/// Confirmation is tracked separately via [`ChainClient::transaction_status`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHandle([u8; 32]);

impl TransactionHandle {
    pub fn from_bytes(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parses a transaction hash with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);
        Ok(Self(hash))
    }
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionHandle({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Where a dispatched transaction stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TxStatus {
    /// Submitted, not yet mined.
    Pending,
    /// Mined and executed successfully.
    Succeeded,
    /// Mined and reverted, or dropped.
    Failed { reason: String },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// What a wallet provider or chain client can report back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The user declined the prompt.
    #[error("user rejected the request")]
    UserRejected,

    /// The spend exceeds what the owner has approved.
    #[error("insufficient allowance: {0}")]
    InsufficientAllowance(String),

    /// Any other revert or rejection.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// The response could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The endpoint could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The injected wallet (browser extension or equivalent).
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompts for account access. `Ok(None)` means the user declined or has
    /// no accounts; that is an ordinary outcome, not a fault.
    async fn request_accounts(&self) -> Result<Option<Account>, ChainError>;

    /// Drops the permission grant made by `request_accounts`. Wallets that
    /// cannot revoke keep the default, which does nothing.
    async fn revoke(&self) -> Result<(), ChainError> {
        Ok(())
    }
}

/// An RPC-backed chain client able to sign on behalf of `from`.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Submits a state-changing call. Returns once the transaction is
    /// accepted for broadcast, not when it is mined.
    async fn call(&self, from: &Account, call: ContractCall) -> Result<TransactionHandle, ChainError>;

    /// Executes a read-only call against the latest state.
    async fn query(&self, call: ContractCall) -> Result<serde_json::Value, ChainError>;

    /// Reports the current status of a previously dispatched transaction.
    async fn transaction_status(&self, handle: &TransactionHandle) -> Result<TxStatus, ChainError>;
}
