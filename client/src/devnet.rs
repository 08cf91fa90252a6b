//! # In-Memory Devnet
//!
//! A wallet and a chain that live entirely in process. Used by the test
//! suites and by `esd-console simulate` to exercise the whole session without
//! an RPC endpoint.
//!
//! The chain models exactly what the dashboard touches:
//!
//! - ERC-20 allowances, keyed by `(token, owner, spender)`.
//! - Pools registered with a pair token. `provide(amount)` requires the
//!   caller's pair-token allowance toward the pool to cover `amount`,
//!   and fails with [`ChainError::InsufficientAllowance`] otherwise.
//! - Append-only regulation ledgers, keyed by DAO address.
//! - Transactions start `Pending` and flip to `Succeeded` on [`DevnetChain::mine`].
//!
//! Every `call` and `query` is counted so tests can assert that a rejected
//! precondition never reached the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use alloy_primitives::U256;
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::chain::{
    Account, Address, ChainClient, ChainError, ContractCall, ContractMethod, TransactionHandle,
    TxStatus, WalletProvider,
};
use crate::regulation::Regulation;
use crate::units::{base_units_from_json, BaseUnitAmount};

// ---------------------------------------------------------------------------
// DevnetWallet
// ---------------------------------------------------------------------------

/// How the devnet wallet answers a connection prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
enum WalletBehaviour {
    Grant(Account),
    Decline,
    Unreachable,
}

/// A scripted wallet provider.
pub struct DevnetWallet {
    behaviour: Mutex<WalletBehaviour>,
    prompts: AtomicUsize,
    revocations: AtomicUsize,
}

impl DevnetWallet {
    /// A wallet that grants `account` on every prompt.
    pub fn new(account: Account) -> Self {
        Self::with_behaviour(WalletBehaviour::Grant(account))
    }

    /// A wallet whose user declines every prompt.
    pub fn declining() -> Self {
        Self::with_behaviour(WalletBehaviour::Decline)
    }

    /// A wallet whose transport fails on every prompt.
    pub fn unreachable() -> Self {
        Self::with_behaviour(WalletBehaviour::Unreachable)
    }

    fn with_behaviour(behaviour: WalletBehaviour) -> Self {
        Self {
            behaviour: Mutex::new(behaviour),
            prompts: AtomicUsize::new(0),
            revocations: AtomicUsize::new(0),
        }
    }

    /// Changes the account granted on the next prompt.
    pub fn set_account(&self, account: Account) {
        *self.behaviour.lock() = WalletBehaviour::Grant(account);
    }

    /// Number of `request_accounts` prompts shown so far.
    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    /// Number of successful `revoke` calls.
    pub fn revocation_count(&self) -> usize {
        self.revocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletProvider for DevnetWallet {
    async fn request_accounts(&self) -> Result<Option<Account>, ChainError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        match &*self.behaviour.lock() {
            WalletBehaviour::Grant(account) => Ok(Some(account.clone())),
            WalletBehaviour::Decline => Ok(None),
            WalletBehaviour::Unreachable => Err(ChainError::Transport("wallet not responding".into())),
        }
    }

    async fn revoke(&self) -> Result<(), ChainError> {
        if *self.behaviour.lock() == WalletBehaviour::Unreachable {
            return Err(ChainError::Transport("wallet not responding".into()));
        }
        self.revocations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DevnetChain
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ChainState {
    allowances: HashMap<(Address, Address, Address), BaseUnitAmount>,
    pair_tokens: HashMap<Address, Address>,
    provided: HashMap<(Address, Address), BaseUnitAmount>,
    ledgers: HashMap<Address, Vec<Regulation>>,
    transactions: HashMap<TransactionHandle, TxStatus>,
    nonce: u64,
}

/// An in-memory chain.
#[derive(Default)]
pub struct DevnetChain {
    state: Mutex<ChainState>,
    calls: AtomicUsize,
    queries: AtomicUsize,
    failing_queries: AtomicU32,
    rejecting: AtomicBool,
}

impl DevnetChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pool and the token it pulls from providers.
    pub fn register_pool(&self, pool: Address, pair_token: Address) {
        self.state.lock().pair_tokens.insert(pool, pair_token);
    }

    /// Appends an entry to the ledger held by `dao`.
    pub fn push_regulation(&self, dao: &Address, entry: Regulation) {
        self.state
            .lock()
            .ledgers
            .entry(dao.clone())
            .or_default()
            .push(entry);
    }

    /// Sets an allowance directly, bypassing `approve`.
    pub fn set_allowance(&self, token: &Address, owner: &Account, spender: &Address, amount: BaseUnitAmount) {
        self.state
            .lock()
            .allowances
            .insert((token.clone(), owner.clone(), spender.clone()), amount);
    }

    /// Current allowance of `owner` toward `spender` for `token`.
    pub fn allowance_of(&self, token: &Address, owner: &Account, spender: &Address) -> BaseUnitAmount {
        self.state
            .lock()
            .allowances
            .get(&(token.clone(), owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Total `owner` has provided into `pool`.
    pub fn provided(&self, pool: &Address, owner: &Account) -> BaseUnitAmount {
        self.state
            .lock()
            .provided
            .get(&(pool.clone(), owner.clone()))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Makes the next `n` queries fail with a transport error.
    pub fn fail_next_queries(&self, n: u32) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }

    /// While set, every signing request is declined by the "user".
    pub fn set_user_rejects(&self, rejects: bool) {
        self.rejecting.store(rejects, Ordering::SeqCst);
    }

    /// Mines every pending transaction.
    pub fn mine(&self) -> usize {
        let mut state = self.state.lock();
        let mut mined = 0;
        for status in state.transactions.values_mut() {
            if *status == TxStatus::Pending {
                *status = TxStatus::Succeeded;
                mined += 1;
            }
        }
        mined
    }

    /// State-changing calls received (including rejected ones).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Read-only queries received (including failed ones).
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn next_handle(state: &mut ChainState, from: &Account, call: &ContractCall) -> TransactionHandle {
        state.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(from.as_str().as_bytes());
        hasher.update([0x00]);
        hasher.update(call.contract.as_str().as_bytes());
        hasher.update([0x00]);
        hasher.update(call.method.as_str().as_bytes());
        hasher.update(state.nonce.to_be_bytes());
        TransactionHandle::from_bytes(hasher.finalize().into())
    }
}

fn address_arg(call: &ContractCall, index: usize) -> Result<Address, ChainError> {
    call.args
        .get(index)
        .and_then(|v| v.as_str())
        .map(Address::new)
        .ok_or_else(|| ChainError::Reverted(format!("{}: missing address argument {}", call.method, index)))
}

fn amount_arg(call: &ContractCall, index: usize) -> Result<BaseUnitAmount, ChainError> {
    let value = call
        .args
        .get(index)
        .ok_or_else(|| ChainError::Reverted(format!("{}: missing amount argument {}", call.method, index)))?;
    base_units_from_json(value).map_err(ChainError::Reverted)
}

#[async_trait]
impl ChainClient for DevnetChain {
    async fn call(&self, from: &Account, call: ContractCall) -> Result<TransactionHandle, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.rejecting.load(Ordering::SeqCst) {
            return Err(ChainError::UserRejected);
        }

        let mut state = self.state.lock();
        match call.method {
            ContractMethod::Approve => {
                let spender = address_arg(&call, 0)?;
                let amount = amount_arg(&call, 1)?;
                state
                    .allowances
                    .insert((call.contract.clone(), from.clone(), spender), amount);
            }
            ContractMethod::Provide => {
                let amount = amount_arg(&call, 0)?;
                let pair = state
                    .pair_tokens
                    .get(&call.contract)
                    .cloned()
                    .ok_or_else(|| ChainError::Reverted(format!("{} is not a pool", call.contract)))?;
                let key = (pair, from.clone(), call.contract.clone());
                let allowance = state.allowances.get(&key).copied().unwrap_or(U256::ZERO);
                if allowance < amount {
                    return Err(ChainError::InsufficientAllowance(format!(
                        "allowance {} < {}",
                        allowance, amount
                    )));
                }
                // Unlimited approvals stay unlimited, like most ERC-20s.
                if allowance != U256::MAX {
                    state.allowances.insert(key, allowance - amount);
                }
                let provided = state
                    .provided
                    .entry((call.contract.clone(), from.clone()))
                    .or_insert(U256::ZERO);
                *provided = provided.saturating_add(amount);
            }
            other => {
                return Err(ChainError::Reverted(format!("{} is read-only", other)));
            }
        }

        let handle = Self::next_handle(&mut state, from, &call);
        state.transactions.insert(handle, TxStatus::Pending);
        debug!(tx = %handle, method = %call.method, "devnet accepted transaction");
        Ok(handle)
    }

    async fn query(&self, call: ContractCall) -> Result<serde_json::Value, ChainError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let failed = self
            .failing_queries
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ChainError::Transport("devnet query dropped".into()));
        }

        if call.method.is_state_changing() {
            return Err(ChainError::Reverted(format!("{} needs a signed transaction", call.method)));
        }

        let state = self.state.lock();
        match call.method {
            ContractMethod::Allowance => {
                let owner = address_arg(&call, 0)?;
                let spender = address_arg(&call, 1)?;
                let allowance = state
                    .allowances
                    .get(&(call.contract.clone(), owner, spender))
                    .copied()
                    .unwrap_or(U256::ZERO);
                Ok(serde_json::Value::String(allowance.to_string()))
            }
            ContractMethod::GetAllRegulations => {
                let ledger = state.ledgers.get(&call.contract).cloned().unwrap_or_default();
                serde_json::to_value(ledger).map_err(|e| ChainError::Decode(e.to_string()))
            }
            other => Err(ChainError::Reverted(format!("{} is not a view method", other))),
        }
    }

    async fn transaction_status(&self, handle: &TransactionHandle) -> Result<TxStatus, ChainError> {
        Ok(self
            .state
            .lock()
            .transactions
            .get(handle)
            .cloned()
            .unwrap_or(TxStatus::Failed {
                reason: "unknown transaction".into(),
            }))
    }
}
