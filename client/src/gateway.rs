//! # Contract Action Gateway
//!
//! Turns "approve the pool" and "provide liquidity" into encoded contract
//! calls, after checking the preconditions that can be checked locally.
//!
//! ## Precondition Order
//!
//! 1. An account must be connected (`NotConnected`).
//! 2. Amounts must be strictly positive (`AmountNotPositive`).
//!
//! Both run before the chain client is touched. Allowance sufficiency is the
//! caller's check (see [`Gateway::allowance`]); if they skip it, the chain's
//! rejection comes back as `InsufficientAllowance`.
//!
//! Dispatch returns a [`TransactionHandle`] as soon as the client accepts the
//! transaction. Nothing here waits for mining, retries, or deduplicates;
//! two clicks on "Unlock" are two approvals.

use std::sync::Arc;

use alloy_primitives::U256;
use tracing::{info, warn};

use crate::chain::{Account, Address, ChainClient, ContractCall, ContractMethod, TransactionHandle, TxStatus};
use crate::config::MAX_UINT256;
use crate::error::ClientError;
use crate::units::{base_units_from_json, BaseUnitAmount};

/// Dispatches approve / provide calls through a [`ChainClient`].
pub struct Gateway<C: ChainClient> {
    chain: Arc<C>,
}

impl<C: ChainClient> Clone for Gateway<C> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
        }
    }
}

fn uint_arg(value: U256) -> serde_json::Value {
    serde_json::Value::String(value.to_string())
}

fn address_arg(address: &Address) -> serde_json::Value {
    serde_json::Value::String(address.as_str().to_string())
}

impl<C: ChainClient> Gateway<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self { chain }
    }

    /// The underlying chain client.
    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    /// Grants `spender` an unlimited (`2^256 - 1`) allowance over `token`.
    ///
    /// # Errors
    ///
    /// `NotConnected` without a network call when `account` is `None`;
    /// otherwise whatever the chain reports.
    pub async fn approve(
        &self,
        account: Option<&Account>,
        token: &Address,
        spender: &Address,
    ) -> Result<TransactionHandle, ClientError> {
        let from = account.ok_or(ClientError::NotConnected)?;

        let call = ContractCall::new(
            token,
            ContractMethod::Approve,
            vec![address_arg(spender), uint_arg(MAX_UINT256)],
        );
        self.dispatch(from, call).await
    }

    /// Provides `amount` base units of liquidity to `pool`.
    ///
    /// `amount` must already be scaled (see [`crate::units::to_base_unit`]).
    ///
    /// # Errors
    ///
    /// `NotConnected` or `AmountNotPositive` without a network call;
    /// `InsufficientAllowance` if the chain refuses the spend.
    pub async fn provide_liquidity(
        &self,
        account: Option<&Account>,
        pool: &Address,
        amount: BaseUnitAmount,
    ) -> Result<TransactionHandle, ClientError> {
        let from = account.ok_or(ClientError::NotConnected)?;
        if amount.is_zero() {
            return Err(ClientError::AmountNotPositive);
        }

        let call = ContractCall::new(pool, ContractMethod::Provide, vec![uint_arg(amount)]);
        self.dispatch(from, call).await
    }

    /// Reads how much `spender` may pull from `owner` in `token`.
    pub async fn allowance(
        &self,
        token: &Address,
        owner: &Account,
        spender: &Address,
    ) -> Result<BaseUnitAmount, ClientError> {
        let call = ContractCall::new(
            token,
            ContractMethod::Allowance,
            vec![address_arg(owner), address_arg(spender)],
        );
        let value = self.chain.query(call).await?;
        base_units_from_json(&value).map_err(ClientError::MalformedResponse)
    }

    /// Current status of a dispatched transaction.
    pub async fn status(&self, handle: &TransactionHandle) -> Result<TxStatus, ClientError> {
        Ok(self.chain.transaction_status(handle).await?)
    }

    async fn dispatch(&self, from: &Account, call: ContractCall) -> Result<TransactionHandle, ClientError> {
        let method = call.method;
        let contract = call.contract.clone();

        match self.chain.call(from, call).await {
            Ok(handle) => {
                info!(
                    tx = %handle,
                    method = %method,
                    contract = %contract,
                    from = %from,
                    "transaction dispatched"
                );
                Ok(handle)
            }
            Err(e) => {
                warn!(method = %method, contract = %contract, error = %e, "transaction not dispatched");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::DevnetChain;
    use crate::units::is_unlimited_allowance;

    struct Fixture {
        chain: Arc<DevnetChain>,
        gateway: Gateway<DevnetChain>,
        alice: Account,
        usdc: Address,
        pool: Address,
    }

    fn fixture() -> Fixture {
        let chain = Arc::new(DevnetChain::new());
        let usdc = Address::new("0xusdc");
        let pool = Address::new("0xpool");
        chain.register_pool(pool.clone(), usdc.clone());
        Fixture {
            gateway: Gateway::new(Arc::clone(&chain)),
            chain,
            alice: Address::new("0xalice"),
            usdc,
            pool,
        }
    }

    #[tokio::test]
    async fn approve_requires_account() {
        let f = fixture();
        let err = f.gateway.approve(None, &f.usdc, &f.pool).await.unwrap_err();
        assert_eq!(err, ClientError::NotConnected);
        assert_eq!(f.chain.call_count(), 0);
    }

    #[tokio::test]
    async fn approve_grants_max_allowance() {
        let f = fixture();
        f.gateway
            .approve(Some(&f.alice), &f.usdc, &f.pool)
            .await
            .unwrap();

        let allowance = f.gateway.allowance(&f.usdc, &f.alice, &f.pool).await.unwrap();
        assert_eq!(allowance, MAX_UINT256);
        assert!(is_unlimited_allowance(allowance));
    }

    #[tokio::test]
    async fn repeated_approvals_are_separate_transactions() {
        let f = fixture();
        let first = f.gateway.approve(Some(&f.alice), &f.usdc, &f.pool).await.unwrap();
        let second = f.gateway.approve(Some(&f.alice), &f.usdc, &f.pool).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(f.chain.call_count(), 2);
    }

    #[tokio::test]
    async fn provide_while_disconnected_makes_no_call() {
        let f = fixture();
        let err = f
            .gateway
            .provide_liquidity(None, &f.pool, U256::from(100u64))
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::NotConnected);
        assert_eq!(f.chain.call_count(), 0);
        assert_eq!(f.chain.query_count(), 0);
    }

    #[tokio::test]
    async fn provide_zero_makes_no_call() {
        let f = fixture();
        let err = f
            .gateway
            .provide_liquidity(Some(&f.alice), &f.pool, U256::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::AmountNotPositive);
        assert_eq!(f.chain.call_count(), 0);
    }

    #[tokio::test]
    async fn provide_with_zero_allowance_is_rejected_by_chain() {
        let f = fixture();
        let allowance = f.gateway.allowance(&f.usdc, &f.alice, &f.pool).await.unwrap();
        assert!(allowance.is_zero());

        let err = f
            .gateway
            .provide_liquidity(Some(&f.alice), &f.pool, U256::from(1u64))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InsufficientAllowance(_)));
        assert_eq!(f.chain.call_count(), 1);
    }

    #[tokio::test]
    async fn approve_then_provide_succeeds() {
        let f = fixture();
        f.gateway.approve(Some(&f.alice), &f.usdc, &f.pool).await.unwrap();

        let handle = f
            .gateway
            .provide_liquidity(Some(&f.alice), &f.pool, U256::from(1_000u64))
            .await
            .unwrap();

        assert_eq!(f.gateway.status(&handle).await.unwrap(), TxStatus::Pending);
        f.chain.mine();
        assert_eq!(f.gateway.status(&handle).await.unwrap(), TxStatus::Succeeded);
        assert_eq!(f.chain.provided(&f.pool, &f.alice), U256::from(1_000u64));
    }

    #[tokio::test]
    async fn user_rejection_is_reported_as_such() {
        let f = fixture();
        f.chain.set_user_rejects(true);
        let err = f
            .gateway
            .approve(Some(&f.alice), &f.usdc, &f.pool)
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::UserRejected);
    }
}
