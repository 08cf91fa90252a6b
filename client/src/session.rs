//! # Dashboard Session
//!
//! One [`Session`] per browser tab, in dashboard terms: a wallet connection,
//! a gateway for the two write actions, and at most one ledger poll.
//!
//! The session reads the account from the [`WalletConnector`] at the moment
//! each action is dispatched, so a disconnect or account switch takes effect
//! on the very next call.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::chain::{Account, Address, ChainClient, TransactionHandle, TxStatus, WalletProvider};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::gateway::Gateway;
use crate::poller::{ChainLedgerSource, LedgerPoller, LedgerView, PollerState};
use crate::tokens;
use crate::units::{is_positive, is_unlimited_allowance, to_base_unit, BaseUnitAmount, TokenAmount};
use crate::wallet::{ConnectionState, WalletConnector};

/// Wallet, gateway, and ledger poll for one user session.
pub struct Session<C: ChainClient> {
    config: ClientConfig,
    wallet: WalletConnector,
    gateway: Gateway<C>,
    poller: Mutex<LedgerPoller<ChainLedgerSource<C>>>,
}

impl<C: ChainClient> Session<C> {
    pub fn new(config: ClientConfig, provider: Option<Arc<dyn WalletProvider>>, chain: Arc<C>) -> Self {
        let source = Arc::new(ChainLedgerSource::new(Arc::clone(&chain)));
        let poller = LedgerPoller::new(source, config.poller.clone());
        debug!(dao = %config.dao, pool = %config.pool, "session created");
        Self {
            wallet: WalletConnector::new(provider),
            gateway: Gateway::new(chain),
            poller: Mutex::new(poller),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn wallet(&self) -> &WalletConnector {
        &self.wallet
    }

    pub fn gateway(&self) -> &Gateway<C> {
        &self.gateway
    }

    // -- wallet -------------------------------------------------------------

    /// See [`WalletConnector::connect`].
    pub async fn connect(&self) -> Option<Account> {
        self.wallet.connect().await
    }

    /// Stops any ledger poll, then forgets the account.
    pub fn disconnect(&self) {
        self.stop_ledger_poll();
        self.wallet.disconnect();
    }

    /// [`Session::disconnect`], then asks the wallet to revoke its grant.
    pub async fn disconnect_and_revoke(&self) {
        self.stop_ledger_poll();
        self.wallet.disconnect_and_revoke().await;
    }

    pub fn account(&self) -> Option<Account> {
        self.wallet.account()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.wallet.subscribe()
    }

    /// Applies a provider-side account change. A revocation ends the session
    /// the same way [`Session::disconnect`] does. A switch to another account
    /// restarts any running poll on the same scope, so nothing fetched for the
    /// old account is shown under the new one; fetch the fresh view with
    /// [`Session::ledger_view`].
    pub fn handle_accounts_changed(&self, account: Option<Account>) {
        let previous = self.wallet.account();
        let Some(next) = account else {
            self.stop_ledger_poll();
            self.wallet.handle_accounts_changed(None);
            return;
        };
        let switched = previous.as_ref() != Some(&next);
        self.wallet.handle_accounts_changed(Some(next));
        if !switched {
            return;
        }

        let mut poller = self.poller.lock();
        if let PollerState::Active { scope } = poller.state() {
            poller.stop();
            poller.start(scope.clone());
            info!(scope = %scope, "ledger poll restarted for new account");
        }
    }

    // -- actions ------------------------------------------------------------

    /// Grants `spender` an unlimited allowance over `token`.
    pub async fn approve(&self, token: &Address, spender: &Address) -> Result<TransactionHandle, ClientError> {
        let account = self.account();
        self.gateway.approve(account.as_ref(), token, spender).await
    }

    /// "Unlock": lets the pool spend the account's USDC.
    pub async fn approve_pool_spend(&self) -> Result<TransactionHandle, ClientError> {
        let account = self.account();
        self.gateway
            .approve(account.as_ref(), &self.config.usdc, &self.config.pool)
            .await
    }

    /// Provides an already-scaled amount to `pool`.
    pub async fn provide_liquidity(
        &self,
        pool: &Address,
        amount: BaseUnitAmount,
    ) -> Result<TransactionHandle, ClientError> {
        let account = self.account();
        self.gateway.provide_liquidity(account.as_ref(), pool, amount).await
    }

    /// "Provide": converts `amount` ESD to base units and provides it to the
    /// configured pool.
    ///
    /// # Errors
    ///
    /// `NotConnected`, then `AmountNotPositive` for zero or negative input,
    /// then `InvalidAmount` if the amount cannot be scaled. None of these
    /// reach the chain.
    pub async fn provide_to_pool(&self, amount: &TokenAmount) -> Result<TransactionHandle, ClientError> {
        let account = self.account().ok_or(ClientError::NotConnected)?;
        if !is_positive(amount) {
            return Err(ClientError::AmountNotPositive);
        }
        let base = to_base_unit(amount, tokens::esd(&self.config).decimals)?;
        self.gateway
            .provide_liquidity(Some(&account), &self.config.pool, base)
            .await
    }

    /// Allowance of `owner` toward `spender` in `token`.
    pub async fn allowance(
        &self,
        token: &Address,
        owner: &Account,
        spender: &Address,
    ) -> Result<BaseUnitAmount, ClientError> {
        self.gateway.allowance(token, owner, spender).await
    }

    /// Whether the connected account still has to "Unlock" before providing.
    pub async fn needs_approval(&self) -> Result<bool, ClientError> {
        let account = self.account().ok_or(ClientError::NotConnected)?;
        let allowance = self
            .gateway
            .allowance(&self.config.usdc, &account, &self.config.pool)
            .await?;
        Ok(!is_unlimited_allowance(allowance))
    }

    pub async fn transaction_status(&self, handle: &TransactionHandle) -> Result<TxStatus, ClientError> {
        self.gateway.status(handle).await
    }

    // -- ledger -------------------------------------------------------------

    /// Starts polling the ledger at `scope`, replacing any other poll.
    ///
    /// # Errors
    ///
    /// `NotConnected` when no account is connected.
    pub fn start_ledger_poll(&self, scope: Address) -> Result<LedgerView, ClientError> {
        if !self.wallet.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let view = self.poller.lock().start(scope);
        info!(scope = %view.scope(), "ledger poll requested");
        Ok(view)
    }

    /// Polls the DAO's regulation history.
    pub fn start_regulation_poll(&self) -> Result<LedgerView, ClientError> {
        self.start_ledger_poll(self.config.dao.clone())
    }

    pub fn stop_ledger_poll(&self) {
        self.poller.lock().stop();
    }

    pub fn ledger_view(&self) -> Option<LedgerView> {
        self.poller.lock().view()
    }

    pub fn poller_state(&self) -> PollerState {
        self.poller.lock().state()
    }
}
