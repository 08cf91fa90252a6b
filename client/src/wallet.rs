//! # Wallet Connection Lifecycle
//!
//! [`WalletConnector`] is the only component allowed to change which account
//! the session acts for. Everything else reads the account it hands out.
//!
//! ```text
//!   Disconnected ──connect()──> Connecting ──granted──> Connected(account)
//!        ^                          │                        │
//!        └────────declined──────────┘                        │
//!        └─────────────────────disconnect()──────────────────┘
//! ```
//!
//! Transitions are published on a `tokio::sync::watch` channel so the
//! presentation layer can re-render account-dependent views.
//!
//! Only one prompt is open at a time: a `connect()` that finds another one
//! pending waits for its outcome. A grant only lands if the state is still
//! `Connecting`, so a `disconnect()` made while the prompt is open wins.
//!
//! `disconnect()` only forgets the account locally and leaves the wallet's
//! permission grant in place. `disconnect_and_revoke()` also asks the
//! provider to drop it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chain::{Account, WalletProvider};
use crate::error::ClientError;

/// The session's view of the wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// A `request_accounts` prompt is open.
    Connecting,
    Connected(Account),
}

impl ConnectionState {
    /// The connected account, if any.
    pub fn account(&self) -> Option<&Account> {
        match self {
            ConnectionState::Connected(account) => Some(account),
            _ => None,
        }
    }
}

/// Owns the connection state machine for one session.
pub struct WalletConnector {
    provider: Option<Arc<dyn WalletProvider>>,
    state: watch::Sender<ConnectionState>,
}

impl WalletConnector {
    /// Creates a disconnected connector. `provider` is `None` when no wallet
    /// is installed.
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { provider, state }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// The connected account, if any.
    pub fn account(&self) -> Option<Account> {
        self.state.borrow().account().cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().account().is_some()
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The provider, or `ProviderUnavailable` when no wallet is installed.
    pub fn provider(&self) -> Result<&Arc<dyn WalletProvider>, ClientError> {
        self.provider.as_ref().ok_or(ClientError::ProviderUnavailable)
    }

    /// Asks the wallet for an account.
    ///
    /// Returns `None` when the user declines, no provider is installed, or
    /// the provider errors. None of these are faults; the session simply stays
    /// disconnected. Already-connected sessions return their account without
    /// prompting again, and a call made while a prompt is open shares that
    /// prompt's outcome.
    pub async fn connect(&self) -> Option<Account> {
        if let Some(account) = self.account() {
            return Some(account);
        }

        let provider = match self.provider() {
            Ok(provider) => Arc::clone(provider),
            Err(_) => {
                warn!("connect requested but no wallet provider is available");
                return None;
            }
        };

        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                claimed = true;
            }
            claimed
        });
        if !claimed {
            debug!("connect already in progress; waiting for its outcome");
            return self.settled_account().await;
        }

        match provider.request_accounts().await {
            Ok(Some(account)) => {
                let granted = self.state.send_if_modified(|state| {
                    if *state != ConnectionState::Connecting {
                        return false;
                    }
                    *state = ConnectionState::Connected(account.clone());
                    true
                });
                if granted {
                    info!(account = %account, "wallet connected");
                    Some(account)
                } else {
                    info!(account = %account, "wallet grant arrived after the connect was abandoned");
                    self.account()
                }
            }
            Ok(None) => {
                info!("wallet connection declined");
                self.abandon_connecting();
                None
            }
            Err(e) => {
                warn!(error = %e, "wallet provider failed during connect");
                self.abandon_connecting();
                None
            }
        }
    }

    /// Waits until no prompt is open, then reports the account.
    async fn settled_account(&self) -> Option<Account> {
        let mut rx = self.state.subscribe();
        rx.wait_for(|state| *state != ConnectionState::Connecting)
            .await
            .ok()
            .and_then(|settled| settled.account().cloned())
    }

    /// `Connecting` → `Disconnected`, unless something else already moved
    /// the state on.
    fn abandon_connecting(&self) {
        self.state.send_if_modified(|state| {
            if *state != ConnectionState::Connecting {
                return false;
            }
            *state = ConnectionState::Disconnected;
            true
        });
    }

    /// Forgets the connected account. An open prompt is abandoned: its
    /// grant, if any, will not connect the session.
    pub fn disconnect(&self) {
        let previous = self.state.send_replace(ConnectionState::Disconnected);
        match previous {
            ConnectionState::Connected(account) => info!(account = %account, "wallet disconnected"),
            ConnectionState::Connecting => info!("pending wallet connect abandoned"),
            ConnectionState::Disconnected => {}
        }
    }

    /// Disconnects, then asks the provider to drop its permission grant. A
    /// failed revoke is logged; the session is disconnected either way.
    pub async fn disconnect_and_revoke(&self) {
        self.disconnect();
        let Some(provider) = &self.provider else {
            return;
        };
        match provider.revoke().await {
            Ok(()) => info!("wallet permissions revoked"),
            Err(e) => warn!(error = %e, "wallet failed to revoke permissions"),
        }
    }

    /// Applies an account change pushed by the provider (`accountsChanged`).
    /// `None` means access was revoked.
    pub fn handle_accounts_changed(&self, account: Option<Account>) {
        match account {
            Some(account) => {
                info!(account = %account, "wallet switched account");
                self.state.send_replace(ConnectionState::Connected(account));
            }
            None => {
                info!("wallet revoked account access");
                self.state.send_replace(ConnectionState::Disconnected);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::chain::{Address, ChainError};
    use crate::devnet::DevnetWallet;

    fn connector(wallet: DevnetWallet) -> WalletConnector {
        WalletConnector::new(Some(Arc::new(wallet)))
    }

    #[tokio::test]
    async fn connect_returns_account_and_transitions() {
        let wallet = connector(DevnetWallet::new(Address::new("0xalice")));
        let mut rx = wallet.subscribe();

        let account = wallet.connect().await;

        assert_eq!(account, Some(Address::new("0xalice")));
        assert_eq!(
            wallet.state(),
            ConnectionState::Connected(Address::new("0xalice"))
        );
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().account(), Some(&Address::new("0xalice")));
    }

    #[tokio::test]
    async fn declined_connect_is_not_an_error() {
        let wallet = connector(DevnetWallet::declining());
        assert_eq!(wallet.connect().await, None);
        assert_eq!(wallet.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn missing_provider_yields_none() {
        let wallet = WalletConnector::new(None);
        assert_eq!(wallet.connect().await, None);
        assert!(matches!(wallet.provider(), Err(ClientError::ProviderUnavailable)));
    }

    #[tokio::test]
    async fn failing_provider_yields_none() {
        let wallet = connector(DevnetWallet::unreachable());
        assert_eq!(wallet.connect().await, None);
        assert!(!wallet.is_connected());
    }

    #[tokio::test]
    async fn disconnect_clears_account() {
        let wallet = connector(DevnetWallet::new(Address::new("0xalice")));
        wallet.connect().await;
        wallet.disconnect();
        assert_eq!(wallet.account(), None);
        assert_eq!(wallet.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_does_not_prompt_twice() {
        let devnet = Arc::new(DevnetWallet::new(Address::new("0xalice")));
        let wallet = WalletConnector::new(Some(devnet.clone()));
        wallet.connect().await;
        wallet.connect().await;
        assert_eq!(devnet.prompt_count(), 1);
    }

    /// Grants `account` only once the gate is opened.
    struct GatedWallet {
        account: Account,
        gate: Notify,
        prompts: AtomicUsize,
    }

    impl GatedWallet {
        fn new(account: &str) -> Arc<Self> {
            Arc::new(Self {
                account: Address::new(account),
                gate: Notify::new(),
                prompts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl WalletProvider for GatedWallet {
        async fn request_accounts(&self) -> Result<Option<Account>, ChainError> {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Some(self.account.clone()))
        }
    }

    #[tokio::test]
    async fn disconnect_during_prompt_wins_over_late_grant() {
        let gated = GatedWallet::new("0xalice");
        let wallet = WalletConnector::new(Some(gated.clone()));
        let mut rx = wallet.subscribe();

        let user = async {
            rx.wait_for(|s| *s == ConnectionState::Connecting).await.unwrap();
            wallet.disconnect();
            gated.gate.notify_one();
        };
        let (account, ()) = tokio::join!(wallet.connect(), user);

        assert_eq!(account, None);
        assert_eq!(wallet.state(), ConnectionState::Disconnected);
        assert_eq!(gated.prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_connects_share_one_prompt() {
        let gated = GatedWallet::new("0xalice");
        let wallet = WalletConnector::new(Some(gated.clone()));

        let release = async {
            tokio::task::yield_now().await;
            gated.gate.notify_one();
        };
        let (first, second, ()) = tokio::join!(wallet.connect(), wallet.connect(), release);

        assert_eq!(first, Some(Address::new("0xalice")));
        assert_eq!(second, Some(Address::new("0xalice")));
        assert_eq!(gated.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(
            wallet.state(),
            ConnectionState::Connected(Address::new("0xalice"))
        );
    }

    #[tokio::test]
    async fn disconnect_and_revoke_drops_the_grant() {
        let devnet = Arc::new(DevnetWallet::new(Address::new("0xalice")));
        let wallet = WalletConnector::new(Some(devnet.clone()));
        wallet.connect().await;

        wallet.disconnect_and_revoke().await;
        assert!(!wallet.is_connected());
        assert_eq!(devnet.revocation_count(), 1);

        // Plain disconnect leaves the grant alone.
        wallet.connect().await;
        wallet.disconnect();
        assert_eq!(devnet.revocation_count(), 1);
    }

    #[tokio::test]
    async fn failed_revoke_still_disconnects() {
        let wallet = connector(DevnetWallet::unreachable());
        wallet.handle_accounts_changed(Some(Address::new("0xalice")));
        wallet.disconnect_and_revoke().await;
        assert_eq!(wallet.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn provider_account_changes_are_applied() {
        let wallet = WalletConnector::new(None);
        wallet.handle_accounts_changed(Some(Address::new("0xbob")));
        assert_eq!(wallet.account(), Some(Address::new("0xbob")));
        wallet.handle_accounts_changed(None);
        assert!(!wallet.is_connected());
    }
}
