// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ESD Client: Wallet & Contract Interaction Layer
//!
//! Everything the dashboard does that touches a wallet or a contract goes
//! through this crate. The UI renders; this side decides what gets
//! signed, how amounts are scaled, and when a ledger read is allowed to land.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - **units**: Exact conversion between token amounts and base units.
//! - **wallet**: Connect/disconnect lifecycle against the injected provider.
//! - **gateway**: Approve and provide-liquidity dispatch with precondition gates.
//! - **poller**: Cancellable interval fetcher for the regulation ledger.
//! - **session**: One owned object that wires the above together.
//!
//! Supporting modules: **chain** (the external wallet/chain interfaces),
//! **regulation** (ledger entries and their display rows), **pool**
//! (pair-token quotes), **tokens**, **config**, **error**, and **devnet**
//! (an in-memory chain for tests and local runs).
//!
//! ## Ground Rules
//!
//! 1. No floating point anywhere near an amount. Ever.
//! 2. Preconditions fail before the network is touched.
//! 3. A poll result that lands after `stop()` is dropped on the floor.

pub mod chain;
pub mod config;
pub mod devnet;
pub mod error;
pub mod gateway;
pub mod poller;
pub mod pool;
pub mod regulation;
pub mod session;
pub mod tokens;
pub mod units;
pub mod wallet;

pub use chain::{Account, Address, ChainClient, ChainError, TransactionHandle, TxStatus, WalletProvider};
pub use config::{ClientConfig, PollerConfig};
pub use error::ClientError;
pub use gateway::Gateway;
pub use poller::{
    spawn_poll, ChainLedgerSource, LedgerPoller, LedgerSnapshot, LedgerSource, LedgerView, PollHandle, PollStatus,
    PollerState,
};
pub use regulation::Regulation;
pub use session::Session;
pub use units::{BaseUnitAmount, TokenAmount};
pub use wallet::{ConnectionState, WalletConnector};
