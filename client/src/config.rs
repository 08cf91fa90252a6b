//! # Client Configuration & Constants
//!
//! Every magic number the dashboard relies on lives here, next to the
//! [`ClientConfig`] that carries the contract addresses for a deployment.

use std::time::Duration;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::chain::Address;

// ---------------------------------------------------------------------------
// Token Precision
// ---------------------------------------------------------------------------

/// ESD uses the standard 18-decimal ERC-20 scale.
pub const ESD_DECIMALS: u8 = 18;

/// ESDS (the DAO share token) shares ESD's scale.
pub const ESDS_DECIMALS: u8 = 18;

/// USDC is 6 decimals on every chain we care about.
pub const USDC_DECIMALS: u8 = 6;

// ---------------------------------------------------------------------------
// Allowances
// ---------------------------------------------------------------------------

/// `2^256 - 1`. What "unlimited" means to an ERC-20 `approve`.
pub const MAX_UINT256: U256 = U256::MAX;

/// Any allowance strictly above this counts as unlimited.
///
/// Half of `MAX_UINT256`, floored. Wallets and contracts that decrement
/// "infinite" approvals on spend still sit far above this line.
pub const UNLIMITED_ALLOWANCE_THRESHOLD: U256 = U256::from_limbs([
    u64::MAX,
    u64::MAX,
    u64::MAX,
    u64::MAX >> 1,
]);

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// How often the regulation ledger is re-read.
pub const LEDGER_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Consecutive failed fetches before a poll session reports itself degraded.
pub const DEFAULT_DEGRADED_AFTER: u32 = 2;

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Tuning for a ledger poll session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Period between fetches, in milliseconds.
    pub interval_ms: u64,

    /// Consecutive failures before the status flips to `Degraded`.
    /// Clamped to at least 1.
    pub degraded_after: u32,
}

impl PollerConfig {
    /// The fetch period as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: LEDGER_POLL_INTERVAL.as_millis() as u64,
            degraded_after: DEFAULT_DEGRADED_AFTER,
        }
    }
}

/// Contract addresses and tuning for one deployment of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The ESD token contract.
    pub esd: Address,

    /// The USDC token contract (the pool's pair token).
    pub usdc: Address,

    /// The DAO contract. Its address doubles as the ESDS token and as the
    /// scope of the regulation ledger.
    pub dao: Address,

    /// The liquidity pool that receives `provide` calls.
    pub pool: Address,

    /// Poll session tuning.
    #[serde(default)]
    pub poller: PollerConfig,
}

impl ClientConfig {
    /// A self-consistent configuration for [`crate::devnet::DevnetChain`].
    pub fn devnet() -> Self {
        Self {
            esd: Address::new("0x00000000000000000000000000000000000e5d01"),
            usdc: Address::new("0x00000000000000000000000000000000000a5dc0"),
            dao: Address::new("0x00000000000000000000000000000000000da000"),
            pool: Address::new("0x0000000000000000000000000000000000000901"),
            poller: PollerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_threshold_is_half_of_max() {
        assert_eq!(UNLIMITED_ALLOWANCE_THRESHOLD, MAX_UINT256 / U256::from(2u64));
    }

    #[test]
    fn default_poll_interval_is_fifteen_seconds() {
        assert_eq!(PollerConfig::default().interval(), Duration::from_secs(15));
    }

    #[test]
    fn poller_config_defaults_when_missing_from_json() {
        let json = r#"{
            "esd": "0x1",
            "usdc": "0x2",
            "dao": "0x3",
            "pool": "0x4"
        }"#;
        let config: ClientConfig = serde_json::from_str(json).expect("parse");
        assert_eq!(config.poller, PollerConfig::default());
        assert_eq!(config.pool.as_str(), "0x4");
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = PollerConfig {
            interval_ms: 0,
            degraded_after: 1,
        };
        assert_eq!(config.interval(), Duration::from_millis(1));
    }
}
