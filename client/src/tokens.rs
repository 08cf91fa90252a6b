//! Token records for the assets the dashboard handles.
//!
//! Decimals here are authoritative for every conversion the session makes;
//! a wrong value silently mis-scales every amount by a power of ten.

use serde::{Deserialize, Serialize};

use crate::chain::Address;
use crate::config::{ClientConfig, ESDS_DECIMALS, ESD_DECIMALS, USDC_DECIMALS};

/// Address, ticker, and fixed-point scale of an ERC-20 token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenInfo {
    pub fn new(address: Address, symbol: &str, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.to_string(),
            decimals,
        }
    }
}

/// Empty Set Dollar.
pub fn esd(config: &ClientConfig) -> TokenInfo {
    TokenInfo::new(config.esd.clone(), "ESD", ESD_DECIMALS)
}

/// ESD bonded in the DAO. The DAO contract is the token.
pub fn esds(config: &ClientConfig) -> TokenInfo {
    TokenInfo::new(config.dao.clone(), "ESDS", ESDS_DECIMALS)
}

/// USD Coin, the pool's pair token.
pub fn usdc(config: &ClientConfig) -> TokenInfo {
    TokenInfo::new(config.usdc.clone(), "USDC", USDC_DECIMALS)
}
