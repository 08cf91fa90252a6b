//! # Regulation Ledger Entries
//!
//! Each epoch the DAO regulates supply and records what it did. The record
//! is immutable once written, keyed by epoch, and its payload depends on the
//! direction of the adjustment:
//!
//! | type       | fields                                              |
//! |------------|-----------------------------------------------------|
//! | `INCREASE` | `epoch, price, newRedeemable, lessDebt, newBonded`  |
//! | `DECREASE` | `epoch, price, newDebt`                             |
//! | `NEUTRAL`  | `epoch`                                             |
//!
//! On the wire an entry is `{ "type": ..., "data": { ... } }` with every
//! number as a decimal string of base units.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::units::{pow10, to_token_unit, BaseUnitAmount};

/// Which way supply moved in an epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegulationKind {
    Neutral,
    Increase,
    Decrease,
}

impl fmt::Display for RegulationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegulationKind::Neutral => write!(f, "NEUTRAL"),
            RegulationKind::Increase => write!(f, "INCREASE"),
            RegulationKind::Decrease => write!(f, "DECREASE"),
        }
    }
}

/// Expansion epoch: price above peg, new ESD minted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncreaseEntry {
    #[serde(with = "crate::units::decimal_string")]
    pub epoch: u64,
    #[serde(with = "crate::units::decimal_string")]
    pub price: BaseUnitAmount,
    #[serde(with = "crate::units::decimal_string")]
    pub new_redeemable: BaseUnitAmount,
    #[serde(with = "crate::units::decimal_string")]
    pub less_debt: BaseUnitAmount,
    #[serde(with = "crate::units::decimal_string")]
    pub new_bonded: BaseUnitAmount,
}

/// Contraction epoch: price below peg, debt issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecreaseEntry {
    #[serde(with = "crate::units::decimal_string")]
    pub epoch: u64,
    #[serde(with = "crate::units::decimal_string")]
    pub price: BaseUnitAmount,
    #[serde(with = "crate::units::decimal_string")]
    pub new_debt: BaseUnitAmount,
}

/// Epoch with no adjustment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeutralEntry {
    #[serde(with = "crate::units::decimal_string")]
    pub epoch: u64,
}

/// One record from the regulation ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "UPPERCASE")]
pub enum Regulation {
    Increase(IncreaseEntry),
    Decrease(DecreaseEntry),
    Neutral(NeutralEntry),
}

impl Regulation {
    pub fn neutral(epoch: u64) -> Self {
        Regulation::Neutral(NeutralEntry { epoch })
    }

    pub fn kind(&self) -> RegulationKind {
        match self {
            Regulation::Increase(_) => RegulationKind::Increase,
            Regulation::Decrease(_) => RegulationKind::Decrease,
            Regulation::Neutral(_) => RegulationKind::Neutral,
        }
    }

    pub fn epoch(&self) -> u64 {
        match self {
            Regulation::Increase(e) => e.epoch,
            Regulation::Decrease(e) => e.epoch,
            Regulation::Neutral(e) => e.epoch,
        }
    }

    /// Table cells for the history view:
    /// `[epoch, price, Δ redeemable, Δ debt, Δ bonded]`, amounts in token
    /// units at `decimals`, two places.
    pub fn render_row(&self, decimals: u8) -> [String; 5] {
        let fixed = |v: BaseUnitAmount| to_token_unit(v, decimals).to_fixed(2);
        let zero = || "+0.00".to_string();

        match self {
            Regulation::Increase(e) => [
                e.epoch.to_string(),
                fixed(e.price),
                format!("+{}", fixed(e.new_redeemable)),
                format!("-{}", fixed(e.less_debt)),
                format!("+{}", fixed(e.new_bonded)),
            ],
            Regulation::Decrease(e) => [
                e.epoch.to_string(),
                fixed(e.price),
                zero(),
                format!("+{}", fixed(e.new_debt)),
                zero(),
            ],
            Regulation::Neutral(e) => [e.epoch.to_string(), "1.00".to_string(), zero(), zero(), zero()],
        }
    }
}

/// Decodes the JSON array returned by `getAllRegulations`.
pub fn decode_ledger(value: serde_json::Value) -> Result<Vec<Regulation>, serde_json::Error> {
    serde_json::from_value(value)
}

/// Highest epoch in a ledger, if any.
pub fn latest_epoch(entries: &[Regulation]) -> Option<u64> {
    entries.iter().map(Regulation::epoch).max()
}

/// Convenience for building entries from whole-token figures in tests and
/// the devnet scenario.
pub fn whole_tokens(tokens: u64, decimals: u8) -> BaseUnitAmount {
    pow10(u32::from(decimals))
        .map(|scale| U256::from(tokens).saturating_mul(scale))
        .unwrap_or(U256::MAX)
}
