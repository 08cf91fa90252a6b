//! # CLI Interface
//!
//! Command-line structure for `esd-console` using `clap` derive. The
//! conversion subcommands are pure; `simulate` drives a full session against
//! the in-memory devnet.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Empty Set Dollar console.
///
/// Exercises the wallet and contract interaction layer from a terminal:
/// unit conversion, pool quotes, and a scripted devnet session.
#[derive(Parser, Debug)]
#[command(
    name = "esd-console",
    about = "Empty Set Dollar wallet & contract console",
    version,
    propagate_version = true
)]
pub struct EsdConsoleCli {
    /// Path to a JSON client configuration (contract addresses, poller
    /// tuning). Defaults to the built-in devnet deployment.
    #[arg(long, short = 'c', env = "ESD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, env = "ESD_LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scale a token amount to base units (floors excess precision).
    ToBase(ConvertArgs),
    /// Scale a base-unit integer back to a token amount.
    ToToken(ConvertArgs),
    /// USDC required to provide an amount of ESD at the given reserves.
    Quote(QuoteArgs),
    /// Run a scripted session on the in-memory devnet: connect, unlock,
    /// provide, then watch the regulation history grow.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct ConvertArgs {
    /// The amount to convert.
    pub amount: String,

    /// Token decimals.
    #[arg(long, short = 'd', default_value_t = 18)]
    pub decimals: u8,
}

#[derive(Parser, Debug)]
pub struct QuoteArgs {
    /// ESD to provide, in token units. Blank means zero.
    pub amount: String,

    /// ESD held by the pool, in token units.
    #[arg(long)]
    pub esd_reserve: String,

    /// USDC held by the pool, in token units.
    #[arg(long)]
    pub usdc_reserve: String,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Poll cycles to observe after the first snapshot.
    #[arg(long, default_value_t = 4)]
    pub cycles: u32,

    /// Override the poll period, in milliseconds.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// ESD to provide to the pool.
    #[arg(long, default_value = "10")]
    pub amount: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        EsdConsoleCli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = EsdConsoleCli::try_parse_from([
            "esd-console",
            "to-base",
            "1.23",
            "--log-format",
            "json",
            "-d",
            "6",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::ToBase(args) => {
                assert_eq!(args.amount, "1.23");
                assert_eq!(args.decimals, 6);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
