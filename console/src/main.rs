// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ESD Console
//!
//! Entry point for the `esd-console` binary.
//!
//! - `to-base` / `to-token`: unit conversion
//! - `quote`: USDC required to provide ESD at given reserves
//! - `simulate`: scripted session against the in-memory devnet
//! - `version`: print build version information

mod cli;
mod logging;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::signal;

use esd_client::config::ESD_DECIMALS;
use esd_client::devnet::{DevnetChain, DevnetWallet};
use esd_client::pool::{parse_amount_input, required_pair_amount};
use esd_client::regulation::{whole_tokens, DecreaseEntry, IncreaseEntry};
use esd_client::tokens;
use esd_client::units::{base_units_from_json, is_unlimited_allowance, to_base_unit, to_token_unit};
use esd_client::{Address, ClientConfig, Regulation, Session, TokenAmount, WalletProvider};

use cli::{Commands, EsdConsoleCli};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = EsdConsoleCli::parse();
    logging::init_logging(logging::DEFAULT_DIRECTIVES, cli.log_format);

    match cli.command {
        Commands::ToBase(args) => {
            let amount: TokenAmount = args.amount.parse()?;
            println!("{}", to_base_unit(&amount, args.decimals)?);
            Ok(())
        }
        Commands::ToToken(args) => {
            let base = base_units_from_json(&json!(args.amount)).map_err(anyhow::Error::msg)?;
            println!("{}", to_token_unit(base, args.decimals));
            Ok(())
        }
        Commands::Quote(args) => {
            let config = load_config(cli.config.as_deref())?;
            quote(&config, args)
        }
        Commands::Simulate(args) => {
            let config = load_config(cli.config.as_deref())?;
            simulate(config, args, cli.log_format).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Reads a JSON [`ClientConfig`], or falls back to the devnet deployment.
fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let Some(path) = path else {
        return Ok(ClientConfig::devnet());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: ClientConfig = serde_json::from_str(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    tracing::info!(path = %path.display(), dao = %config.dao, "configuration loaded");
    Ok(config)
}

fn quote(config: &ClientConfig, args: cli::QuoteArgs) -> Result<()> {
    let esd = tokens::esd(config);
    let usdc = tokens::usdc(config);
    let amount = parse_amount_input(&args.amount)?;
    let esd_reserve: TokenAmount = args.esd_reserve.parse().context("bad --esd-reserve")?;
    let usdc_reserve: TokenAmount = args.usdc_reserve.parse().context("bad --usdc-reserve")?;

    let required = required_pair_amount(&amount, &esd_reserve, &usdc_reserve, esd.decimals)?;
    println!(
        "{} {} requires {} {}",
        amount,
        esd.symbol,
        required.to_fixed(u32::from(usdc.decimals)),
        usdc.symbol
    );
    Ok(())
}

/// The regulation entry the devnet "mines" at `epoch`.
fn scripted_regulation(epoch: u64) -> Regulation {
    let one = whole_tokens(1, ESD_DECIMALS);
    let cents = |n: u64| whole_tokens(n, ESD_DECIMALS) / esd_client::BaseUnitAmount::from(100u64);
    match epoch % 3 {
        0 => Regulation::neutral(epoch),
        1 => Regulation::Increase(IncreaseEntry {
            epoch,
            price: one + cents(4 + epoch),
            new_redeemable: whole_tokens(1_000 * epoch, ESD_DECIMALS),
            less_debt: whole_tokens(250, ESD_DECIMALS),
            new_bonded: whole_tokens(750 * epoch, ESD_DECIMALS),
        }),
        _ => Regulation::Decrease(DecreaseEntry {
            epoch,
            price: one - cents(3 + epoch % 5),
            new_debt: whole_tokens(400, ESD_DECIMALS),
        }),
    }
}

/// Connects, unlocks, provides, and watches the regulation ledger grow on an
/// in-memory chain.
async fn simulate(mut config: ClientConfig, args: cli::SimulateArgs, format: LogFormat) -> Result<()> {
    if let Some(interval_ms) = args.interval_ms {
        config.poller.interval_ms = interval_ms;
    }
    let period = config.poller.interval();
    let amount: TokenAmount = args.amount.parse().context("bad --amount")?;

    let chain = Arc::new(DevnetChain::new());
    chain.register_pool(config.pool.clone(), config.usdc.clone());
    chain.push_regulation(&config.dao, scripted_regulation(1));

    let wallet: Arc<dyn WalletProvider> =
        Arc::new(DevnetWallet::new(Address::new("0x000000000000000000000000000000000000a11c")));
    let session = Session::new(config.clone(), Some(wallet), Arc::clone(&chain));

    let Some(account) = session.connect().await else {
        bail!("devnet wallet declined the connection");
    };

    if session.needs_approval().await? {
        let unlock = session.approve_pool_spend().await?;
        tracing::info!(tx = %unlock, "unlock submitted");
    }
    let provide = session.provide_to_pool(&amount).await?;
    chain.mine();
    let status = session.transaction_status(&provide).await?;
    let allowance = session.allowance(&config.usdc, &account, &config.pool).await?;

    let view = session.start_regulation_poll()?;

    let observe = async {
        let mut epoch = 1;
        let mut cycles_seen = 0;
        // Let the immediate fetch land before the first print.
        tokio::time::sleep(Duration::from_millis(50).min(period)).await;
        loop {
            print_history(&view.rows(ESD_DECIMALS), format);
            tracing::info!(status = ?view.status(), entries = view.entries().len(), "ledger view");
            if cycles_seen >= args.cycles {
                break;
            }
            epoch += 1;
            chain.push_regulation(&config.dao, scripted_regulation(epoch));
            tokio::time::sleep(period).await;
            cycles_seen += 1;
        }
    };

    tokio::select! {
        _ = observe => {}
        _ = signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }

    session.disconnect();

    let summary = json!({
        "account": account,
        "provided": amount.to_string(),
        "provide_tx": provide.to_hex(),
        "provide_status": status,
        "pool_unlocked": is_unlimited_allowance(allowance),
        "ledger_entries": view.entries().len(),
        "last_cycle": view.snapshot().map(|s| s.cycle),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_history(rows: &[[String; 5]], format: LogFormat) {
    if format == LogFormat::Json {
        return;
    }
    println!("{:>6} {:>8} {:>14} {:>12} {:>14}", "epoch", "price", "redeemable", "debt", "bonded");
    for row in rows {
        println!(
            "{:>6} {:>8} {:>14} {:>12} {:>14}",
            row[0], row[1], row[2], row[3], row[4]
        );
    }
}

fn print_version() {
    println!("esd-console {}", env!("CARGO_PKG_VERSION"));
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
