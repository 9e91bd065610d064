//! Wallet CLI
//!
//! `wallet watch <account>` runs the sync engine and prints every published
//! state as a JSON line. `wallet meters <account>` does a single pull and
//! prints the account's resource meters.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;
use wallet_core::effects::Clock;
use wallet_core::{AccountKey, ChainClient, LoadingStage, ResourceMeterCalculator};
use wallet_effects::{HttpJsonRpcTransport, SystemClock};
use wallet_sync::{SyncConfig, WalletEngine};

#[derive(Parser)]
#[command(name = "wallet")]
#[command(about = "Account state sync for Steem wallets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".wallet/config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow an account and print each published state as JSON
    Watch {
        /// Account to load
        account: String,

        /// Switch to this account after `--after` seconds
        #[arg(long)]
        switch_to: Option<String>,

        /// Delay before `--switch-to` takes effect
        #[arg(long, default_value_t = 10)]
        after: u64,

        /// Exit once the last requested account reaches a terminal stage
        #[arg(long)]
        once: bool,
    },

    /// Fetch an account once and print its resource meters as JSON
    Meters {
        /// Account to inspect
        account: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Watch {
            account,
            switch_to,
            after,
            once,
        } => {
            let account = AccountKey::parse(&account)?;
            let switch_to = switch_to.map(|name| AccountKey::parse(&name)).transpose()?;
            watch(config, account, switch_to, Duration::from_secs(after), once).await?;
        }
        Commands::Meters { account } => {
            let account = AccountKey::parse(&account)?;
            meters(&config, &account).await?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<SyncConfig> {
    let mut config = if path.exists() {
        SyncConfig::load_from_file(path)?
    } else {
        info!(path = %path.display(), "No config file, using defaults");
        SyncConfig::default()
    };
    config.merge_with_env()?;
    config.validate()?;
    Ok(config)
}

async fn watch(
    config: SyncConfig,
    account: AccountKey,
    switch_to: Option<AccountKey>,
    after: Duration,
    once: bool,
) -> Result<()> {
    let engine = Arc::new(WalletEngine::from_config(config).await?);
    engine.start();
    let mut states = engine.subscribe();
    let target = switch_to.clone().unwrap_or_else(|| account.clone());

    tokio::spawn({
        let engine = engine.clone();
        async move {
            let outcome = engine.switch_account(account.clone()).await;
            info!(account = %account, ?outcome, "Initial account loaded");
            if let Some(next) = switch_to {
                tokio::time::sleep(after).await;
                let outcome = engine.switch_account(next.clone()).await;
                info!(account = %next, ?outcome, "Switched account");
            }
        }
    });

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    warn!("State publisher closed");
                    break;
                }
                let state = states.borrow_and_update().clone();
                println!("{}", serde_json::to_string(&state)?);
                let settled = matches!(state.loading_stage, LoadingStage::Ready | LoadingStage::Error);
                if once && settled && state.account.as_ref() == Some(&target) {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("Interrupted");
                break;
            }
        }
    }

    engine.shutdown();
    Ok(())
}

async fn meters(config: &SyncConfig, account: &AccountKey) -> Result<()> {
    let nodes = config
        .network
        .rpc_nodes
        .iter()
        .map(|node| Url::parse(node).with_context(|| format!("invalid rpc node {node:?}")))
        .collect::<Result<Vec<_>>>()?;
    let chain = ChainClient::new(Arc::new(HttpJsonRpcTransport::new(
        nodes,
        config.network.request_timeout(),
    )?));

    let (snapshot, rc, fund, price) = tokio::join!(
        chain.get_account(account),
        chain.find_rc_account(account),
        chain.get_reward_fund(),
        chain.get_price(),
    );
    let mut snapshot = snapshot?;
    match rc {
        Ok(rc) => snapshot.rc_manabar = rc,
        Err(e) => warn!(error = %e, "Resource credits unavailable"),
    }
    match fund {
        Ok(fund) => snapshot.reward_fund = Some(fund),
        Err(e) => warn!(error = %e, "Reward fund unavailable"),
    }
    match price {
        Ok(price) => snapshot.price = Some(price),
        Err(e) => warn!(error = %e, "Price unavailable"),
    }

    let meters = ResourceMeterCalculator::compute(&snapshot, SystemClock.now_secs());
    println!("{}", serde_json::to_string_pretty(&meters)?);
    Ok(())
}
