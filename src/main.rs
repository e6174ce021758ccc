use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethers::utils::parse_ether;
use swap_cycler::{
    config::AppConfig,
    dex::{ExchangeClient, RouterClient},
    history::TracingHistory,
    models::{BotState, BotStatus, SwapOutcome},
    scheduler::{BotRuntime, BotScheduler},
    session::{SessionProvider, WalletSession},
    utils,
};
use tokio::sync::watch;

/// Alternating buy/sell swap bot for a Uniswap-V2 style router
#[derive(Parser, Debug)]
#[command(name = "swap-cycler", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the timed swap loop
    Run {
        /// Override INTERVAL_SECS
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,

        /// Override DURATION_MINUTES
        #[arg(long, value_name = "MINUTES")]
        duration_minutes: Option<u64>,
    },

    /// Execute a single swap cycle and exit
    Swap,

    /// Quote the configured buy amount against the router
    Quote,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();
    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(amount = %config.swap.amount, "[INIT] swap-cycler starting");

    let session = Arc::new(
        WalletSession::connect(&config.rpc_url, &config.private_key, config.chain_id)
            .await
            .context("failed to open wallet session")?,
    );
    let exchange = Arc::new(
        RouterClient::new(
            session.client(),
            config.router_address,
            config.swap.token_address,
        )
        .with_receipt_poll(config.receipt_poll),
    );
    tracing::info!(
        chain_id = session.chain_id(),
        router = ?exchange.router_address(),
        token = ?exchange.token_address(),
        "[INIT] router client ready"
    );

    let (status_tx, status_rx) = watch::channel(BotStatus::Stopped);
    let logger = utils::spawn_status_logger(status_rx);

    match cli.command {
        Command::Quote => {
            drop(status_tx);
            let amount_in = parse_ether(config.swap.amount.trim())
                .with_context(|| {
                    format!("SWAP_AMOUNT {:?} is not a decimal amount", config.swap.amount)
                })?;
            let path = vec![config.swap.native_address, config.swap.token_address];
            let out = exchange.quote_buy(amount_in, path).await?;
            tracing::info!(
                amount = %config.swap.amount,
                expected_out = %out,
                "[QUOTE] {} native buys {} {} base units",
                config.swap.amount,
                out,
                config.swap.asset_label
            );
        }
        Command::Swap => {
            let runtime = BotRuntime::new(
                session.clone(),
                exchange,
                Arc::new(TracingHistory),
                Arc::new(status_tx),
                config.swap.clone(),
            );
            let result = runtime.run_once().await?;
            if let SwapOutcome::Confirmed { block } = result.outcome {
                tracing::info!(direction = %result.direction, block, tx = ?result.tx_hash, "[SWAP] done");
            }
        }
        Command::Run {
            interval_secs,
            duration_minutes,
        } => {
            let interval = interval_secs
                .map(Duration::from_secs)
                .unwrap_or(config.schedule.interval);
            let duration = match duration_minutes {
                Some(m) => m
                    .checked_mul(60)
                    .map(Duration::from_secs)
                    .context("--duration-minutes is too large")?,
                None => config.schedule.duration,
            };

            let runtime = BotRuntime::new(
                session.clone(),
                exchange,
                Arc::new(TracingHistory),
                Arc::new(status_tx),
                config.swap.clone(),
            );
            let scheduler = BotScheduler::new(runtime);
            let mut state = scheduler.subscribe_state();
            scheduler.start(interval, duration).await?;

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("[MAIN] interrupt received, stopping bot");
                    scheduler.stop();
                }
                _ = state.wait_for(|s| *s == BotState::Idle) => {}
            }

            // let an in-flight cycle settle before exiting
            scheduler.drain().await;
            if !session.is_session_active().await {
                tracing::warn!("[MAIN] wallet session is gone; restart to reconnect");
            }
            drop(scheduler);
        }
    }

    let _ = tokio::time::timeout(Duration::from_secs(1), logger).await;
    Ok(())
}
