//! Configuration loader and application settings.

use std::str::FromStr;
use std::time::Duration;

use ethers::types::{Address, U256};

use crate::errors::{AppError, Result};

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// RPC endpoint for the EVM node.
    pub rpc_url: String,
    /// Hex private key of the trading account.
    pub private_key: String,
    /// Chain the session must stay on. `None` pins whatever the node reports at connect.
    pub chain_id: Option<u64>,
    pub router_address: Address,
    pub swap: SwapSettings,
    pub schedule: ScheduleSettings,
    /// Interval between receipt polls while waiting for confirmation.
    pub receipt_poll: Duration,
}

/// Per-cycle swap parameters.
#[derive(Debug, Clone)]
pub struct SwapSettings {
    pub token_address: Address,
    /// Placeholder for the native currency in router paths.
    pub native_address: Address,
    /// Decimal native amount spent per buy. Checked when a cycle starts.
    pub amount: String,
    /// Minimum router output; zero disables slippage protection.
    pub min_output: U256,
    /// Added to wall-clock time to form the router deadline.
    pub deadline: Duration,
    pub confirmation_timeout: Duration,
    pub asset_label: String,
    /// Prefix joined with a tx hash to form a block-explorer link.
    pub explorer_tx_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub interval: Duration,
    pub duration: Duration,
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            token_address: Address::zero(),
            native_address: Address::zero(),
            amount: "0.01".into(),
            min_output: U256::zero(),
            deadline: Duration::from_secs(20 * 60),
            confirmation_timeout: Duration::from_secs(120),
            asset_label: "TOKEN".into(),
            explorer_tx_url: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_url = required(&lookup, "RPC_URL")?;
        let private_key = required(&lookup, "PRIVATE_KEY")?;
        let chain_id = optional::<u64, _>(&lookup, "CHAIN_ID")?;
        let router_address = parse("ROUTER_ADDRESS", &required(&lookup, "ROUTER_ADDRESS")?)?;
        let token_address = parse("TOKEN_ADDRESS", &required(&lookup, "TOKEN_ADDRESS")?)?;
        let native_address = optional(&lookup, "NATIVE_ADDRESS")?.unwrap_or_else(Address::zero);
        let amount = required(&lookup, "SWAP_AMOUNT")?;

        let min_output = match lookup("MIN_OUTPUT") {
            Some(raw) => U256::from_dec_str(raw.trim())
                .map_err(|e| AppError::Config(format!("MIN_OUTPUT: {e}")))?,
            None => U256::zero(),
        };

        let interval_secs = positive(&lookup, "INTERVAL_SECS", 60)?;
        let duration_secs = positive(&lookup, "DURATION_MINUTES", 60)?
            .checked_mul(60)
            .ok_or_else(|| AppError::Config("DURATION_MINUTES is too large".into()))?;
        let deadline_secs = positive(&lookup, "DEADLINE_SECS", 20 * 60)?;
        let confirmation_secs = positive(&lookup, "CONFIRMATION_TIMEOUT_SECS", 120)?;
        let receipt_poll_ms = positive(&lookup, "RECEIPT_POLL_MS", 1_000)?;

        let asset_label = lookup("ASSET_LABEL").unwrap_or_else(|| "TOKEN".into());
        let explorer_tx_url = lookup("EXPLORER_TX_URL").filter(|s| !s.trim().is_empty());

        Ok(Self {
            rpc_url,
            private_key,
            chain_id,
            router_address,
            swap: SwapSettings {
                token_address,
                native_address,
                amount,
                min_output,
                deadline: Duration::from_secs(deadline_secs),
                confirmation_timeout: Duration::from_secs(confirmation_secs),
                asset_label,
                explorer_tx_url,
            },
            schedule: ScheduleSettings {
                interval: Duration::from_secs(interval_secs),
                duration: Duration::from_secs(duration_secs),
            },
            receipt_poll: Duration::from_millis(receipt_poll_ms),
        })
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Config(format!("Set {key} env var")))
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| AppError::Config(format!("{key}: {e}")))
}

fn optional<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => parse(key, raw.trim()).map(Some),
        None => Ok(None),
    }
}

fn positive<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let value = optional::<u64, _>(lookup, key)?.unwrap_or(default);
    if value == 0 {
        return Err(AppError::Config(format!("{key} must be positive")));
    }
    Ok(value)
}
