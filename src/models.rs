//! Shared data structures used throughout the application.

use std::fmt;

use ethers::types::{Address, H256, U256};
use serde::Serialize;

/// Direction of one swap against the native pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SwapDirection {
    /// native → token
    Buy,
    /// token → native
    Sell,
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => f.write_str("Buy"),
            Self::Sell => f.write_str("Sell"),
        }
    }
}

/// Parameters of a single router call. Built fresh for every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub direction: SwapDirection,
    /// Native wei for a buy, token base units for a sell.
    pub amount_in: U256,
    pub min_output: U256,
    pub path: Vec<Address>,
    pub recipient: Address,
    /// Unix seconds.
    pub deadline: U256,
}

/// Pending record appended as soon as a swap transaction is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub asset_label: String,
    pub direction: SwapDirection,
    pub amount: U256,
    pub display_amount: String,
    pub tx_hash: H256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_link: Option<String>,
}

/// Final outcome of a submitted swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapResult {
    pub direction: SwapDirection,
    pub amount_requested: U256,
    pub tx_hash: H256,
    pub outcome: SwapOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapOutcome {
    Confirmed { block: u64 },
    Failed { reason: String },
}

impl SwapResult {
    pub fn confirmed_block(&self) -> Option<u64> {
        match self.outcome {
            SwapOutcome::Confirmed { block } => Some(block),
            SwapOutcome::Failed { .. } => None,
        }
    }
}

/// Human-readable bot status as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotStatus {
    Stopped,
    Running,
    Confirmed {
        direction: SwapDirection,
        block: u64,
    },
    Error(String),
    SessionLost,
}

impl fmt::Display for BotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("Stopped"),
            Self::Running => f.write_str("Running"),
            Self::Confirmed { direction, block } => {
                write!(f, "{direction} confirmed in block {block}")
            }
            Self::Error(message) => write!(f, "Error - {message}"),
            Self::SessionLost => f.write_str("Session lost - bot stopped"),
        }
    }
}

/// Scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BotState {
    #[default]
    Idle,
    Running,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_match_operator_display() {
        assert_eq!(BotStatus::Stopped.to_string(), "Stopped");
        assert_eq!(BotStatus::Running.to_string(), "Running");
        assert_eq!(
            BotStatus::Confirmed {
                direction: SwapDirection::Sell,
                block: 4242
            }
            .to_string(),
            "Sell confirmed in block 4242"
        );
        assert_eq!(
            BotStatus::Error("insufficient funds".into()).to_string(),
            "Error - insufficient funds"
        );
    }

    #[test]
    fn history_entry_serializes_without_missing_link() {
        let entry = HistoryEntry {
            asset_label: "TOKEN".into(),
            direction: SwapDirection::Buy,
            amount: U256::from(10u64),
            display_amount: "0.00000000000000001".into(),
            tx_hash: H256::from_low_u64_be(7),
            explorer_link: None,
        };
        let json = serde_json::to_value(&entry).expect("serializes");
        assert_eq!(json["direction"], "Buy");
        assert!(json.get("explorer_link").is_none());
    }
}
