use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bot error: {0}")]
    Bot(#[from] BotError),

    #[error("Swap error: {0}")]
    Swap(#[from] SwapError),
}

/// Lifecycle errors raised by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BotError {
    #[error("no active wallet session")]
    NotConnected,

    #[error("bot is already running")]
    AlreadyRunning,

    #[error("wallet session lost")]
    SessionLost,

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

/// Everything that can go wrong inside one swap cycle.
///
/// Exchange calls do not distinguish reverts, rejections and transport
/// failures; they all arrive as `Failed` with the provider's message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    #[error("{0}")]
    Failed(String),

    #[error("approval failed: {0}")]
    ApprovalFailed(String),

    #[error("confirmation timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SwapError {
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }

    /// Re-tags any failure of the approval step so the caller can tell it
    /// apart from a failed swap call.
    pub fn into_approval(self) -> Self {
        match self {
            Self::ApprovalFailed(_) => self,
            other => Self::ApprovalFailed(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("connected to chain {actual}, expected {expected}")]
    WrongChain { expected: u64, actual: u64 },
}
