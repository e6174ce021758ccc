//! DEX integration for a Uniswap-V2 style router and its traded token.

use async_trait::async_trait;
use ethers::{
    contract::abigen,
    types::{Address, H256, U256},
};

use crate::errors::SwapError;
use crate::models::SwapRequest;

pub mod client;

pub use client::RouterClient;

abigen!(
    UniswapV2Router,
    r"[
        function swapExactETHForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline) external payable returns (uint256[] amounts)
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) external returns (uint256[] amounts)
        function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts)
    ]",
);

abigen!(
    Erc20Token,
    r"[
        function balanceOf(address owner) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
    ]",
);

/// Typed access to the router and token contracts.
///
/// Submitting calls return the transaction hash as soon as the node accepts
/// the transaction; `await_confirmation` resolves it to a block.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Expected token output for spending `amount_in` native wei.
    async fn quote_buy(&self, amount_in: U256, path: Vec<Address>) -> Result<U256, SwapError>;

    async fn token_balance(&self, owner: Address) -> Result<U256, SwapError>;

    /// Let the router spend `amount` of the token.
    async fn approve(&self, amount: U256) -> Result<H256, SwapError>;

    async fn execute_buy(&self, request: &SwapRequest) -> Result<H256, SwapError>;

    async fn execute_sell(&self, request: &SwapRequest) -> Result<H256, SwapError>;

    /// Block number the transaction was mined in. Fails if it reverted.
    async fn await_confirmation(&self, tx_hash: H256) -> Result<u64, SwapError>;
}
