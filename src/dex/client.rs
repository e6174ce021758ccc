use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::{
    providers::Middleware,
    types::{Address, H256, U256, U64},
};
use tracing::{debug, warn};

use super::{Erc20Token, ExchangeClient, UniswapV2Router};
use crate::errors::SwapError;
use crate::models::{SwapDirection, SwapRequest};

/// Handle for swapping one token against the native currency on a router.
pub struct RouterClient<M> {
    router: UniswapV2Router<M>,
    token: Erc20Token<M>,
    client: Arc<M>,
    receipt_poll: Duration,
}

impl<M: Middleware + 'static> RouterClient<M> {
    pub fn new(client: Arc<M>, router: Address, token: Address) -> Self {
        Self {
            router: UniswapV2Router::new(router, client.clone()),
            token: Erc20Token::new(token, client.clone()),
            client,
            receipt_poll: Duration::from_secs(1),
        }
    }

    pub fn with_receipt_poll(mut self, interval: Duration) -> Self {
        self.receipt_poll = interval;
        self
    }

    pub fn router_address(&self) -> Address {
        self.router.address()
    }

    pub fn token_address(&self) -> Address {
        self.token.address()
    }
}

#[async_trait]
impl<M: Middleware + 'static> ExchangeClient for RouterClient<M> {
    async fn quote_buy(&self, amount_in: U256, path: Vec<Address>) -> Result<U256, SwapError> {
        let amounts = self
            .router
            .get_amounts_out(amount_in, path)
            .call()
            .await
            .map_err(SwapError::failed)?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| SwapError::Failed("router returned no amounts".into()))
    }

    async fn token_balance(&self, owner: Address) -> Result<U256, SwapError> {
        self.token
            .balance_of(owner)
            .call()
            .await
            .map_err(SwapError::failed)
    }

    async fn approve(&self, amount: U256) -> Result<H256, SwapError> {
        let call = self.token.approve(self.router.address(), amount);
        let pending = call
            .send()
            .await
            .map_err(|e| SwapError::failed(e).into_approval())?;
        Ok(pending.tx_hash())
    }

    async fn execute_buy(&self, request: &SwapRequest) -> Result<H256, SwapError> {
        debug_assert_eq!(request.direction, SwapDirection::Buy);
        let call = self
            .router
            .swap_exact_eth_for_tokens(
                request.min_output,
                request.path.clone(),
                request.recipient,
                request.deadline,
            )
            .value(request.amount_in);
        let pending = call.send().await.map_err(SwapError::failed)?;
        Ok(pending.tx_hash())
    }

    async fn execute_sell(&self, request: &SwapRequest) -> Result<H256, SwapError> {
        debug_assert_eq!(request.direction, SwapDirection::Sell);
        let call = self.router.swap_exact_tokens_for_eth(
            request.amount_in,
            request.min_output,
            request.path.clone(),
            request.recipient,
            request.deadline,
        );
        let pending = call.send().await.map_err(SwapError::failed)?;
        Ok(pending.tx_hash())
    }

    async fn await_confirmation(&self, tx_hash: H256) -> Result<u64, SwapError> {
        loop {
            match self.client.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => match receipt.block_number {
                    Some(block) => {
                        let block = block.as_u64();
                        if receipt.status == Some(U64::from(1)) {
                            return Ok(block);
                        }
                        return Err(SwapError::Failed(format!(
                            "transaction {tx_hash:?} reverted in block {block}"
                        )));
                    }
                    None => debug!(?tx_hash, "[DEX] receipt has no block yet"),
                },
                Ok(None) => {
                    debug!(?tx_hash, "[DEX] waiting for receipt");
                }
                Err(e) => {
                    warn!(?tx_hash, error = %e, "[DEX] receipt lookup failed");
                }
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }
}
