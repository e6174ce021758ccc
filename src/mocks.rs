//! Recording doubles for the session and exchange ports.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};

use crate::dex::ExchangeClient;
use crate::errors::SwapError;
use crate::models::SwapRequest;
use crate::session::SessionProvider;

/// Session whose liveness is flipped by the test.
#[derive(Debug)]
pub struct MockSession {
    address: Address,
    active: AtomicBool,
}

impl MockSession {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            active: AtomicBool::new(true),
        }
    }

    pub fn inactive(address: Address) -> Self {
        let session = Self::new(address);
        session.set_active(false);
        session
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionProvider for MockSession {
    async fn is_session_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn current_address(&self) -> Address {
        self.address
    }
}

/// One call observed by [`MockExchange`], in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeCall {
    QuoteBuy(U256),
    TokenBalance(Address),
    Approve(U256),
    Buy(SwapRequest),
    Sell(SwapRequest),
    Confirm(H256),
}

/// Exchange double that records calls and answers from configured behaviour.
///
/// Buys credit `buy_credit` tokens, sells drain what they spend, and every
/// submitted transaction confirms in an increasing block unless told
/// otherwise.
#[derive(Debug)]
pub struct MockExchange {
    calls: Arc<Mutex<Vec<ExchangeCall>>>,
    balance: Mutex<U256>,
    buy_credit: U256,
    approve_error: Option<String>,
    approval_revert: Option<String>,
    approvals: Mutex<Vec<H256>>,
    submit_error: Option<String>,
    revert_reason: Option<String>,
    confirm_delay: Option<Duration>,
    next_tx: AtomicU64,
    next_block: AtomicU64,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self {
            calls: Arc::default(),
            balance: Mutex::new(U256::zero()),
            buy_credit: U256::zero(),
            approve_error: None,
            approval_revert: None,
            approvals: Mutex::default(),
            submit_error: None,
            revert_reason: None,
            confirm_delay: None,
            next_tx: AtomicU64::new(1),
            next_block: AtomicU64::new(100),
        }
    }
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, balance: U256) -> Self {
        self.set_balance(balance);
        self
    }

    pub fn with_buy_credit(mut self, credit: U256) -> Self {
        self.buy_credit = credit;
        self
    }

    /// Approval submission is rejected by the provider.
    pub fn failing_approve(mut self, reason: &str) -> Self {
        self.approve_error = Some(reason.to_string());
        self
    }

    /// Approvals are mined but revert; swap confirmations are unaffected.
    pub fn reverting_approval(mut self, reason: &str) -> Self {
        self.approval_revert = Some(reason.to_string());
        self
    }

    /// Swap submissions are rejected by the provider.
    pub fn rejecting(mut self, reason: &str) -> Self {
        self.submit_error = Some(reason.to_string());
        self
    }

    /// Swap transactions are mined but revert.
    pub fn reverting(mut self, reason: &str) -> Self {
        self.revert_reason = Some(reason.to_string());
        self
    }

    /// Every confirmation takes this long.
    pub fn with_confirm_delay(mut self, delay: Duration) -> Self {
        self.confirm_delay = Some(delay);
        self
    }

    pub fn set_balance(&self, balance: U256) {
        if let Ok(mut b) = self.balance.lock() {
            *b = balance;
        }
    }

    pub fn calls(&self) -> Vec<ExchangeCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn buys(&self) -> Vec<SwapRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ExchangeCall::Buy(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn sells(&self) -> Vec<SwapRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ExchangeCall::Sell(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Number of buy and sell submissions so far.
    pub fn swaps(&self) -> usize {
        self.buys().len() + self.sells().len()
    }

    fn record(&self, call: ExchangeCall) {
        if let Ok(mut c) = self.calls.lock() {
            c.push(call);
        }
    }

    fn tx_hash(&self) -> H256 {
        H256::from_low_u64_be(self.next_tx.fetch_add(1, Ordering::SeqCst))
    }

    fn submit(&self, call: ExchangeCall) -> Result<H256, SwapError> {
        self.record(call);
        match &self.submit_error {
            Some(reason) => Err(SwapError::Failed(reason.clone())),
            None => Ok(self.tx_hash()),
        }
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn quote_buy(&self, amount_in: U256, _path: Vec<Address>) -> Result<U256, SwapError> {
        self.record(ExchangeCall::QuoteBuy(amount_in));
        Ok(amount_in)
    }

    async fn token_balance(&self, owner: Address) -> Result<U256, SwapError> {
        self.record(ExchangeCall::TokenBalance(owner));
        self.balance
            .lock()
            .map(|b| *b)
            .map_err(|e| SwapError::failed(e.to_string()))
    }

    async fn approve(&self, amount: U256) -> Result<H256, SwapError> {
        self.record(ExchangeCall::Approve(amount));
        match &self.approve_error {
            Some(reason) => Err(SwapError::ApprovalFailed(reason.clone())),
            None => {
                let hash = self.tx_hash();
                if let Ok(mut a) = self.approvals.lock() {
                    a.push(hash);
                }
                Ok(hash)
            }
        }
    }

    async fn execute_buy(&self, request: &SwapRequest) -> Result<H256, SwapError> {
        let hash = self.submit(ExchangeCall::Buy(request.clone()))?;
        if let Ok(mut b) = self.balance.lock() {
            *b = b.saturating_add(self.buy_credit);
        }
        Ok(hash)
    }

    async fn execute_sell(&self, request: &SwapRequest) -> Result<H256, SwapError> {
        let hash = self.submit(ExchangeCall::Sell(request.clone()))?;
        if let Ok(mut b) = self.balance.lock() {
            *b = b.saturating_sub(request.amount_in);
        }
        Ok(hash)
    }

    async fn await_confirmation(&self, tx_hash: H256) -> Result<u64, SwapError> {
        self.record(ExchangeCall::Confirm(tx_hash));
        if let Some(delay) = self.confirm_delay {
            tokio::time::sleep(delay).await;
        }
        let block = self.next_block.fetch_add(1, Ordering::SeqCst);
        let is_approval = self
            .approvals
            .lock()
            .map(|a| a.contains(&tx_hash))
            .unwrap_or(false);
        if is_approval {
            if let Some(reason) = &self.approval_revert {
                return Err(SwapError::Failed(format!("{reason} in block {block}")));
            }
            return Ok(block);
        }
        match &self.revert_reason {
            Some(reason) => Err(SwapError::Failed(format!("{reason} in block {block}"))),
            None => Ok(block),
        }
    }
}
