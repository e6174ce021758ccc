//! One buy-or-sell swap cycle.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::{Address, H256, U256};
use ethers::utils::{format_ether, parse_ether};
use tracing::{debug, error, info, warn};

use crate::config::SwapSettings;
use crate::dex::ExchangeClient;
use crate::errors::SwapError;
use crate::history::{HistorySink, StatusSink};
use crate::models::{
    BotStatus, HistoryEntry, SwapDirection, SwapOutcome, SwapRequest, SwapResult,
};
use crate::session::SessionProvider;
use crate::strategy::decide;

/// Runs swap cycles and remembers the last completed direction between them.
///
/// The remembered direction only advances once a cycle confirms on chain, so
/// a failed buy is attempted again as a buy.
pub struct SwapExecutor {
    exchange: Arc<dyn ExchangeClient>,
    session: Arc<dyn SessionProvider>,
    history: Arc<dyn HistorySink>,
    status: Arc<dyn StatusSink>,
    settings: SwapSettings,
    last_completed: SwapDirection,
}

/// A transaction the node accepted, not yet confirmed.
struct Submitted {
    direction: SwapDirection,
    amount: U256,
    tx_hash: H256,
}

impl SwapExecutor {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        session: Arc<dyn SessionProvider>,
        history: Arc<dyn HistorySink>,
        status: Arc<dyn StatusSink>,
        settings: SwapSettings,
    ) -> Self {
        Self {
            exchange,
            session,
            history,
            status,
            settings,
            last_completed: SwapDirection::Sell,
        }
    }

    pub fn last_completed(&self) -> SwapDirection {
        self.last_completed
    }

    /// Run one cycle end to end.
    ///
    /// Never panics or propagates into the caller's loop: every failure is
    /// published as an `Error - ..` status and returned for inspection.
    pub async fn run_cycle(&mut self) -> Result<SwapResult, SwapError> {
        let submitted = match self.submit().await {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "[SWAP] cycle failed before submission");
                self.status.publish(BotStatus::Error(e.to_string()));
                return Err(e);
            }
        };

        let outcome = self.confirm(submitted.tx_hash).await;
        let result = SwapResult {
            direction: submitted.direction,
            amount_requested: submitted.amount,
            tx_hash: submitted.tx_hash,
            outcome: match &outcome {
                Ok(block) => SwapOutcome::Confirmed { block: *block },
                Err(e) => SwapOutcome::Failed {
                    reason: e.to_string(),
                },
            },
        };
        self.history.record_result(&result);

        match outcome {
            Ok(block) => {
                self.last_completed = submitted.direction;
                info!(
                    direction = %submitted.direction,
                    block,
                    tx = ?submitted.tx_hash,
                    "[SWAP] confirmed"
                );
                self.status.publish(BotStatus::Confirmed {
                    direction: submitted.direction,
                    block,
                });
                Ok(result)
            }
            Err(e) => {
                error!(
                    direction = %submitted.direction,
                    tx = ?submitted.tx_hash,
                    error = %e,
                    "[SWAP] confirmation failed"
                );
                self.status.publish(BotStatus::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn submit(&self) -> Result<Submitted, SwapError> {
        let buy_amount = self.buy_amount()?;
        let owner = self.session.current_address();

        let balance = self.exchange.token_balance(owner).await?;
        let direction = decide(self.last_completed, balance);
        debug!(%direction, %balance, last = %self.last_completed, "[SWAP] decided");

        let (request, display_amount) = match direction {
            SwapDirection::Buy => (
                self.request(direction, buy_amount, owner),
                self.settings.amount.trim().to_string(),
            ),
            SwapDirection::Sell => (self.request(direction, balance, owner), format_ether(balance)),
        };

        let tx_hash = match direction {
            SwapDirection::Buy => {
                match self
                    .exchange
                    .quote_buy(request.amount_in, request.path.clone())
                    .await
                {
                    Ok(out) => debug!(expected_out = %out, "[SWAP] buy quote"),
                    Err(e) => debug!(error = %e, "[SWAP] buy quote unavailable"),
                }
                self.exchange.execute_buy(&request).await?
            }
            SwapDirection::Sell => {
                let approval = self
                    .exchange
                    .approve(request.amount_in)
                    .await
                    .map_err(SwapError::into_approval)?;
                self.confirm(approval)
                    .await
                    .map_err(SwapError::into_approval)?;
                self.exchange.execute_sell(&request).await?
            }
        };

        info!(%direction, amount = %display_amount, tx = ?tx_hash, "[SWAP] transaction sent");
        self.history.record_submitted(&HistoryEntry {
            asset_label: self.settings.asset_label.clone(),
            direction,
            amount: request.amount_in,
            display_amount,
            tx_hash,
            explorer_link: self.explorer_link(tx_hash),
        });

        Ok(Submitted {
            direction,
            amount: request.amount_in,
            tx_hash,
        })
    }

    async fn confirm(&self, tx_hash: H256) -> Result<u64, SwapError> {
        let timeout = self.settings.confirmation_timeout;
        match tokio::time::timeout(timeout, self.exchange.await_confirmation(tx_hash)).await {
            Ok(res) => res,
            Err(_) => {
                warn!(tx = ?tx_hash, ?timeout, "[SWAP] confirmation timed out");
                Err(SwapError::Timeout(timeout))
            }
        }
    }

    fn buy_amount(&self) -> Result<U256, SwapError> {
        let raw = self.settings.amount.trim();
        if raw.starts_with('-') {
            return Err(SwapError::InvalidConfig(format!(
                "swap amount {raw:?} must be positive"
            )));
        }
        let amount = parse_ether(raw)
            .map_err(|e| SwapError::InvalidConfig(format!("swap amount {raw:?}: {e}")))?;
        if amount.is_zero() {
            return Err(SwapError::InvalidConfig(format!(
                "swap amount {raw:?} must be positive"
            )));
        }
        Ok(amount)
    }

    fn request(&self, direction: SwapDirection, amount_in: U256, recipient: Address) -> SwapRequest {
        let native = self.settings.native_address;
        let token = self.settings.token_address;
        let path = match direction {
            SwapDirection::Buy => vec![native, token],
            SwapDirection::Sell => vec![token, native],
        };
        SwapRequest {
            direction,
            amount_in,
            min_output: self.settings.min_output,
            path,
            recipient,
            deadline: U256::from(deadline_from_now(self.settings.deadline.as_secs())),
        }
    }

    fn explorer_link(&self, tx_hash: H256) -> Option<String> {
        self.settings
            .explorer_tx_url
            .as_ref()
            .map(|base| format!("{}/{:?}", base.trim_end_matches('/'), tx_hash))
    }
}

fn deadline_from_now(margin_secs: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    now + margin_secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistory;
    use crate::mocks::{ExchangeCall, MockExchange, MockSession};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        executor: SwapExecutor,
        exchange: Arc<MockExchange>,
        history: MemoryHistory,
        status: mpsc::UnboundedReceiver<BotStatus>,
    }

    fn settings() -> SwapSettings {
        SwapSettings {
            token_address: Address::repeat_byte(0xbb),
            amount: "0.5".into(),
            ..SwapSettings::default()
        }
    }

    fn harness(exchange: MockExchange, settings: SwapSettings) -> Harness {
        let exchange = Arc::new(exchange);
        let history = MemoryHistory::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = SwapExecutor::new(
            exchange.clone(),
            Arc::new(MockSession::new(Address::repeat_byte(0x11))),
            Arc::new(history.clone()),
            Arc::new(tx),
            settings,
        );
        Harness {
            executor,
            exchange,
            history,
            status: rx,
        }
    }

    #[tokio::test]
    async fn first_cycle_buys_configured_amount() {
        let mut h = harness(MockExchange::new(), settings());
        let result = h.executor.run_cycle().await.expect("buy confirms");

        assert_eq!(result.direction, SwapDirection::Buy);
        assert_eq!(result.amount_requested, parse_ether("0.5").unwrap());
        assert_eq!(h.executor.last_completed(), SwapDirection::Buy);

        let buys = h.exchange.buys();
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].path, vec![Address::zero(), Address::repeat_byte(0xbb)]);
        assert_eq!(buys[0].recipient, Address::repeat_byte(0x11));
        assert_eq!(buys[0].min_output, U256::zero());

        let submitted = h.history.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].display_amount, "0.5");
        assert_eq!(submitted[0].asset_label, "TOKEN");
    }

    #[tokio::test]
    async fn deadline_is_twenty_minutes_out() {
        let mut h = harness(MockExchange::new(), settings());
        let before = deadline_from_now(0);
        h.executor.run_cycle().await.expect("buy confirms");
        let deadline = h.exchange.buys()[0].deadline.as_u64();
        assert!(deadline >= before + 1200);
        assert!(deadline <= deadline_from_now(1200));
    }

    #[tokio::test]
    async fn sell_approves_whole_balance_first() {
        let exchange = MockExchange::new().with_balance(U256::from(1_000u64));
        let mut h = harness(exchange, settings());
        h.executor.last_completed = SwapDirection::Buy;

        let result = h.executor.run_cycle().await.expect("sell confirms");
        assert_eq!(result.direction, SwapDirection::Sell);

        let calls = h.exchange.calls();
        let approve_at = calls
            .iter()
            .position(|c| matches!(c, ExchangeCall::Approve(a) if *a == U256::from(1_000u64)))
            .expect("approve issued");
        let sell_at = calls
            .iter()
            .position(|c| matches!(c, ExchangeCall::Sell(_)))
            .expect("sell issued");
        assert!(approve_at < sell_at);
        // approval must be mined before the sell goes out
        assert!(
            calls[approve_at..sell_at]
                .iter()
                .any(|c| matches!(c, ExchangeCall::Confirm(_)))
        );

        let sells = h.exchange.sells();
        assert_eq!(sells[0].amount_in, U256::from(1_000u64));
        assert_eq!(sells[0].path, vec![Address::repeat_byte(0xbb), Address::zero()]);
        assert_eq!(h.history.submitted()[0].direction, SwapDirection::Sell);
    }

    #[tokio::test]
    async fn failed_approval_never_sells() {
        let exchange = MockExchange::new()
            .with_balance(U256::from(1_000u64))
            .failing_approve("allowance rejected");
        let mut h = harness(exchange, settings());
        h.executor.last_completed = SwapDirection::Buy;

        let err = h.executor.run_cycle().await.unwrap_err();
        assert!(matches!(err, SwapError::ApprovalFailed(_)));
        assert!(h.exchange.sells().is_empty());
        assert!(h.history.submitted().is_empty());
        assert_eq!(
            h.status.recv().await,
            Some(BotStatus::Error("approval failed: allowance rejected".into()))
        );
    }

    #[tokio::test]
    async fn reverted_approval_never_sells() {
        let exchange = MockExchange::new()
            .with_balance(U256::from(1_000u64))
            .reverting_approval("execution reverted");
        let mut h = harness(exchange, settings());
        h.executor.last_completed = SwapDirection::Buy;

        let err = h.executor.run_cycle().await.unwrap_err();
        assert_eq!(
            err,
            SwapError::ApprovalFailed("execution reverted in block 100".into())
        );
        assert!(
            h.exchange
                .calls()
                .iter()
                .any(|c| matches!(c, ExchangeCall::Approve(_)))
        );
        assert!(h.exchange.sells().is_empty());
        assert!(h.history.submitted().is_empty());
        assert!(h.history.results().is_empty());
        assert_eq!(h.executor.last_completed(), SwapDirection::Buy);
        assert_eq!(
            h.status.recv().await,
            Some(BotStatus::Error(
                "approval failed: execution reverted in block 100".into()
            ))
        );
    }

    #[tokio::test]
    async fn failed_buy_is_retried_as_buy() {
        let exchange = MockExchange::new().reverting("execution reverted");
        let mut h = harness(exchange, settings());

        assert!(h.executor.run_cycle().await.is_err());
        assert_eq!(h.executor.last_completed(), SwapDirection::Sell);

        // submitted-but-failed keeps its pending entry plus a failed result
        assert_eq!(h.history.submitted().len(), 1);
        let results = h.history.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].confirmed_block(), None);

        h.exchange.set_balance(U256::from(10u64));
        let _ = h.executor.run_cycle().await;
        assert_eq!(h.exchange.buys().len(), 2);
        assert!(h.exchange.sells().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_timeout_is_reported() {
        let exchange = MockExchange::new().with_confirm_delay(Duration::from_secs(600));
        let mut s = settings();
        s.confirmation_timeout = Duration::from_secs(30);
        let mut h = harness(exchange, s);

        let err = h.executor.run_cycle().await.unwrap_err();
        assert_eq!(err, SwapError::Timeout(Duration::from_secs(30)));
        assert_eq!(
            h.status.recv().await,
            Some(BotStatus::Error("confirmation timed out after 30s".into()))
        );
    }

    #[tokio::test]
    async fn malformed_amount_fails_at_cycle_start() {
        let mut s = settings();
        s.amount = "lots".into();
        let mut h = harness(MockExchange::new(), s);

        let err = h.executor.run_cycle().await.unwrap_err();
        assert!(matches!(err, SwapError::InvalidConfig(_)));
        assert!(h.exchange.calls().is_empty());
    }

    #[tokio::test]
    async fn explorer_link_uses_tx_hash() {
        let mut s = settings();
        s.explorer_tx_url = Some("https://testnet.monadexplorer.com/tx/".into());
        let mut h = harness(MockExchange::new(), s);
        h.executor.run_cycle().await.expect("buy confirms");

        let entry = &h.history.submitted()[0];
        let link = entry.explorer_link.as_deref().expect("link");
        assert_eq!(
            link,
            format!("https://testnet.monadexplorer.com/tx/{:?}", entry.tx_hash)
        );
    }
}
