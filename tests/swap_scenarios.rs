//! End-to-end swap loop scenarios against the recording doubles.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use swap_cycler::config::SwapSettings;
use swap_cycler::history::MemoryHistory;
use swap_cycler::mocks::{ExchangeCall, MockExchange, MockSession};
use swap_cycler::models::{BotState, BotStatus, SwapDirection};
use swap_cycler::scheduler::{BotRuntime, BotScheduler};
use tokio::sync::mpsc;

fn owner() -> Address {
    Address::repeat_byte(0x11)
}

fn token() -> Address {
    Address::repeat_byte(0xbb)
}

struct Bot {
    scheduler: BotScheduler,
    session: Arc<MockSession>,
    exchange: Arc<MockExchange>,
    history: MemoryHistory,
    status: mpsc::UnboundedReceiver<BotStatus>,
}

fn bot(exchange: MockExchange) -> Bot {
    let session = Arc::new(MockSession::new(owner()));
    let exchange = Arc::new(exchange);
    let history = MemoryHistory::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let runtime = BotRuntime::new(
        session.clone(),
        exchange.clone(),
        Arc::new(history.clone()),
        Arc::new(tx),
        SwapSettings {
            token_address: token(),
            amount: "0.25".into(),
            ..SwapSettings::default()
        },
    );
    Bot {
        scheduler: BotScheduler::new(runtime),
        session,
        exchange,
        history,
        status: rx,
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<BotStatus>) -> Vec<BotStatus> {
    let mut out = Vec::new();
    while let Ok(status) = rx.try_recv() {
        out.push(status);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn empty_wallet_buys_configured_amount() {
    let mut bot = bot(MockExchange::new());

    bot.scheduler
        .start(Duration::from_secs(30), Duration::from_secs(600))
        .await
        .expect("start");
    tokio::time::sleep(Duration::from_secs(31)).await;
    bot.scheduler.stop();

    let buys = bot.exchange.buys();
    assert_eq!(buys.len(), 1);
    assert_eq!(buys[0].amount_in, parse_ether("0.25").unwrap());
    assert!(bot.exchange.sells().is_empty());

    let entries = bot.history.submitted();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].direction, SwapDirection::Buy);
    assert_eq!(
        bot.scheduler.runtime().last_completed().await,
        SwapDirection::Buy
    );

    let seen = drain(&mut bot.status);
    assert_eq!(seen.first(), Some(&BotStatus::Running));
    assert!(seen.contains(&BotStatus::Confirmed {
        direction: SwapDirection::Buy,
        block: 100
    }));
}

#[tokio::test(start_paused = true)]
async fn held_tokens_after_buy_are_sold_in_full() {
    let bot = bot(MockExchange::new().with_buy_credit(U256::from(1_000u64)));

    bot.scheduler
        .start(Duration::from_secs(10), Duration::from_secs(600))
        .await
        .expect("start");
    // first tick buys, second tick sells what the buy left behind
    tokio::time::sleep(Duration::from_secs(25)).await;
    bot.scheduler.stop();

    let calls: Vec<_> = bot
        .exchange
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ExchangeCall::Approve(_) | ExchangeCall::Sell(_)))
        .collect();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], ExchangeCall::Approve(U256::from(1_000u64)));
    match &calls[1] {
        ExchangeCall::Sell(request) => {
            assert_eq!(request.amount_in, U256::from(1_000u64));
            assert_eq!(request.path, vec![token(), Address::zero()]);
            assert_eq!(request.recipient, owner());
        }
        other => panic!("expected sell, got {other:?}"),
    }

    let directions: Vec<_> = bot.history.submitted().iter().map(|e| e.direction).collect();
    assert_eq!(directions, vec![SwapDirection::Buy, SwapDirection::Sell]);
}

#[tokio::test(start_paused = true)]
async fn session_drop_between_ticks_stops_bot() {
    let mut bot = bot(MockExchange::new());

    bot.scheduler
        .start(Duration::from_secs(10), Duration::from_secs(600))
        .await
        .expect("start");
    tokio::time::sleep(Duration::from_secs(12)).await;
    let before = bot.exchange.calls().len();

    bot.session.set_active(false);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(bot.scheduler.state(), BotState::Idle);
    assert_eq!(bot.exchange.calls().len(), before);
    let seen = drain(&mut bot.status);
    assert!(seen.contains(&BotStatus::SessionLost));

    // nothing else happens once idle
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(bot.exchange.calls().len(), before);
}

#[tokio::test(start_paused = true)]
async fn rejected_swap_keeps_bot_running() {
    let mut bot = bot(MockExchange::new().rejecting("user rejected transaction"));

    bot.scheduler
        .start(Duration::from_secs(10), Duration::from_secs(600))
        .await
        .expect("start");
    tokio::time::sleep(Duration::from_secs(15)).await;

    assert_eq!(bot.scheduler.state(), BotState::Running);
    let seen = drain(&mut bot.status);
    assert_eq!(
        seen.last(),
        Some(&BotStatus::Error("user rejected transaction".into()))
    );
    assert_eq!(
        seen.last().map(ToString::to_string).as_deref(),
        Some("Error - user rejected transaction")
    );
    assert!(bot.history.submitted().is_empty());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(bot.exchange.buys().len(), 2);
    assert_eq!(bot.scheduler.state(), BotState::Running);
    bot.scheduler.stop();
}
