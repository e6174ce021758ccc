//! Repeating swap timer with a hard run duration.
//!
//! A run arms two timers: a repeating tick and a one-shot expiry. Every tick
//! re-checks the session, then hands one cycle to the executor on its own
//! task. The executor sits behind a single-slot lock; a tick that finds it
//! taken is skipped rather than queued, so cycles never overlap.
//!
//! Stopping cancels both timers but leaves an in-flight cycle alone; its
//! result is still recorded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::SwapSettings;
use crate::dex::ExchangeClient;
use crate::errors::{AppError, BotError};
use crate::executor::SwapExecutor;
use crate::history::{HistorySink, StatusSink};
use crate::models::{BotState, BotStatus, SwapDirection, SwapResult};
use crate::session::SessionProvider;

/// Everything a bot needs to trade, owned by one scheduler.
///
/// Nothing here is global: drop the runtime and build a new one to start over
/// with a fresh session and fresh contract handles.
pub struct BotRuntime {
    session: Arc<dyn SessionProvider>,
    executor: Arc<tokio::sync::Mutex<SwapExecutor>>,
    status: Arc<dyn StatusSink>,
}

impl BotRuntime {
    pub fn new(
        session: Arc<dyn SessionProvider>,
        exchange: Arc<dyn ExchangeClient>,
        history: Arc<dyn HistorySink>,
        status: Arc<dyn StatusSink>,
        settings: SwapSettings,
    ) -> Self {
        let executor = SwapExecutor::new(
            exchange,
            session.clone(),
            history,
            status.clone(),
            settings,
        );
        Self {
            session,
            executor: Arc::new(tokio::sync::Mutex::new(executor)),
            status,
        }
    }

    /// Direction of the last confirmed swap. Waits for any in-flight cycle.
    pub async fn last_completed(&self) -> SwapDirection {
        self.executor.lock().await.last_completed()
    }

    /// Run a single cycle outside of any schedule.
    pub async fn run_once(&self) -> Result<SwapResult, AppError> {
        if !self.session.is_session_active().await {
            return Err(BotError::NotConnected.into());
        }
        let mut executor = self.executor.lock().await;
        Ok(executor.run_cycle().await?)
    }
}

struct BotRun {
    id: u64,
    interval: Duration,
    duration: Duration,
    started_at: Instant,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Shared {
    runtime: BotRuntime,
    run: Mutex<Option<BotRun>>,
    state: watch::Sender<BotState>,
    next_id: AtomicU64,
}

/// Drives a [`BotRuntime`] on a timer. At most one run is live at a time.
pub struct BotScheduler {
    shared: Arc<Shared>,
}

impl BotScheduler {
    pub fn new(runtime: BotRuntime) -> Self {
        let (state, _) = watch::channel(BotState::Idle);
        Self {
            shared: Arc::new(Shared {
                runtime,
                run: Mutex::new(None),
                state,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn runtime(&self) -> &BotRuntime {
        &self.shared.runtime
    }

    pub fn state(&self) -> BotState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BotState> {
        self.shared.state.subscribe()
    }

    /// Arm the tick and expiry timers. The first tick fires one `interval`
    /// after start.
    pub async fn start(&self, interval: Duration, duration: Duration) -> Result<(), BotError> {
        if interval.is_zero() || duration.is_zero() {
            return Err(BotError::InvalidSchedule(format!(
                "interval {interval:?} and duration {duration:?} must be positive"
            )));
        }
        if self.state() == BotState::Running {
            return Err(BotError::AlreadyRunning);
        }
        if !self.shared.runtime.session.is_session_active().await {
            return Err(BotError::NotConnected);
        }

        let mut run = self.shared.lock_run();
        if run.is_some() {
            return Err(BotError::AlreadyRunning);
        }

        let started_at = Instant::now();
        let (Some(first_tick), Some(ends_at)) = (
            started_at.checked_add(interval),
            started_at.checked_add(duration),
        ) else {
            return Err(BotError::InvalidSchedule(format!(
                "interval {interval:?} or duration {duration:?} is out of range"
            )));
        };

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(tick_loop(
            self.shared.clone(),
            id,
            first_tick,
            interval,
            ends_at,
            shutdown_rx,
        ));
        *run = Some(BotRun {
            id,
            interval,
            duration,
            started_at,
            shutdown,
            task,
        });

        self.shared.state.send_replace(BotState::Running);
        self.shared.runtime.status.publish(BotStatus::Running);
        info!(run = id, ?interval, ?duration, "[SCHED] bot started");
        Ok(())
    }

    /// Cancel both timers. Safe to call at any time; returns whether a live
    /// run was stopped.
    pub fn stop(&self) -> bool {
        let mut run = self.shared.lock_run();
        match run.take() {
            Some(live) => {
                live.task.abort();
                self.shared.wind_down(live, None);
                true
            }
            None => false,
        }
    }

    /// Wait until no cycle is in flight.
    pub async fn drain(&self) {
        let _idle = self.shared.runtime.executor.lock().await;
    }
}

impl Drop for BotScheduler {
    fn drop(&mut self) {
        if let Some(live) = self.shared.lock_run().take() {
            live.task.abort();
        }
    }
}

impl Shared {
    fn lock_run(&self) -> MutexGuard<'_, Option<BotRun>> {
        self.run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// End run `id` from inside its own tick loop, if it is still current.
    fn finish(&self, id: u64, notice: Option<BotStatus>) {
        let mut run = self.lock_run();
        if run.as_ref().is_some_and(|r| r.id == id) {
            if let Some(live) = run.take() {
                self.wind_down(live, notice);
            }
        }
    }

    // Caller holds the run lock, which keeps status order consistent with
    // concurrent start/stop calls.
    fn wind_down(&self, live: BotRun, notice: Option<BotStatus>) {
        let _ = live.shutdown.send(true);
        self.state.send_replace(BotState::Idle);
        self.runtime.status.publish(BotStatus::Stopped);
        if let Some(notice) = notice {
            self.runtime.status.publish(notice);
        }
        info!(
            run = live.id,
            elapsed = ?live.started_at.elapsed(),
            interval = ?live.interval,
            duration = ?live.duration,
            "[SCHED] bot stopped"
        );
    }

    /// Hand one cycle to the executor unless the run ended or a cycle is
    /// still outstanding. Returns false once the run is over.
    fn dispatch(&self, id: u64, ends_at: Instant) -> bool {
        let mut run = self.lock_run();
        if !run.as_ref().is_some_and(|r| r.id == id) {
            return false;
        }
        if Instant::now() >= ends_at {
            if let Some(live) = run.take() {
                self.wind_down(live, None);
            }
            return false;
        }

        match self.runtime.executor.clone().try_lock_owned() {
            Ok(mut executor) => {
                tokio::spawn(async move {
                    let _ = executor.run_cycle().await;
                });
            }
            Err(_) => warn!(run = id, "[SCHED] previous cycle still in flight, skipping tick"),
        }
        true
    }
}

async fn tick_loop(
    shared: Arc<Shared>,
    id: u64,
    first_tick: Instant,
    interval: Duration,
    ends_at: Instant,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let expiry = tokio::time::sleep_until(ends_at);
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = &mut expiry => {
                info!(run = id, "[SCHED] run duration elapsed");
                shared.finish(id, None);
                break;
            }
            _ = ticker.tick() => {
                // the liveness check talks to the node; it must not hold off expiry
                let alive = tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = &mut expiry => {
                        info!(run = id, "[SCHED] run duration elapsed during liveness check");
                        shared.finish(id, None);
                        break;
                    }
                    alive = shared.runtime.session.is_session_active() => alive,
                };
                if !alive {
                    warn!(run = id, "[SCHED] wallet session lost, stopping");
                    shared.finish(id, Some(BotStatus::SessionLost));
                    break;
                }
                if !shared.dispatch(id, ends_at) {
                    break;
                }
            }
        }
    }
}
