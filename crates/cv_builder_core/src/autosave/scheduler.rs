//! crates/cv_builder_core/src/autosave/scheduler.rs
//!
//! The periodic save loop. It is an owned task with an explicit start/stop
//! lifecycle; the tick source is injected so tests can drive it by hand.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Something that wakes the scheduler up.
#[async_trait]
pub trait TickSource: Send {
    /// Resolves at the next tick. Must be cancel-safe.
    async fn tick(&mut self);
}

/// Fixed-period ticks backed by the tokio timer. Late ticks are skipped, not
/// bunched up.
pub struct IntervalTicks {
    interval: Interval,
}

impl IntervalTicks {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl TickSource for IntervalTicks {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// The work the scheduler triggers on every tick.
#[async_trait]
pub trait SaveCycle: Send + Sync + 'static {
    /// Whether a previous cycle is still waiting on the backend.
    fn in_flight(&self) -> bool;

    async fn run_scheduled(&self);
}

pub struct SaveScheduler {
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SaveScheduler {
    /// Starts the loop. It ticks only while `live` is true and stops for good
    /// when `parent` is cancelled or `stop` is called.
    pub fn start(
        cycle: Arc<dyn SaveCycle>,
        live: watch::Receiver<bool>,
        ticks: Box<dyn TickSource>,
        parent: &CancellationToken,
    ) -> Self {
        let shutdown = parent.child_token();
        let handle = tokio::spawn(run_loop(cycle, live, ticks, shutdown.clone()));
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels the timer. A cycle already dispatched is left to finish.
    pub fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    cycle: Arc<dyn SaveCycle>,
    mut live: watch::Receiver<bool>,
    mut ticks: Box<dyn TickSource>,
    shutdown: CancellationToken,
) {
    info!("Auto-save scheduler started");
    loop {
        if !*live.borrow_and_update() {
            debug!("Auto-save paused - user not authenticated");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = live.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = live.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticks.tick() => {
                if cycle.in_flight() {
                    debug!("Auto-save tick dropped - previous save still in flight");
                    continue;
                }
                let cycle = cycle.clone();
                tokio::spawn(async move { cycle.run_scheduled().await });
            }
        }
    }
    info!("Auto-save scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    struct ChannelTicks(mpsc::UnboundedReceiver<()>);

    #[async_trait]
    impl TickSource for ChannelTicks {
        async fn tick(&mut self) {
            if self.0.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
    }

    #[derive(Default)]
    struct CountingCycle {
        runs: AtomicUsize,
        busy: AtomicBool,
    }

    #[async_trait]
    impl SaveCycle for CountingCycle {
        fn in_flight(&self) -> bool {
            self.busy.load(Ordering::SeqCst)
        }

        async fn run_scheduled(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ticks_run_cycles_while_live() {
        let cycle = Arc::new(CountingCycle::default());
        let (_live_tx, live_rx) = watch::channel(true);
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let _scheduler = SaveScheduler::start(
            cycle.clone(),
            live_rx,
            Box::new(ChannelTicks(tick_rx)),
            &CancellationToken::new(),
        );

        tick_tx.send(()).unwrap();
        tick_tx.send(()).unwrap();
        settle().await;
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn paused_while_not_live() {
        let cycle = Arc::new(CountingCycle::default());
        let (live_tx, live_rx) = watch::channel(false);
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let _scheduler = SaveScheduler::start(
            cycle.clone(),
            live_rx,
            Box::new(ChannelTicks(tick_rx)),
            &CancellationToken::new(),
        );

        tick_tx.send(()).unwrap();
        settle().await;
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 0);

        live_tx.send(true).unwrap();
        settle().await;
        // The queued tick is consumed once the loop resumes.
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn busy_cycle_drops_ticks() {
        let cycle = Arc::new(CountingCycle::default());
        cycle.busy.store(true, Ordering::SeqCst);
        let (_live_tx, live_rx) = watch::channel(true);
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let _scheduler = SaveScheduler::start(
            cycle.clone(),
            live_rx,
            Box::new(ChannelTicks(tick_rx)),
            &CancellationToken::new(),
        );

        tick_tx.send(()).unwrap();
        tick_tx.send(()).unwrap();
        settle().await;
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stop_cancels_timer() {
        let cycle = Arc::new(CountingCycle::default());
        let (_live_tx, live_rx) = watch::channel(true);
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let mut scheduler = SaveScheduler::start(
            cycle.clone(),
            live_rx,
            Box::new(ChannelTicks(tick_rx)),
            &CancellationToken::new(),
        );
        settle().await;
        assert!(scheduler.is_running());

        scheduler.stop();
        let _ = tick_tx.send(());
        settle().await;
        assert!(!scheduler.is_running());
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn interval_ticks_follow_period() {
        let cycle = Arc::new(CountingCycle::default());
        let (_live_tx, live_rx) = watch::channel(true);
        let _scheduler = SaveScheduler::start(
            cycle.clone(),
            live_rx,
            Box::new(IntervalTicks::new(Duration::from_secs(10))),
            &CancellationToken::new(),
        );
        settle().await;

        tokio::time::advance(Duration::from_secs(9)).await;
        settle().await;
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(cycle.runs.load(Ordering::SeqCst), 1);
    }
}
