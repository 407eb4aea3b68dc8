use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Local;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::cycle::{run_cycle, CycleError, CycleReport};
use super::CycleState;
use crate::config::{LadderConfig, OverlapPolicy};
use crate::venue::VenueAdapter;

/// Lifecycle of the trading loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerStatus {
    Idle,
    Running,
    Stopped,
}

/// Point-in-time view of the scheduler for operators
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub status: SchedulerStatus,
    pub symbol: String,
    pub loop_counter: u64,
    pub max_loops: i64,
    pub previous_atr: Option<f64>,
    pub cycles_in_flight: usize,
    pub last_cycle: Option<CycleReport>,
}

struct Lifecycle {
    timer: Option<JoinHandle<()>>,
    /// Bumped on every start so cycles from an older run cannot stop a newer one
    epoch: u64,
}

struct Shared<V: ?Sized> {
    venue: Arc<V>,
    config: LadderConfig,
    state: Mutex<CycleState>,
    lifecycle: Mutex<Lifecycle>,
    status: watch::Sender<SchedulerStatus>,
    in_flight: AtomicUsize,
    last_cycle: Mutex<Option<CycleReport>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs the decision cycle on a fixed period
///
/// Cheap to clone; every clone drives the same loop. Each tick spawns its
/// cycle as a separate task, so `stop()` cancels future ticks but lets a
/// cycle already in progress finish.
pub struct Scheduler<V: VenueAdapter + ?Sized + 'static> {
    shared: Arc<Shared<V>>,
}

impl<V: VenueAdapter + ?Sized + 'static> Clone for Scheduler<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: VenueAdapter + ?Sized + 'static> Scheduler<V> {
    pub fn new(venue: Arc<V>, config: LadderConfig) -> Self {
        let (status, _) = watch::channel(SchedulerStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                venue,
                config,
                state: Mutex::new(CycleState::default()),
                lifecycle: Mutex::new(Lifecycle {
                    timer: None,
                    epoch: 0,
                }),
                status,
                in_flight: AtomicUsize::new(0),
                last_cycle: Mutex::new(None),
            }),
        }
    }

    /// Begin trading: one cycle now, then one per interval
    ///
    /// Must be called from within a tokio runtime. No-op while running.
    pub fn start(&self) {
        let shared = &self.shared;
        let mut lifecycle = lock(&shared.lifecycle);

        if *shared.status.borrow() == SchedulerStatus::Running {
            tracing::warn!("Trading loop is already running.");
            return;
        }

        lifecycle.epoch += 1;
        let epoch = lifecycle.epoch;
        {
            let mut state = lock(&shared.state);
            state.loop_counter = 0;
            state.running = true;
        }
        shared.status.send_replace(SchedulerStatus::Running);

        let period = shared.config.timing.cycle_interval();
        tracing::info!(
            "🚀 Starting automated trading loop for {} (every {:?}, max loops: {})",
            shared.config.symbol,
            period,
            if shared.config.is_bounded() {
                shared.config.max_loops.to_string()
            } else {
                "unbounded".to_string()
            }
        );

        Shared::launch(shared, epoch, true);

        let ticker_shared = Arc::clone(shared);
        lifecycle.timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                Shared::launch(&ticker_shared, epoch, false);
            }
        }));
    }

    /// Cancel future ticks; a cycle already running is allowed to finish
    pub fn stop(&self) {
        let mut lifecycle = lock(&self.shared.lifecycle);
        if *self.shared.status.borrow() != SchedulerStatus::Running {
            tracing::info!("Trading loop is not running.");
            return;
        }
        self.shared.halt(&mut lifecycle);
    }

    /// Run a single cycle outside the timer
    ///
    /// Counts toward `loop_counter` but never stops the loop.
    pub async fn run_cycle_once(&self) -> Result<CycleReport, CycleError> {
        let loop_counter = self.shared.next_loop();
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.shared.execute(loop_counter).await;
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Resolves once the loop reaches `Stopped`; never resolves if it is not started
    pub async fn wait_until_stopped(&self) {
        let mut status = self.shared.status.subscribe();
        let _ = status.wait_for(|s| *s == SchedulerStatus::Stopped).await;
    }

    pub fn status(&self) -> SchedulerStatus {
        *self.shared.status.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.status() == SchedulerStatus::Running
    }

    pub fn loop_counter(&self) -> u64 {
        lock(&self.shared.state).loop_counter
    }

    pub fn previous_atr(&self) -> Option<f64> {
        lock(&self.shared.state).previous_atr
    }

    pub fn cycles_in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        lock(&self.shared.last_cycle).clone()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = lock(&self.shared.state).clone();
        SchedulerSnapshot {
            status: self.status(),
            symbol: self.shared.config.symbol.clone(),
            loop_counter: state.loop_counter,
            max_loops: self.shared.config.max_loops,
            previous_atr: state.previous_atr,
            cycles_in_flight: self.cycles_in_flight(),
            last_cycle: self.last_cycle(),
        }
    }
}

impl<V: VenueAdapter + ?Sized + 'static> Shared<V> {
    fn next_loop(&self) -> u64 {
        let mut state = lock(&self.state);
        state.loop_counter += 1;
        state.loop_counter
    }

    /// Start one cycle for the run identified by `epoch`
    ///
    /// The opening cycle of a run always starts, even under `SkipIfBusy` with a
    /// cycle from an earlier run or `run_cycle_once` still in flight.
    fn launch(self: &Arc<Self>, epoch: u64, opening: bool) {
        match self.config.timing.overlap_policy {
            OverlapPolicy::Allow => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
            }
            OverlapPolicy::SkipIfBusy if opening => {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
            }
            OverlapPolicy::SkipIfBusy => {
                if self
                    .in_flight
                    .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    tracing::warn!("⏭️  Previous cycle still running, skipping this tick");
                    return;
                }
            }
        }

        let loop_counter = self.next_loop();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            // Inner task so a panic in the pipeline is contained and logged
            let pipeline = {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.execute(loop_counter).await })
            };

            match pipeline.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::error!("❌ A critical error occurred in the trading cycle: {}", e)
                }
                Err(e) => tracing::error!("❌ Trading cycle aborted: {}", e),
            }

            shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            shared.finish(epoch);
        });
    }

    async fn execute(&self, loop_counter: u64) -> Result<CycleReport, CycleError> {
        let progress = if self.config.is_bounded() {
            format!("{}/{}", loop_counter, self.config.max_loops)
        } else {
            loop_counter.to_string()
        };
        tracing::info!(
            "\n--- Running Trading Cycle [{}] at {} ---",
            progress,
            Local::now().format("%H:%M:%S")
        );

        let result = run_cycle(self.venue.as_ref(), &self.config, &self.state, loop_counter).await;
        if let Ok(report) = &result {
            *lock(&self.last_cycle) = Some(report.clone());
        }
        tracing::info!("--- Trading Cycle Complete ---");
        result
    }

    /// After a timer cycle: stop the run once the loop budget is spent
    fn finish(&self, epoch: u64) {
        if !self.config.is_bounded() {
            return;
        }

        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.epoch != epoch || *self.status.borrow() != SchedulerStatus::Running {
            return;
        }

        let loop_counter = lock(&self.state).loop_counter;
        if loop_counter >= self.config.max_loops as u64 {
            tracing::info!("🏁 Max loops ({}) reached. Stopping.", self.config.max_loops);
            self.halt(&mut lifecycle);
        }
    }

    fn halt(&self, lifecycle: &mut Lifecycle) {
        if let Some(timer) = lifecycle.timer.take() {
            timer.abort();
        }
        lock(&self.state).running = false;
        self.status.send_replace(SchedulerStatus::Stopped);
        tracing::info!("🛑 Automated trading loop stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;
    use crate::errors::VenueError;
    use crate::models::{IndicatorReading, Order, Position, Side};
    use crate::venue::{
        Control, ControlId, ControlScope, DialogId, EntryField, FieldId, PaperFaults, PaperVenue,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Paper venue whose first order listing panics
    struct PanicsOnce {
        inner: PaperVenue,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl VenueAdapter for PanicsOnce {
        async fn read_current_price(&self) -> Result<f64, VenueError> {
            self.inner.read_current_price().await
        }
        async fn read_indicators(&self) -> Result<IndicatorReading, VenueError> {
            self.inner.read_indicators().await
        }
        async fn read_open_orders(&self) -> Result<Vec<Order>, VenueError> {
            if !self.tripped.swap(true, Ordering::SeqCst) {
                panic!("order table vanished");
            }
            self.inner.read_open_orders().await
        }
        async fn read_open_positions(&self) -> Result<Vec<Position>, VenueError> {
            self.inner.read_open_positions().await
        }
        async fn cancel_order(&self, order: &Order) -> Result<(), VenueError> {
            self.inner.cancel_order(order).await
        }
        async fn request_close(&self, position: &Position) -> Result<(), VenueError> {
            self.inner.request_close(position).await
        }
        async fn confirmation_dialog(&self) -> Result<Option<DialogId>, VenueError> {
            self.inner.confirmation_dialog().await
        }
        async fn controls(&self, scope: ControlScope) -> Result<Vec<Control>, VenueError> {
            self.inner.controls(scope).await
        }
        async fn activate(&self, control: ControlId) -> Result<(), VenueError> {
            self.inner.activate(control).await
        }
        async fn entry_field(&self, field: EntryField) -> Result<Option<FieldId>, VenueError> {
            self.inner.entry_field(field).await
        }
        async fn write_field(&self, field: FieldId, value: &str) -> Result<(), VenueError> {
            self.inner.write_field(field, value).await
        }
    }

    /// Every cycle waits 5s for a close dialog that never opens, then settles 40s
    fn slow_venue() -> Arc<PaperVenue> {
        let venue = Arc::new(PaperVenue::fixed(50_000.0));
        venue.seed_position(Side::Short);
        venue.set_faults(PaperFaults {
            dialog_never_appears: true,
            ..Default::default()
        });
        venue
    }

    fn config(max_loops: i64) -> LadderConfig {
        LadderConfig {
            max_loops,
            timing: TimingConfig::immediate(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_max_loops() {
        let venue = Arc::new(PaperVenue::fixed(50_000.0));
        let scheduler = Scheduler::new(Arc::clone(&venue), config(3));

        scheduler.start();
        scheduler.wait_until_stopped().await;

        assert_eq!(scheduler.status(), SchedulerStatus::Stopped);
        assert_eq!(scheduler.loop_counter(), 3);
        // Cold start once, then the ladder is already full
        assert_eq!(venue.placements().len(), 6);
        assert_eq!(venue.order_count(Side::Long), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_idle_is_noop() {
        let scheduler = Scheduler::new(Arc::new(PaperVenue::fixed(50_000.0)), config(0));
        scheduler.stop();
        assert_eq!(scheduler.status(), SchedulerStatus::Idle);
        assert_eq!(scheduler.loop_counter(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_ignored() {
        let scheduler = Scheduler::new(Arc::new(PaperVenue::fixed(50_000.0)), config(0));
        scheduler.start();
        scheduler.start();
        assert_eq!(scheduler.loop_counter(), 1);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cycle_once_does_not_need_start() {
        let venue = Arc::new(PaperVenue::fixed(50_000.0));
        let scheduler = Scheduler::new(Arc::clone(&venue), config(1));

        let report = scheduler.run_cycle_once().await.unwrap();

        assert_eq!(report.loop_counter, 1);
        assert_eq!(scheduler.status(), SchedulerStatus::Idle);
        assert_eq!(scheduler.last_cycle(), Some(report));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_serializes() {
        let scheduler = Scheduler::new(Arc::new(PaperVenue::fixed(50_000.0)), config(5));
        scheduler.run_cycle_once().await.unwrap();

        let json = serde_json::to_value(scheduler.snapshot()).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["loop_counter"], 1);
        assert_eq!(json["max_loops"], 5);
        assert_eq!(json["last_cycle"]["reconcile"]["attempted"], 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_run_cannot_stop_new_run() {
        // Cycles outlive the 30s period
        let venue = slow_venue();
        let mut cfg = config(2);
        cfg.timing.post_close_settle_ms = 40_000;
        let scheduler = Scheduler::new(Arc::clone(&venue), cfg);

        scheduler.start(); // old run, cycle ends near t=45
        sleep(Duration::from_secs(1)).await;
        scheduler.stop();
        scheduler.start(); // new run: cycles at t=1 and t=31
        assert_eq!(scheduler.loop_counter(), 1);

        // t=45.6: the old cycle is done and the counter is at 2, yet the new run goes on
        sleep(Duration::from_millis(44_600)).await;
        assert_eq!(scheduler.loop_counter(), 2);
        assert!(scheduler.is_running());

        // t=47.6: the new run's first cycle has finished and ends the run
        sleep(Duration::from_secs(2)).await;
        assert_eq!(scheduler.status(), SchedulerStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_if_busy_drops_overlapping_ticks() {
        let venue = slow_venue();
        let mut cfg = config(0);
        cfg.timing.post_close_settle_ms = 40_000;
        cfg.timing.overlap_policy = OverlapPolicy::SkipIfBusy;
        let scheduler = Scheduler::new(Arc::clone(&venue), cfg);

        scheduler.start();
        sleep(Duration::from_secs(31)).await;
        assert_eq!(scheduler.loop_counter(), 1);
        assert_eq!(scheduler.cycles_in_flight(), 1);

        // First cycle ends near t=45; the t=60 tick runs
        sleep(Duration::from_secs(30)).await;
        assert_eq!(scheduler.loop_counter(), 2);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_policy_overlaps_cycles() {
        let venue = slow_venue();
        let mut cfg = config(0);
        cfg.timing.post_close_settle_ms = 40_000;
        let scheduler = Scheduler::new(Arc::clone(&venue), cfg);

        scheduler.start();
        sleep(Duration::from_secs(31)).await;
        assert_eq!(scheduler.loop_counter(), 2);
        assert_eq!(scheduler.cycles_in_flight(), 2);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_cycle_finish() {
        let venue = Arc::new(PaperVenue::fixed(50_000.0));
        let mut cfg = config(0);
        cfg.timing.placement_delay_ms = 20_000;
        let scheduler = Scheduler::new(Arc::clone(&venue), cfg);

        // Cold start places one order every 20s
        scheduler.start();
        sleep(Duration::from_secs(1)).await;
        scheduler.stop();
        assert_eq!(scheduler.status(), SchedulerStatus::Stopped);
        assert_eq!(venue.placements().len(), 1);
        assert_eq!(scheduler.cycles_in_flight(), 1);

        sleep(Duration::from_secs(200)).await;
        assert_eq!(venue.placements().len(), 6);
        assert_eq!(scheduler.cycles_in_flight(), 0);
        assert_eq!(scheduler.loop_counter(), 1);
        let report = scheduler.last_cycle().unwrap();
        assert_eq!(report.reconcile.unwrap().succeeded, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_cycle_does_not_stop_schedule() {
        let venue = Arc::new(PanicsOnce {
            inner: PaperVenue::fixed(50_000.0),
            tripped: AtomicBool::new(false),
        });
        let scheduler = Scheduler::new(Arc::clone(&venue), config(0));

        scheduler.start();
        sleep(Duration::from_secs(1)).await;
        assert!(scheduler.is_running());
        assert_eq!(scheduler.cycles_in_flight(), 0);
        assert!(scheduler.last_cycle().is_none());

        // The t=30 tick runs a full cycle
        sleep(Duration::from_secs(30)).await;
        assert_eq!(scheduler.loop_counter(), 2);
        assert_eq!(scheduler.last_cycle().map(|r| r.loop_counter), Some(2));
        assert_eq!(venue.inner.placements().len(), 6);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_if_busy_restart_still_runs_opening_cycle() {
        let venue = slow_venue();
        let mut cfg = config(0);
        cfg.timing.post_close_settle_ms = 40_000;
        cfg.timing.overlap_policy = OverlapPolicy::SkipIfBusy;
        let scheduler = Scheduler::new(Arc::clone(&venue), cfg);

        scheduler.start();
        sleep(Duration::from_secs(1)).await;
        scheduler.stop();

        // Old cycle still in flight; the new run starts its own anyway
        scheduler.start();
        assert_eq!(scheduler.loop_counter(), 1);
        assert_eq!(scheduler.cycles_in_flight(), 2);

        // The t=31 tick finds both busy and is skipped
        sleep(Duration::from_secs(31)).await;
        assert_eq!(scheduler.loop_counter(), 1);
        scheduler.stop();
    }
}
