// Periodic tasks - Cancellable timers that feed ticks back into the runtime
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const SYNTHETIC_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    AutoRefresh,
    SyntheticFeed,
}

/// One firing of a periodic task. `generation` tells a tick from a cancelled
/// task apart from a tick of the task currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub kind: TaskKind,
    pub generation: u64,
}

/// Aborts the timer task when dropped
struct TaskHandle {
    generation: u64,
    abort: AbortHandle,
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

pub struct PeriodicTasks {
    ticks: mpsc::Sender<Tick>,
    auto_refresh_interval: Duration,
    synthetic_period: Duration,
    next_generation: u64,
    active: bool,
    auto_refresh: Option<TaskHandle>,
    synthetic: Option<TaskHandle>,
}

impl PeriodicTasks {
    pub fn new(ticks: mpsc::Sender<Tick>, auto_refresh_interval: Duration) -> Self {
        Self {
            ticks,
            auto_refresh_interval,
            synthetic_period: SYNTHETIC_PERIOD,
            next_generation: 1,
            active: false,
            auto_refresh: None,
            synthetic: None,
        }
    }

    pub fn with_synthetic_period(mut self, period: Duration) -> Self {
        self.synthetic_period = period;
        self
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        self.auto_refresh_interval
    }

    /// Start both timers, replacing any that are running
    pub fn start(&mut self) {
        self.cancel_all();
        self.active = true;
        self.auto_refresh = self.spawn_auto_refresh();
        self.synthetic = Some(self.spawn(TaskKind::SyntheticFeed, self.synthetic_period));
    }

    /// A zero interval disables auto-refresh. Running timers pick up the
    /// new interval immediately.
    pub fn set_auto_refresh_interval(&mut self, interval: Duration) {
        self.auto_refresh_interval = interval;
        if self.active {
            self.auto_refresh = None;
            self.auto_refresh = self.spawn_auto_refresh();
        }
    }

    pub fn cancel_all(&mut self) {
        if self.active {
            tracing::debug!("Cancelling periodic tasks");
        }
        self.active = false;
        self.auto_refresh = None;
        self.synthetic = None;
    }

    /// Whether the tick came from a timer that is still running
    pub fn is_current(&self, tick: &Tick) -> bool {
        let handle = match tick.kind {
            TaskKind::AutoRefresh => &self.auto_refresh,
            TaskKind::SyntheticFeed => &self.synthetic,
        };
        handle
            .as_ref()
            .is_some_and(|h| h.generation == tick.generation)
    }

    fn spawn_auto_refresh(&mut self) -> Option<TaskHandle> {
        if self.auto_refresh_interval.is_zero() {
            return None;
        }
        Some(self.spawn(TaskKind::AutoRefresh, self.auto_refresh_interval))
    }

    fn spawn(&mut self, kind: TaskKind, period: Duration) -> TaskHandle {
        let generation = self.next_generation;
        self.next_generation += 1;

        let ticks = self.ticks.clone();
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if ticks.send(Tick { kind, generation }).await.is_err() {
                    break;
                }
            }
        });

        tracing::debug!("Started {:?} every {:?} (generation {})", kind, period, generation);
        TaskHandle {
            generation,
            abort: task.abort_handle(),
        }
    }
}
