// Interval - Repeating-execution primitive with a live-retunable period
// Runs its callback on a detached background thread until cancelled

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

/// Shortest period a retune will honor
pub const MIN_PERIOD: Duration = Duration::from_millis(50);

/// Longest period a retune will honor
pub const MAX_PERIOD: Duration = Duration::from_secs(2);

/// Clamp a requested period into the supported retune range
pub fn clamp_period(period: Duration) -> Duration {
    period.clamp(MIN_PERIOD, MAX_PERIOD)
}

type Callback = Box<dyn FnMut() + Send + 'static>;

/// State shared between the handle and the runner thread
struct Shared {
    period_nanos: AtomicU64,
    alive: AtomicBool,
    /// The callback lives in a slot so a swap never waits on an in-flight run
    callback: Mutex<Option<Callback>>,
    cancelled: Mutex<bool>,
    waker: Condvar,
}

impl Shared {
    fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap()
    }

    /// Sleep one period, waking early on cancellation. Returns true if cancelled.
    fn wait_one_period(&self) -> bool {
        let period = Duration::from_nanos(self.period_nanos.load(Ordering::Relaxed));
        let guard = self.cancelled.lock().unwrap();
        let (guard, _timeout) = self
            .waker
            .wait_timeout_while(guard, period, |cancelled| !*cancelled)
            .unwrap();
        *guard
    }
}

/// Handle to a repeating background task.
///
/// The callback runs once immediately on start, then again after every period
/// until `cancel()`. Cancellation stops future runs but never interrupts an
/// in-flight run. Dropping the handle does not stop the thread; stopping is
/// always explicit.
pub struct Interval {
    shared: Arc<Shared>,
}

impl Interval {
    /// Spawn the runner thread and fire the first tick immediately.
    ///
    /// The initial period is taken verbatim (the refresh timer legitimately
    /// runs well below `MIN_PERIOD`); only retunes via `set_period` clamp.
    pub fn start(period: Duration, callback: impl FnMut() + Send + 'static) -> Self {
        let shared = Arc::new(Shared {
            period_nanos: AtomicU64::new(period.as_nanos() as u64),
            alive: AtomicBool::new(true),
            callback: Mutex::new(Some(Box::new(callback))),
            cancelled: Mutex::new(false),
            waker: Condvar::new(),
        });

        let runner = Arc::clone(&shared);
        thread::spawn(move || run(runner));

        Self { shared }
    }

    /// Current period.
    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.shared.period_nanos.load(Ordering::Relaxed))
    }

    /// Retune the period. Clamped to [`MIN_PERIOD`, `MAX_PERIOD`]; takes
    /// effect from the next wait cycle, with no restart of the task.
    pub fn set_period(&self, period: Duration) {
        self.shared
            .period_nanos
            .store(clamp_period(period).as_nanos() as u64, Ordering::Relaxed);
    }

    /// Replace the callback. Affects only the next invocation.
    pub fn set_callback(&self, callback: impl FnMut() + Send + 'static) {
        *self.shared.callback.lock().unwrap() = Some(Box::new(callback));
    }

    /// Stop future runs. Never interrupts an in-flight run; harmless to call
    /// more than once.
    pub fn cancel(&self) {
        let mut cancelled = self.shared.cancelled.lock().unwrap();
        *cancelled = true;
        self.shared.waker.notify_all();
    }

    /// True while the runner thread is still ticking (or mid-run).
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Relaxed)
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        if shared.is_cancelled() {
            break;
        }

        // Take the callback out of its slot for the duration of the run so a
        // concurrent set_callback never blocks on it.
        let taken = shared.callback.lock().unwrap().take();
        let Some(mut callback) = taken else { break };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback()));

        {
            let mut slot = shared.callback.lock().unwrap();
            if slot.is_none() {
                *slot = Some(callback);
            }
        }

        if outcome.is_err() {
            // A panicking callback kills this task only; siblings keep ticking.
            tracing::error!("interval callback panicked, stopping this task");
            break;
        }

        if shared.wait_one_period() {
            break;
        }
    }

    shared.alive.store(false, Ordering::Relaxed);
}
