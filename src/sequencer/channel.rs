// Channel sequencer - one independently clocked binary step pattern
// Hot fields live behind atomics so the task thread, trigger helper threads,
// and externally invoked setters can all touch them without locking

use crate::sequencer::pattern::Pattern;
use crate::timing::{self, Interval};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use uuid::Uuid;

/// Lowest percentage modifier a channel accepts
pub const MIN_PERCENTAGE: f64 = 0.5;

/// Highest percentage modifier a channel accepts
pub const MAX_PERCENTAGE: f64 = 2.0;

/// Point-in-time view of one channel, in wire form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerStatus {
    pub state: Vec<u8>,
    pub length: u32,
    pub index: u32,
    pub value: u8,
    pub loop_point: u32,
    pub step_size: u32,
    pub interval: f64,
    pub multiplier: f64,
    pub percentage: f64,
    pub id: String,
    pub is_running: bool,
}

/// Hot-mutable state shared between a channel's task thread and its setters.
///
/// Each field is written by at most the channel's own update path plus
/// externally invoked setters; plain atomics cover that pattern. The
/// `mid_update` guard keeps updates on one channel from ever overlapping.
pub struct SharedSequencerState {
    id: String,
    length: u32,
    bits: AtomicU64,
    loop_point: AtomicU32,
    index: AtomicU32,
    step_size: AtomicU32,
    output: AtomicBool,
    /// f64 bit patterns; seconds
    base_interval: AtomicU64,
    multiplier: AtomicU64,
    percentage: AtomicU64,
    sync_flag: AtomicBool,
    mid_update: AtomicBool,
}

impl SharedSequencerState {
    pub fn new(id: String, length: u32, base_interval: f64) -> Self {
        let length = length.clamp(1, crate::sequencer::pattern::MAX_LENGTH);
        let base_interval = if base_interval.is_finite() && base_interval > 0.0 {
            base_interval
        } else {
            1.0
        };

        Self {
            id,
            length,
            bits: AtomicU64::new(0),
            loop_point: AtomicU32::new(length),
            index: AtomicU32::new(0),
            step_size: AtomicU32::new(1),
            output: AtomicBool::new(false),
            base_interval: AtomicU64::new(base_interval.to_bits()),
            multiplier: AtomicU64::new(1.0f64.to_bits()),
            percentage: AtomicU64::new(1.0f64.to_bits()),
            sync_flag: AtomicBool::new(false),
            mid_update: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    //----------------------------------------------------------------
    // Pattern

    pub fn pattern(&self) -> Pattern {
        Pattern::from_bits(self.bits.load(Ordering::Relaxed), self.length)
    }

    /// Full pattern replace from the wire bit list.
    pub fn set_pattern(&self, steps: &[u8]) {
        let mut pattern = Pattern::new(self.length);
        pattern.replace(steps);
        self.bits.store(pattern.bits(), Ordering::Relaxed);
    }

    /// Single-step replace; the step is taken modulo the pattern length.
    pub fn set_step(&self, value: u8, step: u32) {
        let bit = 1u64 << (step % self.length);
        if value & 1 == 1 {
            self.bits.fetch_or(bit, Ordering::Relaxed);
        } else {
            self.bits.fetch_and(!bit, Ordering::Relaxed);
        }
    }

    /// Bit value at a step, read modulo the loop point.
    pub fn step(&self, step: u32) -> u8 {
        let step = step % self.loop_point();
        ((self.bits.load(Ordering::Relaxed) >> step) & 1) as u8
    }

    pub fn randomize(&self) {
        let mut pattern = self.pattern();
        pattern.randomize();
        self.bits.store(pattern.bits(), Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.bits.store(0, Ordering::Relaxed);
    }

    //----------------------------------------------------------------
    // Cursor

    pub fn index(&self) -> u32 {
        self.index.load(Ordering::Relaxed)
    }

    /// Clamped to [0, length-1]; reads are taken modulo the loop point.
    pub fn set_index(&self, index: u32) {
        self.index
            .store(index.min(self.length - 1), Ordering::Relaxed);
    }

    /// Stored clamped value; never 0, so modulo cursor math is always safe.
    pub fn loop_point(&self) -> u32 {
        self.loop_point.load(Ordering::Relaxed).max(1)
    }

    pub fn set_loop_point(&self, loop_point: u32) {
        self.loop_point
            .store(loop_point.clamp(1, self.length), Ordering::Relaxed);
    }

    pub fn step_size(&self) -> u32 {
        self.step_size.load(Ordering::Relaxed)
    }

    /// A step size of 0 freezes the cursor; that is valid.
    pub fn set_step_size(&self, step_size: u32) {
        self.step_size.store(step_size, Ordering::Relaxed);
    }

    /// Bit under the cursor right now.
    pub fn value(&self) -> u8 {
        let index = self.index() % self.loop_point();
        ((self.bits.load(Ordering::Relaxed) >> index) & 1) as u8
    }

    /// Advance the cursor one step. Wraps at the loop point; u64 math so a
    /// large step size cannot overflow.
    pub fn advance(&self) {
        let loop_point = u64::from(self.loop_point());
        let next = (u64::from(self.index()) + u64::from(self.step_size())) % loop_point;
        self.index.store(next as u32, Ordering::Relaxed);
    }

    //----------------------------------------------------------------
    // Timing modifiers

    pub fn base_interval(&self) -> f64 {
        f64::from_bits(self.base_interval.load(Ordering::Relaxed))
    }

    pub fn set_base_interval(&self, seconds: f64) {
        if !seconds.is_finite() || seconds <= 0.0 {
            tracing::warn!(id = %self.id, seconds, "ignoring non-positive interval");
            return;
        }
        self.base_interval
            .store(seconds.to_bits(), Ordering::Relaxed);
    }

    pub fn multiplier(&self) -> f64 {
        f64::from_bits(self.multiplier.load(Ordering::Relaxed))
    }

    pub fn set_multiplier(&self, multiplier: f64) {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            tracing::warn!(id = %self.id, multiplier, "ignoring non-positive multiplier");
            return;
        }
        self.multiplier.store(multiplier.to_bits(), Ordering::Relaxed);
    }

    pub fn percentage(&self) -> f64 {
        f64::from_bits(self.percentage.load(Ordering::Relaxed))
    }

    /// Clamped to [0.5, 2.0].
    pub fn set_percentage(&self, percentage: f64) {
        if !percentage.is_finite() {
            tracing::warn!(id = %self.id, percentage, "ignoring non-finite percentage");
            return;
        }
        self.percentage
            .store(percentage.clamp(MIN_PERCENTAGE, MAX_PERCENTAGE).to_bits(), Ordering::Relaxed);
    }

    /// base_interval / multiplier * percentage, clamped to the retune range.
    pub fn effective_period(&self) -> Duration {
        let seconds = self.base_interval() / self.multiplier() * self.percentage();
        let seconds = seconds.clamp(
            timing::MIN_PERIOD.as_secs_f64(),
            timing::MAX_PERIOD.as_secs_f64(),
        );
        Duration::from_secs_f64(seconds)
    }

    //----------------------------------------------------------------
    // Sync and output

    pub fn sync_flag(&self) -> bool {
        self.sync_flag.load(Ordering::Relaxed)
    }

    pub fn set_sync_flag(&self, synced: bool) {
        tracing::debug!(id = %self.id, synced, "sync flag");
        self.sync_flag.store(synced, Ordering::Relaxed);
    }

    pub fn output(&self) -> bool {
        self.output.load(Ordering::Relaxed)
    }

    pub fn force_output_low(&self) {
        self.output.store(false, Ordering::Relaxed);
    }

    /// True while an update pulse is in flight on any thread.
    pub fn mid_update(&self) -> bool {
        self.mid_update.load(Ordering::Acquire)
    }

    /// One full update pulse: latch the current bit, advance the cursor,
    /// hold the bit for half the effective period, deassert.
    ///
    /// The pulse sleep defines the asserted-bit duty cycle and runs on the
    /// calling thread, which must be the channel's own task thread or a
    /// dedicated trigger helper. Returns without effect if another update is
    /// already in flight, so updates on one channel never overlap.
    pub fn update(&self) {
        if self.mid_update.swap(true, Ordering::Acquire) {
            return;
        }

        self.output.store(self.value() != 0, Ordering::Relaxed);
        self.advance();

        thread::sleep(self.effective_period() / 2);

        self.output.store(false, Ordering::Relaxed);
        self.mid_update.store(false, Ordering::Release);
    }
}

type TickFn = dyn Fn() + Send + Sync + 'static;

/// One channel: shared hot state plus its periodic task handle.
///
/// Self-drives via an [`Interval`] unless the sync flag marks it externally
/// triggered. Created once at grid construction; mutation is always in place.
pub struct Sequencer {
    state: Arc<SharedSequencerState>,
    tick: Mutex<Arc<TickFn>>,
    task: Mutex<Option<Interval>>,
}

impl Sequencer {
    pub fn new(length: u32, base_interval: f64) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), length, base_interval)
    }

    pub fn with_id(id: String, length: u32, base_interval: f64) -> Self {
        let state = Arc::new(SharedSequencerState::new(id, length, base_interval));
        let tick_state = Arc::clone(&state);

        Self {
            state,
            tick: Mutex::new(Arc::new(move || tick_state.update())),
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        self.state.id()
    }

    pub fn state(&self) -> &Arc<SharedSequencerState> {
        &self.state
    }

    /// Replace the per-tick callback used by `start()`. The grid points the
    /// master's ticks at its trigger routine through this.
    pub fn set_tick(&self, tick: impl Fn() + Send + Sync + 'static) {
        *self.tick.lock().unwrap() = Arc::new(tick);
    }

    /// Start self-driven ticking at the effective period. No-op while the
    /// sync flag is set. An already-running task is cancelled and replaced.
    pub fn start(&self) {
        if self.state.sync_flag() {
            return;
        }

        let tick = Arc::clone(&*self.tick.lock().unwrap());
        let mut task = self.task.lock().unwrap();
        if let Some(old) = task.take() {
            old.cancel();
        }
        *task = Some(Interval::start(self.state.effective_period(), move || {
            tick()
        }));
    }

    /// Cancel the task and force the output low. An in-flight pulse may trail
    /// by up to half the effective period.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.cancel();
        }
        self.state.force_output_low();
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap()
            .as_ref()
            .map(Interval::is_alive)
            .unwrap_or(false)
    }

    /// true: stop self-driven ticking, then mark externally triggered.
    /// false: clear the mark, then resume self-driven ticking.
    pub fn set_sync(&self, synced: bool) {
        if synced {
            self.stop();
            self.state.set_sync_flag(true);
        } else {
            self.state.set_sync_flag(false);
            self.start();
        }
    }

    //----------------------------------------------------------------
    // Live setters; timing writes push the new period into a running task
    // without restarting it

    pub fn set_interval(&self, seconds: f64) {
        self.state.set_base_interval(seconds);
        self.push_period();
    }

    pub fn set_multiplier(&self, multiplier: f64) {
        self.state.set_multiplier(multiplier);
        self.push_period();
    }

    pub fn set_percentage(&self, percentage: f64) {
        self.state.set_percentage(percentage);
        self.push_period();
    }

    fn push_period(&self) {
        if let Some(task) = self.task.lock().unwrap().as_ref() {
            task.set_period(self.state.effective_period());
        }
    }

    pub fn set_loop_point(&self, loop_point: u32) {
        self.state.set_loop_point(loop_point);
    }

    pub fn set_index(&self, index: u32) {
        self.state.set_index(index);
    }

    pub fn set_step_size(&self, step_size: u32) {
        self.state.set_step_size(step_size);
    }

    pub fn set_pattern(&self, steps: &[u8]) {
        self.state.set_pattern(steps);
    }

    pub fn set_step(&self, value: u8, step: u32) {
        self.state.set_step(value, step);
    }

    pub fn randomize(&self) {
        self.state.randomize();
    }

    pub fn clear(&self) {
        self.state.clear();
    }

    pub fn status(&self) -> SequencerStatus {
        let state = &self.state;
        SequencerStatus {
            state: state.pattern().to_steps(),
            length: state.length(),
            index: state.index(),
            value: state.value(),
            loop_point: state.loop_point(),
            step_size: state.step_size(),
            interval: state.base_interval(),
            multiplier: state.multiplier(),
            percentage: state.percentage(),
            id: state.id().to_string(),
            is_running: self.is_running(),
        }
    }
}
