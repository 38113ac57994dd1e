// PhaseGrid - coordinator for the sequencer array
// Owns the master sequencer, the ordered channels, and the refresh task that
// samples every channel's output into one register for the sink

use crate::messaging::command::{MasterOp, SequencerOp};
use crate::output::Sink;
use crate::sequencer::{Sequencer, SequencerStatus};
use crate::timing::Interval;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

/// Fixed id of the master sequencer.
pub const MASTER_ID: &str = "master";

/// Process-start configuration. Everything else is mutated at runtime.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Channel count; one register bit per channel.
    pub channels: u32,
    /// Seconds between register refreshes.
    pub refresh_rate: f64,
    /// Pattern width for every channel.
    pub pattern_length: u32,
    /// Initial base interval for the master and every channel, in seconds.
    pub base_interval: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            channels: 8,
            refresh_rate: 1.0 / 240.0,
            pattern_length: crate::sequencer::DEFAULT_LENGTH,
            base_interval: 1.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("channel count must be in [1, 64], got {0}")]
    ChannelCount(u32),

    #[error("pattern length must be in [1, 64], got {0}")]
    PatternLength(u32),

    #[error("refresh rate must be a positive number of seconds, got {0}")]
    RefreshRate(f64),

    #[error("base interval must be a positive number of seconds, got {0}")]
    BaseInterval(f64),
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels == 0 || self.channels > 64 {
            return Err(ConfigError::ChannelCount(self.channels));
        }
        if self.pattern_length == 0 || self.pattern_length > crate::sequencer::MAX_LENGTH {
            return Err(ConfigError::PatternLength(self.pattern_length));
        }
        if !self.refresh_rate.is_finite() || self.refresh_rate <= 0.0 {
            return Err(ConfigError::RefreshRate(self.refresh_rate));
        }
        if !self.base_interval.is_finite() || self.base_interval <= 0.0 {
            return Err(ConfigError::BaseInterval(self.base_interval));
        }
        Ok(())
    }
}

/// Point-in-time view of the whole array, in wire form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridStatus {
    pub refresh_rate: f64,
    pub is_running: bool,
    pub master_sequencer_status: SequencerStatus,
    pub sequencer_statuses: Vec<SequencerStatus>,
}

/// The coordinator: master cadence, ordered channels, refresh task, sink.
///
/// Channels are created once here and live for the process's duration;
/// clients mutate them in place through [`set_channel`](Self::set_channel).
/// Without a sink the grid still runs all timing and state logic.
pub struct PhaseGrid {
    refresh_rate: f64,
    /// Handle to self for the callbacks spawned by start(); Weak keeps the
    /// periodic tasks from pinning the grid alive.
    weak_self: Weak<PhaseGrid>,
    master: Sequencer,
    channels: Vec<Sequencer>,
    refresh_task: Mutex<Option<Interval>>,
    sink: Option<Box<dyn Sink>>,
}

impl PhaseGrid {
    pub fn new(
        config: GridConfig,
        sink: Option<Box<dyn Sink>>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;

        if sink.is_none() {
            tracing::warn!("no output sink, running in no-output mode");
        }

        let grid = Arc::new_cyclic(|weak: &Weak<PhaseGrid>| {
            let master = Sequencer::with_id(
                MASTER_ID.to_string(),
                config.pattern_length,
                config.base_interval,
            );

            // The master's ticks drive the trigger fan-out instead of a pattern
            let tick = weak.clone();
            master.set_tick(move || {
                if let Some(grid) = tick.upgrade() {
                    grid.trigger();
                }
            });

            let channels = (0..config.channels)
                .map(|_| Sequencer::new(config.pattern_length, config.base_interval))
                .collect();

            Self {
                refresh_rate: config.refresh_rate,
                weak_self: weak.clone(),
                master,
                channels,
                refresh_task: Mutex::new(None),
                sink,
            }
        });

        Ok(grid)
    }

    pub fn channel_count(&self) -> u32 {
        self.channels.len() as u32
    }

    /// Enable the sink, restart the refresh task, start the master, start
    /// every channel per its own contract (synced channels stay passive).
    pub fn start(&self) {
        if let Some(sink) = &self.sink {
            sink.enable();
        }

        let grid = self.weak_self.clone();
        let mut refresh_task = self.refresh_task.lock().unwrap();
        if let Some(old) = refresh_task.take() {
            old.cancel();
        }
        *refresh_task = Some(Interval::start(
            Duration::from_secs_f64(self.refresh_rate),
            move || {
                if let Some(grid) = grid.upgrade() {
                    grid.refresh();
                }
            },
        ));
        drop(refresh_task);

        self.master.start();
        for channel in &self.channels {
            channel.start();
        }
    }

    /// Disable the sink, cancel the refresh task, stop master and channels.
    /// Sync flags are left as-is; in-flight pulses may trail briefly.
    pub fn stop(&self) {
        if let Some(sink) = &self.sink {
            sink.disable();
        }

        if let Some(task) = self.refresh_task.lock().unwrap().take() {
            task.cancel();
        }

        self.master.stop();
        for channel in &self.channels {
            channel.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.refresh_task
            .lock()
            .unwrap()
            .as_ref()
            .map(Interval::is_alive)
            .unwrap_or(false)
    }

    /// One master tick: advance the master's bookkeeping, then fan out an
    /// update to every synchronized channel that is not already mid-update.
    /// Each update runs on its own detached thread, so a slow channel never
    /// stalls the master cadence or its siblings.
    pub fn trigger(&self) {
        self.master.state().advance();

        for channel in &self.channels {
            let state = channel.state();
            if state.sync_flag() && !state.mid_update() {
                let state = Arc::clone(state);
                thread::spawn(move || state.update());
            }
        }
    }

    /// One refresh tick: sample every channel's output bit into the register
    /// and forward it. Reads only; never blocks on channel state.
    fn refresh(&self) {
        let register = self.sample_register();
        if let Some(sink) = &self.sink {
            sink.update(register);
        }
    }

    /// Bit i of the register is channel i's current output.
    pub fn sample_register(&self) -> u64 {
        let mut register = 0u64;
        for (bit, channel) in self.channels.iter().enumerate() {
            if channel.state().output() {
                register |= 1 << bit;
            }
        }
        register
    }

    /// Apply ops in order to the sequencer with this id (the master resolves
    /// too). An unresolved id is a silent no-op per the protocol contract.
    pub fn set_channel(&self, id: &str, ops: &[SequencerOp]) {
        let target = if self.master.id() == id {
            Some(&self.master)
        } else {
            self.channels.iter().find(|channel| channel.id() == id)
        };

        let Some(target) = target else {
            tracing::debug!(id, "dropping ops for unknown sequencer id");
            return;
        };

        for op in ops {
            Self::apply(target, op);
        }
    }

    fn apply(target: &Sequencer, op: &SequencerOp) {
        match op {
            SequencerOp::LoopPoint { value } => target.set_loop_point(*value),
            SequencerOp::Index { value } => target.set_index(*value),
            SequencerOp::State { value } => target.set_pattern(value),
            SequencerOp::Step { value, index } => target.set_step(*value, *index),
            SequencerOp::StepSize { value } => target.set_step_size(*value),
            SequencerOp::Interval { value } => target.set_interval(*value),
            SequencerOp::Multiplier { value } => target.set_multiplier(*value),
            SequencerOp::Percentage { value } => target.set_percentage(*value),
            SequencerOp::Sync { value } => target.set_sync(*value),
            SequencerOp::Start => target.start(),
            SequencerOp::Stop => {
                target.stop();
                target.state().set_sync_flag(false);
            }
        }
    }

    /// Master ops; a new master interval broadcasts to every channel's base
    /// interval as well.
    pub fn set_master(&self, ops: &[MasterOp]) {
        for op in ops {
            match op {
                MasterOp::Interval { value } => {
                    self.master.set_interval(*value);
                    for channel in &self.channels {
                        channel.set_interval(*value);
                    }
                }
            }
        }
    }

    /// Give every channel a fresh random pattern.
    pub fn randomize_all(&self) {
        for channel in &self.channels {
            channel.randomize();
        }
    }

    pub fn status(&self) -> GridStatus {
        GridStatus {
            refresh_rate: self.refresh_rate,
            is_running: self.is_running(),
            master_sequencer_status: self.master.status(),
            sequencer_statuses: self.channels.iter().map(Sequencer::status).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CaptureSink;

    fn quick_config(channels: u32) -> GridConfig {
        GridConfig {
            channels,
            refresh_rate: 1.0 / 240.0,
            pattern_length: 8,
            base_interval: 0.1,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(GridConfig::default().validate().is_ok());

        let mut config = GridConfig::default();
        config.channels = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ChannelCount(0))));
        config.channels = 65;
        assert!(config.validate().is_err());

        let mut config = GridConfig::default();
        config.pattern_length = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PatternLength(0))
        ));

        let mut config = GridConfig::default();
        config.refresh_rate = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::RefreshRate(_))));

        let mut config = GridConfig::default();
        config.base_interval = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BaseInterval(_))
        ));
    }

    #[test]
    fn test_construction_shape() {
        let grid = PhaseGrid::new(quick_config(4), None).unwrap();

        let status = grid.status();
        assert_eq!(status.master_sequencer_status.id, MASTER_ID);
        assert_eq!(status.sequencer_statuses.len(), 4);
        assert!(!status.is_running);
        for sequencer in &status.sequencer_statuses {
            assert_eq!(sequencer.length, 8);
            assert_eq!(sequencer.loop_point, 8);
            assert!(!sequencer.is_running);
        }
    }

    #[test]
    fn test_set_master_broadcasts_interval() {
        let grid = PhaseGrid::new(quick_config(3), None).unwrap();

        grid.set_master(&[MasterOp::Interval { value: 0.5 }]);

        let status = grid.status();
        assert_eq!(status.master_sequencer_status.interval, 0.5);
        for sequencer in &status.sequencer_statuses {
            assert_eq!(sequencer.interval, 0.5);
        }
    }

    #[test]
    fn test_set_channel_applies_ops_in_order() {
        let grid = PhaseGrid::new(quick_config(2), None).unwrap();
        let id = grid.status().sequencer_statuses[0].id.clone();

        grid.set_channel(
            &id,
            &[
                SequencerOp::State {
                    value: vec![1, 1, 1, 1, 0, 0, 0, 0],
                },
                SequencerOp::LoopPoint { value: 4 },
                SequencerOp::Index { value: 2 },
                SequencerOp::StepSize { value: 2 },
            ],
        );

        let status = &grid.status().sequencer_statuses[0];
        assert_eq!(status.state[..4], [1, 1, 1, 1]);
        assert_eq!(status.loop_point, 4);
        assert_eq!(status.index, 2);
        assert_eq!(status.step_size, 2);
    }

    #[test]
    fn test_set_channel_resolves_master() {
        let grid = PhaseGrid::new(quick_config(2), None).unwrap();

        grid.set_channel(MASTER_ID, &[SequencerOp::StepSize { value: 3 }]);
        assert_eq!(grid.status().master_sequencer_status.step_size, 3);
    }

    #[test]
    fn test_set_channel_unknown_id_is_noop() {
        let grid = PhaseGrid::new(quick_config(2), None).unwrap();
        let before = grid.status();

        grid.set_channel("no-such-id", &[SequencerOp::LoopPoint { value: 2 }]);
        assert_eq!(grid.status(), before);
    }

    #[test]
    fn test_stop_op_clears_sync_flag() {
        let grid = PhaseGrid::new(quick_config(2), None).unwrap();
        let id = grid.status().sequencer_statuses[0].id.clone();

        grid.set_channel(&id, &[SequencerOp::Sync { value: true }]);
        assert!(grid.channels[0].state().sync_flag());

        grid.set_channel(&id, &[SequencerOp::Stop]);
        assert!(!grid.channels[0].state().sync_flag());
    }

    #[test]
    fn test_trigger_advances_only_synced_channels() {
        let grid = PhaseGrid::new(quick_config(3), None).unwrap();
        let synced = grid.status().sequencer_statuses[1].id.clone();

        grid.set_channel(&synced, &[SequencerOp::Sync { value: true }]);
        grid.trigger();

        // The helper thread latches and advances before its pulse sleep
        thread::sleep(Duration::from_millis(30));
        let status = grid.status();
        assert_eq!(status.master_sequencer_status.index, 1);
        assert_eq!(status.sequencer_statuses[0].index, 0);
        assert_eq!(status.sequencer_statuses[1].index, 1);
        assert_eq!(status.sequencer_statuses[2].index, 0);
    }

    #[test]
    fn test_trigger_skips_mid_update_channel() {
        let grid = PhaseGrid::new(quick_config(2), None).unwrap();
        let id = grid.status().sequencer_statuses[0].id.clone();
        grid.set_channel(&id, &[SequencerOp::Sync { value: true }]);

        // Two triggers inside one pulse width advance the channel only once
        grid.trigger();
        thread::sleep(Duration::from_millis(20));
        grid.trigger();
        thread::sleep(Duration::from_millis(20));

        assert_eq!(grid.status().sequencer_statuses[0].index, 1);
        assert_eq!(grid.status().master_sequencer_status.index, 2);
    }

    #[test]
    fn test_register_maps_channel_to_bit() {
        let grid = PhaseGrid::new(quick_config(3), None).unwrap();

        // Pattern all-ones on channels 0 and 2; trigger both via sync
        for bit in [0usize, 2] {
            let id = grid.status().sequencer_statuses[bit].id.clone();
            grid.set_channel(
                &id,
                &[
                    SequencerOp::State {
                        value: vec![1; 8],
                    },
                    SequencerOp::Sync { value: true },
                ],
            );
        }

        grid.trigger();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(grid.sample_register(), 0b101);

        // Pulses deassert after half the 0.1 s effective period
        thread::sleep(Duration::from_millis(60));
        assert_eq!(grid.sample_register(), 0);
    }

    #[test]
    fn test_start_stop_drives_sink() {
        let capture = CaptureSink::new();
        let grid = PhaseGrid::new(
            quick_config(2),
            Some(Box::new(Arc::clone(&capture))),
        )
        .unwrap();

        grid.start();
        assert!(capture.is_enabled());
        assert!(grid.is_running());

        thread::sleep(Duration::from_millis(50));
        assert!(capture.update_count() > 0);

        grid.stop();
        assert!(!capture.is_enabled());
        thread::sleep(Duration::from_millis(50));
        assert!(!grid.is_running());
    }

    #[test]
    fn test_no_sink_grid_still_runs() {
        let grid = PhaseGrid::new(quick_config(2), None).unwrap();

        grid.start();
        assert!(grid.is_running());
        thread::sleep(Duration::from_millis(60));
        assert!(grid.status().sequencer_statuses[0].index > 0);

        grid.stop();
    }

    #[test]
    fn test_randomize_all_touches_only_channels() {
        let grid = PhaseGrid::new(quick_config(4), None).unwrap();

        grid.randomize_all();
        assert_eq!(grid.status().master_sequencer_status.state, vec![0; 8]);
    }
}
