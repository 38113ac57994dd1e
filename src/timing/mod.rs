// Timing primitives for the sequencer array

pub mod interval;

pub use interval::{Interval, MAX_PERIOD, MIN_PERIOD, clamp_period};
