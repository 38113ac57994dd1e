// Sequencer module
// Bit patterns, channel state, and the self-driving channel sequencer

pub mod channel;
pub mod pattern;

pub use channel::{SequencerStatus, Sequencer, SharedSequencerState};
pub use pattern::{DEFAULT_LENGTH, MAX_LENGTH, Pattern};
