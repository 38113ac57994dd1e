// phasegrid - an array of independently clocked binary step sequencers
// whose composed output latches a hardware bit register

pub mod grid;
pub mod messaging;
pub mod output;
pub mod sequencer;
pub mod timing;

// Re-export commonly used types for convenience
pub use grid::{GridConfig, GridStatus, MASTER_ID, PhaseGrid};
pub use messaging::{MasterOp, MessageRouter, Request, Response, SequencerOp};
pub use output::{CaptureSink, ConsoleSink, Sink};
pub use sequencer::{Pattern, Sequencer, SequencerStatus};
pub use timing::Interval;
