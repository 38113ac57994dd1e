// Command types - the closed set of runtime mutations clients can request
// Validated at the router boundary; the grid only ever sees these variants

use serde::{Deserialize, Serialize};

/// One `{name, value[, index]}` operation on a channel (or the master).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum SequencerOp {
    LoopPoint { value: u32 },
    Index { value: u32 },
    State { value: Vec<u8> },
    Step { value: u8, index: u32 },
    StepSize { value: u32 },
    Interval { value: f64 },
    Multiplier { value: f64 },
    Percentage { value: f64 },
    Sync { value: bool },
    Start,
    Stop,
}

/// Operations accepted by the master target. A master interval write also
/// broadcasts to every channel's base interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum MasterOp {
    Interval { value: f64 },
}
