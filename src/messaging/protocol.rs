// Protocol - wire shapes for client requests and engine responses
// The session transport (WebSocket or similar) lives outside this crate and
// moves these as one JSON document per message

use crate::grid::GridStatus;
use crate::messaging::command::{MasterOp, SequencerOp};
use serde::{Deserialize, Serialize};

/// The request types the router recognizes, in wire order.
pub const REQUEST_TYPES: [&str; 6] = [
    "set",
    "fetch_status",
    "start_all",
    "stop_all",
    "handshake",
    "reconnect",
];

/// One target inside a `set` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetSpec {
    Master {
        attributes: Vec<MasterOp>,
    },
    Sequencer {
        id: String,
        attributes: Vec<SequencerOp>,
    },
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Set { targets: Vec<TargetSpec> },
    FetchStatus,
    StartAll,
    StopAll,
    Handshake,
    Reconnect,
}

/// Engine reply, serialized as `{type, data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Response {
    Status(GridStatus),
    Handshake(GridStatus),
    Reconnect(GridStatus),
    Error(String),
}
