// Message router - raw client JSON in, typed commands out
// The one place stringly input is validated; past here the grid only sees
// the closed command types

use crate::grid::PhaseGrid;
use crate::messaging::protocol::{REQUEST_TYPES, Request, Response, TargetSpec};
use serde_json::Value;
use std::sync::Arc;

/// Decodes client messages and applies them to the grid. Requests that only
/// mutate (`set`, `start_all`, `stop_all`) produce no response.
pub struct MessageRouter {
    grid: Arc<PhaseGrid>,
}

impl MessageRouter {
    pub fn new(grid: Arc<PhaseGrid>) -> Self {
        Self { grid }
    }

    pub fn handle(&self, raw: &str) -> Option<Response> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                let message = format!("while parsing message: {err}");
                tracing::error!(%message);
                return Some(Response::Error(message));
            }
        };

        // A type outside the closed set is a protocol error, not a parse error
        match value.get("type").and_then(Value::as_str) {
            Some(kind) if REQUEST_TYPES.contains(&kind) => {}
            _ => return Some(Response::Error("Unknown type.".to_string())),
        }

        let request: Request = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => {
                let message = format!("while parsing message: {err}");
                tracing::error!(%message);
                return Some(Response::Error(message));
            }
        };

        self.dispatch(request)
    }

    fn dispatch(&self, request: Request) -> Option<Response> {
        match request {
            Request::Set { targets } => {
                for target in targets {
                    match target {
                        TargetSpec::Master { attributes } => self.grid.set_master(&attributes),
                        TargetSpec::Sequencer { id, attributes } => {
                            self.grid.set_channel(&id, &attributes)
                        }
                    }
                }
                None
            }
            Request::FetchStatus => Some(Response::Status(self.grid.status())),
            Request::StartAll => {
                self.grid.start();
                None
            }
            Request::StopAll => {
                self.grid.stop();
                None
            }
            Request::Handshake => Some(Response::Handshake(self.grid.status())),
            Request::Reconnect => Some(Response::Reconnect(self.grid.status())),
        }
    }
}
