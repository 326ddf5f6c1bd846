//! Per-output dispatch markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Action lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionState {
    /// Waiting for worker dispatch.
    Initial,
    /// Dispatched, never retried.
    Done,
}

/// Marker created when an output is first drained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Unique id of the output.
    pub output_id: Uuid,
    /// Output creation time, orders the queue.
    pub created_at: DateTime<Utc>,
    /// Lifecycle state.
    pub state: ActionState,
}
