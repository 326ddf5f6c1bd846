//! # Iteration Log
//!
//! Append-only record of membership changes. The active member set is
//! every added node not removed afterwards; threshold and epoch come from
//! the last entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership change kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IterationAction {
    /// Node joins.
    Add,
    /// Node leaves.
    Remove,
}

impl IterationAction {
    /// Index byte used in store keys.
    pub fn index(&self) -> u8 {
        match self {
            IterationAction::Add => 11,
            IterationAction::Remove => 12,
        }
    }
}

/// One membership change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    /// Change kind.
    pub action: IterationAction,
    /// Node affected.
    pub node_id: Uuid,
    /// Group threshold after the change.
    pub threshold: u8,
    /// When the change takes effect.
    pub created_at: DateTime<Utc>,
}

/// Current membership derived from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveNodes {
    /// Active members in log order.
    pub members: Vec<Uuid>,
    /// Threshold of the last entry.
    pub threshold: u8,
    /// Time of the last entry.
    pub epoch: DateTime<Utc>,
}

/// Fold an ordered log into the active membership. `None` when empty.
pub fn active_nodes(log: &[Iteration]) -> Option<ActiveNodes> {
    let mut members: Vec<Uuid> = Vec::new();
    for ir in log {
        match ir.action {
            IterationAction::Add => {
                if !members.contains(&ir.node_id) {
                    members.push(ir.node_id);
                }
            }
            IterationAction::Remove => members.retain(|m| *m != ir.node_id),
        }
    }
    let last = log.last()?;
    if members.is_empty() {
        return None;
    }
    Some(ActiveNodes {
        members,
        threshold: last.threshold,
        epoch: last.created_at,
    })
}
