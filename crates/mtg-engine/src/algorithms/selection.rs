//! # Output Selection
//!
//! Pure input selection shared by every member. Given the same candidate
//! list every member picks the same prefix, which keeps independently
//! built transactions byte-identical.

use uuid::Uuid;

use crate::domain::{unique_id, Amount, Output, COMPACTION_TRANSACTION_MEMO};

/// Result of [`select_outputs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Number of leading candidates consumed.
    pub consumed: usize,
    /// Sum of the consumed amounts.
    pub total: Amount,
}

impl Selection {
    /// Whether the consumed outputs cover `target`.
    pub fn covers(&self, target: Amount) -> bool {
        self.total >= target
    }

    /// Amount returned to the group, zero when exact.
    pub fn change(&self, target: Amount) -> Amount {
        self.total.checked_sub(target).unwrap_or(Amount::ZERO)
    }
}

/// Consume candidates in order until the total covers `target` and at
/// least `group_size` outputs are taken.
pub fn select_outputs(candidates: &[Output], target: Amount, group_size: usize) -> Selection {
    let mut total = Amount::ZERO;
    let mut consumed = 0;
    for out in candidates {
        total = total.saturating_add(out.amount);
        consumed += 1;
        if total >= target && consumed >= group_size {
            break;
        }
    }
    Selection { consumed, total }
}

/// Trace id of the compaction merging `outputs`.
///
/// Folds `unique_id` over the compaction memo and each utxo id in order.
pub fn compaction_trace_id(outputs: &[Output]) -> Uuid {
    let mut trace = COMPACTION_TRANSACTION_MEMO.to_string();
    for out in outputs {
        trace = unique_id(&trace, &out.utxo_id.to_string()).to_string();
    }
    // An empty fold still yields a stable id.
    Uuid::parse_str(&trace).unwrap_or_else(|_| unique_id(&trace, &trace))
}

/// Sum of all amounts, saturating.
pub fn total_amount(outputs: &[Output]) -> Amount {
    outputs
        .iter()
        .fold(Amount::ZERO, |acc, o| acc.saturating_add(o.amount))
}
