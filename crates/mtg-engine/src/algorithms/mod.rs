//! # Algorithms
//!
//! Pure functions shared by the signing services.

pub mod selection;

pub use selection::{compaction_trace_id, select_outputs, total_amount, Selection};
