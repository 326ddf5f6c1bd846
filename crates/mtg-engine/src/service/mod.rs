//! # Service Layer
//!
//! The group orchestrator and the phases it drives each tick.
//!
//! - `clock`: persisted monotonic timestamps
//! - `group`: boot, run loop, public API
//! - `drain`: feed checkpoints and output projections
//! - `actions`: worker dispatch
//! - `transfer`: fungible build, sign and publish
//! - `collectible`: collectible build, sign and publish

mod actions;
pub mod clock;
mod collectible;
mod drain;
mod group;
mod transfer;

pub use clock::{Clock, CLOCK_PROPERTY_KEY};
pub use drain::DRAIN_CHECKPOINT_KEY;
pub use group::{Group, OutputGrouper, BOOT_SYNCED_KEY, GENESIS_ID_KEY};
