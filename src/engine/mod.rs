//! Alert evaluation
//!
//! Pure decision logic: the crossing/cooldown state machine for user
//! subscriptions and the day-level change detector for catalog auto-scans.
//! Neither function performs I/O; persistence happens in the scheduler.

mod autoscan;
mod evaluator;

pub use autoscan::{detect_change, qualifying_set, ScanDelta};
pub use evaluator::{evaluate, Evaluation, Rule};
