//! Type definitions for the trajectory anomaly engine

pub mod alert;
pub mod position;
pub mod verdict;

pub use alert::{AnomalyAlert, LedgerEntry, LedgerEventType};
pub use position::{Position, Trajectory, MIN_TRAJECTORY_LEN};
pub use verdict::{Verdict, VerdictPhase};
