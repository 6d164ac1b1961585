mod tracker;

pub use tracker::{Alert, AlertState, Condition, DisruptionTracker};
