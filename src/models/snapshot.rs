use serde::{Deserialize, Serialize};

/// What a view needs to render the timer: whole seconds and whether to dim it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub total_seconds: u64,
    pub idle: bool,
}

impl ClockSnapshot {
    /// Snapshot reported by a disabled accounting instance.
    pub fn inert() -> Self {
        Self {
            total_seconds: 0,
            idle: true,
        }
    }
}
