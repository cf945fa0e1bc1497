//! Capacity counter for general admission events

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counters for an unseated event. `sold + held <= total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySlot {
    pub event_id: Uuid,
    pub total: u32,
    pub held: u32,
    pub sold: u32,
}

impl CapacitySlot {
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.sold + self.held)
    }
}
