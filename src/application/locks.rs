use crate::domain::ids::InstructionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per payment instruction.
///
/// Every lifecycle operation holds its instruction's lock from loading the
/// graph until the save has returned, so the pending-transaction guard and
/// the reservation cannot interleave with another operation on the same
/// instruction. Different instructions never contend.
#[derive(Default)]
pub struct InstructionLocks {
    slots: Mutex<HashMap<InstructionId, Arc<Mutex<()>>>>,
}

impl InstructionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, instruction: InstructionId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            // Drop slots nobody holds or waits on.
            slots.retain(|id, slot| *id == instruction || Arc::strong_count(slot) > 1);
            slots.entry(instruction).or_default().clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}
