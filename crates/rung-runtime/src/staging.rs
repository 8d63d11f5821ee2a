//! Input staging.
//!
//! External writers (editor surface, fieldbus) never touch the committed
//! snapshot directly. Changes collect here and become visible to node
//! evaluation at the next commit barrier. Momentary staging survives the
//! commit because the driver re-asserts a held button every frame; latch and
//! direct-signal writes are one-shot and drain on commit.

use std::collections::HashMap;

use rung_dsl::SignalId;

#[derive(Debug, Default)]
pub struct InputStaging {
    momentary: HashMap<String, bool>,
    latch: HashMap<String, bool>,
    signals: HashMap<SignalId, u8>,
}

impl InputStaging {
    pub fn stage_momentary(&mut self, btn: &str, down: bool) {
        self.momentary.insert(btn.to_string(), down);
    }

    pub fn stage_latch(&mut self, btn: &str, value: bool) {
        self.latch.insert(btn.to_string(), value);
    }

    pub fn stage_signal(&mut self, id: SignalId, value: u8) {
        self.signals.insert(id, value);
    }

    /// Staged momentary state, if any (for immediate read-back)
    pub fn staged_momentary(&self, btn: &str) -> Option<bool> {
        self.momentary.get(btn).copied()
    }

    pub fn staged_latch(&self, btn: &str) -> Option<bool> {
        self.latch.get(btn).copied()
    }

    pub fn staged_signal(&self, id: SignalId) -> Option<u8> {
        self.signals.get(&id).copied()
    }

    /// Apply everything staged at a commit barrier.
    ///
    /// Momentary state is copied but kept staged; latch and signal writes
    /// drain. Signal writes land directly in the committed snapshot.
    pub fn commit(
        &mut self,
        momentary: &mut HashMap<String, bool>,
        latch: &mut HashMap<String, bool>,
        cur: &mut [u8],
    ) {
        for (name, &down) in &self.momentary {
            momentary.insert(name.clone(), down);
        }
        for (name, value) in self.latch.drain() {
            latch.insert(name, value);
        }
        for (id, value) in self.signals.drain() {
            if let Some(cell) = cur.get_mut(id.index()) {
                *cell = value;
            }
        }
    }

    /// Drop everything staged (hot reload discards in-flight input)
    pub fn clear(&mut self) {
        self.momentary.clear();
        self.latch.clear();
        self.signals.clear();
    }
}
