//! Best-model tracking and the patience-driven learning-rate schedule.

use serde::{Deserialize, Serialize};

/// What the schedule decided after one validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochDecision {
    /// The validation cost beat the best so far; checkpoint this epoch.
    pub improved: bool,
    /// The learning rate was halved after this epoch.
    pub lr_decayed: bool,
    /// Learning rate for the next epoch.
    pub learning_rate: f64,
}

/// Training state mutated once per epoch.
///
/// The best cost starts at +inf. A cost that is not strictly lower counts as a
/// miss; when misses reach `patience` the learning rate halves and the
/// counter resets. Improvements do not reset the counter. A patience of 0
/// disables decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatienceSchedule {
    patience: u32,
    misses: u32,
    best_cost: f64,
    best_epoch: Option<usize>,
    learning_rate: f64,
    decays: u32,
}

impl PatienceSchedule {
    #[must_use]
    pub fn new(learning_rate: f64, patience: u32) -> Self {
        Self { patience, misses: 0, best_cost: f64::INFINITY, best_epoch: None, learning_rate, decays: 0 }
    }

    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    #[must_use]
    pub fn best_cost(&self) -> Option<f64> {
        self.best_epoch.map(|_| self.best_cost)
    }

    #[must_use]
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    #[must_use]
    pub fn misses(&self) -> u32 {
        self.misses
    }

    #[must_use]
    pub fn decays(&self) -> u32 {
        self.decays
    }

    /// Feeds the validation task cost of `epoch` (1-based).
    pub fn observe(&mut self, epoch: usize, val_task_cost: f64) -> EpochDecision {
        if val_task_cost < self.best_cost {
            self.best_cost = val_task_cost;
            self.best_epoch = Some(epoch);
            return EpochDecision { improved: true, lr_decayed: false, learning_rate: self.learning_rate };
        }

        self.misses += 1;
        let lr_decayed = self.patience > 0 && self.misses >= self.patience;
        if lr_decayed {
            self.learning_rate /= 2.0;
            self.misses = 0;
            self.decays += 1;
        }
        EpochDecision { improved: false, lr_decayed, learning_rate: self.learning_rate }
    }
}
