//! Multiplexers that merge many item streams into one example stream.

use crate::sampler::{Example, ItemStream, ItemStreamer};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// How a [`StochasticMux`] refills its active set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuxMode {
    /// Each item is activated once, in shuffled order; the mux ends when the
    /// pool is drained.
    #[default]
    Exhaustive,
    /// Exhausted slots are refilled with a uniformly drawn item. Never ends on
    /// its own; the caller decides how many batches make an epoch.
    WithReplacement,
}

/// Concatenates every item's full stream in the given order.
pub struct ChainMux {
    streamers: std::vec::IntoIter<ItemStreamer>,
    current: Option<ItemStream>,
    rng: StdRng,
}

impl ChainMux {
    #[must_use]
    pub fn new(streamers: Vec<ItemStreamer>, seed: u64) -> Self {
        Self { streamers: streamers.into_iter(), current: None, rng: StdRng::seed_from_u64(seed) }
    }
}

impl Iterator for ChainMux {
    type Item = Example;

    fn next(&mut self) -> Option<Example> {
        loop {
            if let Some(stream) = self.current.as_mut() {
                if let Some(example) = stream.next() {
                    return Some(example);
                }
            }
            let streamer = self.streamers.next()?;
            self.current = Some(streamer.open(self.rng.r#gen()));
        }
    }
}

/// Interleaves a fixed-size active set of item streams at random.
pub struct StochasticMux {
    pool: Vec<ItemStreamer>,
    pending: VecDeque<usize>,
    active: Vec<ItemStream>,
    n_active: usize,
    mode: MuxMode,
    rng: StdRng,
    empty_activations: usize,
}

impl StochasticMux {
    #[must_use]
    pub fn new(pool: Vec<ItemStreamer>, n_active: usize, mode: MuxMode, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..pool.len()).collect();
        order.shuffle(&mut rng);
        Self {
            pool,
            pending: order.into(),
            active: Vec::with_capacity(n_active),
            n_active: n_active.max(1),
            mode,
            rng,
            empty_activations: 0,
        }
    }

    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    fn next_candidate(&mut self) -> Option<usize> {
        match self.mode {
            MuxMode::Exhaustive => self.pending.pop_front(),
            MuxMode::WithReplacement if self.pool.is_empty() => None,
            MuxMode::WithReplacement => Some(self.rng.gen_range(0..self.pool.len())),
        }
    }

    fn fill(&mut self) {
        while self.active.len() < self.n_active {
            let Some(idx) = self.next_candidate() else { break };
            let seed = self.rng.r#gen();
            self.active.push(self.pool[idx].open(seed));
        }
    }
}

impl Iterator for StochasticMux {
    type Item = Example;

    fn next(&mut self) -> Option<Example> {
        loop {
            self.fill();
            if self.active.is_empty() {
                debug!("stochastic mux drained");
                return None;
            }
            let slot = self.rng.gen_range(0..self.active.len());
            if let Some(example) = self.active[slot].next() {
                self.empty_activations = 0;
                return Some(example);
            }

            let finished = self.active.swap_remove(slot);
            if finished.emitted() == 0 {
                self.empty_activations += 1;
                // Every item failing in a row would otherwise spin forever.
                if self.mode == MuxMode::WithReplacement && self.empty_activations >= self.pool.len() {
                    warn!(
                        consecutive_empty = self.empty_activations,
                        "no item produced a patch, stopping stochastic mux"
                    );
                    return None;
                }
            }
        }
    }
}
