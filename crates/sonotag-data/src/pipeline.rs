//! Background batch production.
//!
//! A [`StreamPlan`] describes one kind of pass (training or validation);
//! [`StreamPlan::spawn`] starts worker threads that run the multiplexer and
//! batcher and hand finished batches to the compute thread through a bounded
//! channel. A stochastic pass shards items over several feeders that share a
//! single batcher. Dropping the returned [`BatchStream`] stops and joins the workers.

use crate::batcher::Batcher;
use crate::error::{DataError, DataResult};
use crate::mux::{ChainMux, MuxMode, StochasticMux};
use crate::sampler::{Example, ItemStreamer};
use crossbeam_channel::{bounded, Receiver, Sender};
use sonotag_abstraction::Batch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Multiplexing policy of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxPolicy {
    /// Random interleave over an active set of `n_active` items.
    Stochastic { n_active: usize, mode: MuxMode },
    /// Items one after the other, in order. Always runs on one producer.
    Chain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub workers: usize,
    pub queue_capacity: usize,
    pub partial: bool,
}

impl PipelineOptions {
    pub fn validate(&self) -> DataResult<()> {
        if self.batch_size == 0 {
            return Err(DataError::InvalidConfig("batch size must be >= 1".to_string()));
        }
        if self.workers == 0 {
            return Err(DataError::InvalidConfig("workers must be >= 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(DataError::InvalidConfig("queue capacity must be >= 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct StreamPlan {
    name: String,
    streamers: Vec<ItemStreamer>,
    policy: MuxPolicy,
    options: PipelineOptions,
}

impl StreamPlan {
    pub fn new(
        name: impl Into<String>,
        streamers: Vec<ItemStreamer>,
        policy: MuxPolicy,
        options: PipelineOptions,
    ) -> DataResult<Self> {
        options.validate()?;
        if let MuxPolicy::Stochastic { n_active: 0, .. } = policy {
            return Err(DataError::InvalidConfig("n_active must be >= 1".to_string()));
        }
        Ok(Self { name: name.into(), streamers, policy, options })
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.streamers.len()
    }

    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Starts one pass. Every call reopens all item streams from scratch.
    pub fn spawn(&self, seed: u64) -> DataResult<BatchStream> {
        let (tx, rx) = bounded(self.options.queue_capacity);
        let cancel = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        match self.policy {
            MuxPolicy::Chain => {
                let mux = ChainMux::new(self.streamers.clone(), seed);
                handles.push(self.spawn_worker(0, mux, tx, &cancel)?);
            }
            MuxPolicy::Stochastic { n_active, mode } => {
                let workers = self.options.workers.min(self.streamers.len()).max(1);
                let mut shards: Vec<Vec<ItemStreamer>> = vec![Vec::new(); workers];
                for (i, s) in self.streamers.iter().enumerate() {
                    shards[i % workers].push(s.clone());
                }
                // every shard feeds one batcher, so only the tail of the pass can be short
                let (ex_tx, ex_rx) = bounded(self.options.queue_capacity * self.options.batch_size);
                let per_worker = n_active.div_ceil(workers).max(1);
                for (w, shard) in shards.into_iter().enumerate() {
                    let worker_seed = seed.wrapping_add((w as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                    let mux = StochasticMux::new(shard, per_worker, mode, worker_seed);
                    handles.push(self.spawn_feeder(w, mux, ex_tx.clone(), &cancel)?);
                }
                drop(ex_tx);
                handles.push(self.spawn_worker(workers, ex_rx.into_iter(), tx, &cancel)?);
            }
        }

        debug!(pass = %self.name, workers = handles.len(), "batch pipeline started");
        Ok(BatchStream { name: self.name.clone(), rx: Some(rx), handles, cancel, delivered: 0 })
    }

    fn spawn_feeder(
        &self,
        worker: usize,
        mux: StochasticMux,
        tx: Sender<Example>,
        cancel: &Arc<AtomicBool>,
    ) -> DataResult<JoinHandle<()>> {
        let cancel = Arc::clone(cancel);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("sonotag-{name}-feed-{worker}"))
            .spawn(move || feed(&name, worker, mux, &tx, &cancel))?;
        Ok(handle)
    }

    fn spawn_worker<I>(
        &self,
        worker: usize,
        examples: I,
        tx: Sender<Batch>,
        cancel: &Arc<AtomicBool>,
    ) -> DataResult<JoinHandle<()>>
    where
        I: Iterator<Item = Example> + Send + 'static,
    {
        let cancel = Arc::clone(cancel);
        let batch_size = self.options.batch_size;
        let partial = self.options.partial;
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("sonotag-{name}-{worker}"))
            .spawn(move || produce(&name, worker, Batcher::new(examples, batch_size, partial), &tx, &cancel))?;
        Ok(handle)
    }
}

fn feed(name: &str, worker: usize, mux: StochasticMux, tx: &Sender<Example>, cancel: &AtomicBool) {
    let mut sent = 0usize;
    for example in mux {
        if cancel.load(Ordering::Relaxed) || tx.send(example).is_err() {
            break;
        }
        sent += 1;
    }
    debug!(pass = %name, worker, examples = sent, "feeder finished");
}

fn produce<I>(name: &str, worker: usize, batches: Batcher<I>, tx: &Sender<Batch>, cancel: &AtomicBool)
where
    I: Iterator<Item = Example>,
{
    let mut sent = 0usize;
    for result in batches {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        match result {
            Ok(batch) => {
                if tx.send(batch).is_err() {
                    // consumer hung up
                    break;
                }
                sent += 1;
            }
            Err(e) => warn!(pass = %name, worker, error = %e, "dropping batch that failed to assemble"),
        }
    }
    debug!(pass = %name, worker, batches = sent, "producer finished");
}

/// Consumer end of a running pass.
pub struct BatchStream {
    name: String,
    rx: Option<Receiver<Batch>>,
    handles: Vec<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    delivered: usize,
}

impl BatchStream {
    /// Batches handed to the consumer so far.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Signals workers to stop, unblocks them, and joins every thread.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        // Dropping the receiver wakes producers blocked on a full queue.
        self.rx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!(pass = %self.name, "batch producer panicked");
            }
        }
    }
}

impl Iterator for BatchStream {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let batch = self.rx.as_ref()?.recv().ok()?;
        self.delivered += 1;
        Some(batch)
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureDescriptor;
    use crate::reader::write_representation;
    use crate::sampler::{ItemSpec, SamplerConfig, SamplingPolicy};
    use ndarray::Array2;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn streamers(temp: &TempDir, frames: &[usize], policy: SamplingPolicy) -> Vec<ItemStreamer> {
        let config = Arc::new(
            SamplerConfig::new(vec![FeatureDescriptor::new("f", temp.path(), 2)], 2, policy).unwrap(),
        );
        frames
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let rel = format!("{i}.bin");
                let rep = Array2::from_shape_fn((n, 2), |(t, _)| (i * 100 + t) as f32);
                write_representation(&temp.path().join(&rel), &rep).unwrap();
                ItemStreamer::new(
                    ItemSpec {
                        id: Arc::from(format!("item-{i}")),
                        repr_path: PathBuf::from(rel),
                        label: Arc::from(vec![0.0, 1.0]),
                        domain: None,
                    },
                    Arc::clone(&config),
                )
            })
            .collect()
    }

    fn options(batch_size: usize, workers: usize) -> PipelineOptions {
        PipelineOptions { batch_size, workers, queue_capacity: 2, partial: true }
    }

    #[test]
    fn test_chain_pass_preserves_order_and_allows_short_last_batch() {
        let temp = TempDir::new().unwrap();
        // overlap stride 2, width 2: 4 frames → 2 patches, 6 → 3, 2 → 1
        let plan = StreamPlan::new(
            "val",
            streamers(&temp, &[4, 6, 2], SamplingPolicy::Overlap { stride: 2 }),
            MuxPolicy::Chain,
            options(4, 3),
        )
        .unwrap();

        let batches: Vec<Batch> = plan.spawn(0).unwrap().collect();
        assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![4, 2]);
        let ids: Vec<String> = batches.iter().flat_map(|b| b.ids.iter().map(|s| s.to_string())).collect();
        assert_eq!(ids, vec!["item-0", "item-0", "item-1", "item-1", "item-1", "item-2"]);
    }

    #[test]
    fn test_each_spawn_is_a_fresh_pass() {
        let temp = TempDir::new().unwrap();
        let plan = StreamPlan::new(
            "val",
            streamers(&temp, &[4, 4], SamplingPolicy::Overlap { stride: 2 }),
            MuxPolicy::Chain,
            options(3, 1),
        )
        .unwrap();
        let first: usize = plan.spawn(0).unwrap().map(|b| b.len()).sum();
        let second: usize = plan.spawn(1).unwrap().map(|b| b.len()).sum();
        assert_eq!(first, 4);
        assert_eq!(second, 4);
    }

    #[test]
    fn test_sharded_stochastic_pass_delivers_every_patch() {
        let temp = TempDir::new().unwrap();
        let frames = [8, 8, 8, 8, 8];
        let plan = StreamPlan::new(
            "train",
            streamers(&temp, &frames, SamplingPolicy::Random { draws: 3 }),
            MuxPolicy::Stochastic { n_active: 4, mode: MuxMode::Exhaustive },
            options(2, 2),
        )
        .unwrap();
        let mut stream = plan.spawn(9).unwrap();
        let sizes: Vec<usize> = stream.by_ref().map(|b| b.len()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 15);
        assert_eq!(stream.delivered(), 8);
        assert_eq!(sizes.iter().filter(|&&n| n < 2).count(), 1);
    }

    #[test]
    fn test_finite_stochastic_pass_has_at_most_one_short_batch() {
        let temp = TempDir::new().unwrap();
        // 4 items x 3 draws = 12 patches over 4 feeders
        let plan = StreamPlan::new(
            "train",
            streamers(&temp, &[8, 8, 8, 8], SamplingPolicy::Random { draws: 3 }),
            MuxPolicy::Stochastic { n_active: 8, mode: MuxMode::Exhaustive },
            options(4, 4),
        )
        .unwrap();
        let sizes: Vec<usize> = plan.spawn(3).unwrap().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![4, 4, 4]);

        let plan = StreamPlan::new(
            "train",
            streamers(&temp, &[8, 8, 8, 8, 8], SamplingPolicy::Random { draws: 3 }),
            MuxPolicy::Stochastic { n_active: 8, mode: MuxMode::Exhaustive },
            options(4, 3),
        )
        .unwrap();
        let sizes: Vec<usize> = plan.spawn(5).unwrap().map(|b| b.len()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 15);
        assert_eq!(sizes.iter().filter(|&&n| n < 4).count(), 1);
        assert_eq!(sizes.last(), Some(&3));
    }

    #[test]
    fn test_stochastic_batches_mix_items_across_feeders() {
        let temp = TempDir::new().unwrap();
        let plan = StreamPlan::new(
            "train",
            streamers(&temp, &[8, 8], SamplingPolicy::Random { draws: 20 }),
            MuxPolicy::Stochastic { n_active: 2, mode: MuxMode::Exhaustive },
            options(40, 2),
        )
        .unwrap();
        let batches: Vec<Batch> = plan.spawn(7).unwrap().collect();
        assert_eq!(batches.len(), 1);
        let ids: std::collections::HashSet<&str> = batches[0].ids.iter().map(|s| &**s).collect();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_dropping_an_endless_stream_joins_workers() {
        let temp = TempDir::new().unwrap();
        let plan = StreamPlan::new(
            "train",
            streamers(&temp, &[6, 6, 6], SamplingPolicy::Random { draws: 2 }),
            MuxPolicy::Stochastic { n_active: 2, mode: MuxMode::WithReplacement },
            options(2, 2),
        )
        .unwrap();
        let mut stream = plan.spawn(1).unwrap();
        let taken: Vec<Batch> = stream.by_ref().take(5).collect();
        assert_eq!(taken.len(), 5);
        assert!(taken.iter().all(|b| b.len() == 2));
        stream.stop();
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let temp = TempDir::new().unwrap();
        let s = streamers(&temp, &[4], SamplingPolicy::Overlap { stride: 1 });
        assert!(StreamPlan::new("x", s.clone(), MuxPolicy::Chain, options(0, 1)).is_err());
        assert!(StreamPlan::new("x", s.clone(), MuxPolicy::Chain, options(1, 0)).is_err());
        assert!(StreamPlan::new(
            "x",
            s,
            MuxPolicy::Stochastic { n_active: 0, mode: MuxMode::Exhaustive },
            options(1, 1)
        )
        .is_err());
    }
}
