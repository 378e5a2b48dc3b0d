//! Fixed-size batching of example streams.
//!
//! Consecutive examples are stacked into a [`Batch`]. Only the tail of a
//! finite stream can come out short.

use crate::error::{DataError, DataResult};
use crate::sampler::Example;
use ndarray::{stack, Array2, ArrayView1, ArrayView2, Axis};
use sonotag_abstraction::Batch;
use std::sync::Arc;

/// Groups consecutive examples into batches of `batch_size`.
///
/// With `partial` set, the examples left over when the source ends are
/// emitted as one short batch; otherwise they are dropped.
pub struct Batcher<I> {
    inner: I,
    batch_size: usize,
    partial: bool,
}

impl<I: Iterator<Item = Example>> Batcher<I> {
    pub fn new(inner: I, batch_size: usize, partial: bool) -> Self {
        Self { inner, batch_size: batch_size.max(1), partial }
    }
}

impl<I: Iterator<Item = Example>> Iterator for Batcher<I> {
    type Item = DataResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = Vec::with_capacity(self.batch_size);
        for example in self.inner.by_ref() {
            buf.push(example);
            if buf.len() == self.batch_size {
                return Some(assemble_batch(buf));
            }
        }
        if buf.is_empty() || (!self.partial && buf.len() < self.batch_size) {
            return None;
        }
        Some(assemble_batch(buf))
    }
}

/// Stacks examples into batch tensors.
pub fn assemble_batch(examples: Vec<Example>) -> DataResult<Batch> {
    if examples.is_empty() {
        return Err(DataError::Batch("cannot assemble an empty batch".to_string()));
    }

    let xs: Vec<ArrayView2<'_, f32>> = examples.iter().map(|e| e.x.view()).collect();
    let x = stack(Axis(0), &xs)?;

    let y = stack_labels(examples.iter().map(|e| Some(&e.y)), "label")?;
    let domains = if examples.iter().all(|e| e.domain.is_some()) {
        Some(stack_labels(examples.iter().map(|e| e.domain.as_ref()), "domain label")?)
    } else if examples.iter().any(|e| e.domain.is_some()) {
        return Err(DataError::Batch("some examples carry a domain label and some do not".to_string()));
    } else {
        None
    };

    let ids: Vec<Arc<str>> = examples.iter().map(|e| Arc::clone(&e.id)).collect();
    Ok(Batch::try_new(x, y, domains, ids)?)
}

fn stack_labels<'a>(
    labels: impl Iterator<Item = Option<&'a Arc<[f32]>>>,
    what: &str,
) -> DataResult<Array2<f32>> {
    let mut rows: Vec<ArrayView1<'a, f32>> = Vec::new();
    for label in labels {
        let label = label.ok_or_else(|| DataError::Batch(format!("missing {what}")))?;
        rows.push(ArrayView1::from(&label[..]));
    }
    stack(Axis(0), &rows).map_err(|e| DataError::Batch(format!("inconsistent {what} lengths: {e}")))
}
