use crate::dataset::RecordBatch;
use crate::errors::Result;
use ndarray::prelude::*;

/// Abstraction over an image-classification network.
///
/// The evaluator depends on this seam instead of the concrete ONNX session so
/// tests can run against mocks.
pub trait ClassificationModel: Send + Sync {
    /// Run the network on a channel-last image batch, returning one row of
    /// logits per sample.
    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array2<f32>>;

    /// Spatial input size the network expects
    fn input_size(&self) -> u32;

    /// Number of output classes
    fn num_classes(&self) -> usize;
}

/// A restartable source of labeled image batches.
///
/// Mirrors the next/reset capability of a record-file iterator: `next_batch`
/// yields `None` once the epoch is exhausted, and `reset` rewinds to the
/// beginning.
pub trait DatasetIterator: Send {
    fn next_batch(&mut self) -> Result<Option<RecordBatch>>;

    fn reset(&mut self);

    /// Total number of samples in one epoch
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
