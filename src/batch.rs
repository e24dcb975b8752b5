use std::time::Instant;

use ndarray::prelude::*;
use num_traits::Float;
use tracing::info;

use crate::dataset::RecordBatch;
use crate::errors::{EvalError, Result};
use crate::traits::DatasetIterator;

/// One batch in the shape the evaluation loop consumes: channel-last images
/// and one-hot label rows.
#[derive(Debug, Clone)]
pub struct EvalBatch {
    /// NHWC, normalized f32
    pub images: Array4<f32>,
    /// One row per sample, `num_classes` columns
    pub labels: Array2<f32>,
}

impl EvalBatch {
    pub fn len(&self) -> usize {
        self.labels.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.nrows() == 0
    }
}

/// Expand integer labels into one-hot rows.
pub fn to_categorical<F: Float>(labels: ArrayView1<'_, u32>, num_classes: usize) -> Result<Array2<F>> {
    let mut one_hot = Array2::<F>::zeros((labels.len(), num_classes));
    for (row, &label) in labels.iter().enumerate() {
        if label as usize >= num_classes {
            return Err(EvalError::Validation {
                field: "label".to_string(),
                reason: format!("{label} is out of range for {num_classes} classes"),
            });
        }
        one_hot[[row, label as usize]] = F::one();
    }
    Ok(one_hot)
}

/// Restartable adapter between a record iterator and the evaluation loop.
///
/// Yields `(image-array, one-hot-label-array)` pairs with the image tensor
/// transposed from channel-first to channel-last. When the underlying
/// iterator runs out of data it is reset transparently and iteration
/// continues, so the sequence never ends of its own accord; the evaluation
/// loop bounds it by step count.
///
/// With `report_speed`, the batch counter and clock restart once the warm-up
/// batches have passed, and every batch after that logs a smoothed
/// samples/second figure. The warm-up keeps session and cache start-up cost
/// from biasing the number downward.
pub struct BatchGenerator<I: DatasetIterator> {
    iterator: I,
    num_classes: usize,
    report_speed: bool,
    warm_batches: usize,
    ctr: usize,
    samples: usize,
    warm_up_done: bool,
    window_start: Instant,
}

impl<I: DatasetIterator> BatchGenerator<I> {
    pub fn new(iterator: I, num_classes: usize) -> Self {
        Self {
            iterator,
            num_classes,
            report_speed: false,
            warm_batches: 100,
            ctr: 0,
            samples: 0,
            warm_up_done: false,
            window_start: Instant::now(),
        }
    }

    pub fn with_speed_reporting(mut self, warm_batches: usize) -> Self {
        self.report_speed = true;
        self.warm_batches = warm_batches;
        self
    }

    fn fetch(&mut self) -> Result<RecordBatch> {
        match self.iterator.next_batch()? {
            Some(batch) => Ok(batch),
            None => {
                info!("end of data reached, resetting iterator");
                self.iterator.reset();
                self.iterator
                    .next_batch()?
                    .ok_or_else(|| EvalError::Validation {
                        field: "dataset".to_string(),
                        reason: "yielded no batches after reset".to_string(),
                    })
            }
        }
    }

    fn report(&mut self, batch_samples: usize) {
        if self.warm_up_done {
            self.samples += batch_samples;
            let elapsed = self.window_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                info!(
                    "Batch: {}, Samples per sec: {:.2}",
                    self.ctr,
                    self.samples as f64 / elapsed
                );
            }
        }

        if self.ctr > self.warm_batches && !self.warm_up_done {
            self.ctr = 0;
            self.samples = 0;
            self.window_start = Instant::now();
            self.warm_up_done = true;
        }
    }

    fn convert(&self, record: RecordBatch) -> Result<EvalBatch> {
        let RecordBatch { images, labels } = record;
        let images = images
            .permuted_axes([0, 2, 3, 1])
            .as_standard_layout()
            .to_owned();
        let labels = to_categorical(labels.view(), self.num_classes)?;
        Ok(EvalBatch { images, labels })
    }
}

impl<I: DatasetIterator> Iterator for BatchGenerator<I> {
    type Item = Result<EvalBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.fetch() {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };

        self.ctr += 1;
        if self.report_speed {
            self.report(record.labels.len());
        }

        Some(self.convert(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory dataset yielding a fixed list of batches per epoch.
    struct VecDataset {
        batches: Vec<RecordBatch>,
        cursor: usize,
    }

    impl VecDataset {
        fn new(batches: Vec<RecordBatch>) -> Self {
            Self { batches, cursor: 0 }
        }
    }

    impl DatasetIterator for VecDataset {
        fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
            let batch = self.batches.get(self.cursor).cloned();
            if batch.is_some() {
                self.cursor += 1;
            }
            Ok(batch)
        }

        fn reset(&mut self) {
            self.cursor = 0;
        }

        fn len(&self) -> usize {
            self.batches.iter().map(|b| b.labels.len()).sum()
        }
    }

    fn record_batch(batch_size: usize, label: u32) -> RecordBatch {
        RecordBatch {
            images: Array4::zeros((batch_size, 3, 4, 4)),
            labels: Array1::from_elem(batch_size, label),
        }
    }

    #[test]
    fn test_to_categorical() -> Result<()> {
        let labels = ndarray::array![1u32, 0, 2];
        let one_hot: Array2<f32> = to_categorical(labels.view(), 3)?;

        assert_eq!(one_hot.shape(), &[3, 3]);
        assert_eq!(one_hot.row(0).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(one_hot.row(1).to_vec(), vec![1.0, 0.0, 0.0]);
        assert_eq!(one_hot.row(2).to_vec(), vec![0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_to_categorical_rejects_out_of_range_label() {
        let labels = ndarray::array![3u32];
        let result: Result<Array2<f32>> = to_categorical(labels.view(), 3);
        assert!(result.is_err());
    }

    #[test]
    fn test_channel_first_to_channel_last() {
        let mut images = Array4::<f32>::zeros((1, 3, 2, 2));
        images[[0, 2, 1, 0]] = 7.0;
        let dataset = VecDataset::new(vec![RecordBatch {
            images,
            labels: ndarray::array![0u32],
        }]);

        let mut generator = BatchGenerator::new(dataset, 2);
        let batch = generator.next().unwrap().unwrap();

        assert_eq!(batch.images.shape(), &[1, 2, 2, 3]);
        assert_eq!(batch.images[[0, 1, 0, 2]], 7.0);
    }

    #[test]
    fn test_reset_on_exhaustion_keeps_yielding() {
        let dataset = VecDataset::new(vec![record_batch(2, 0), record_batch(2, 1)]);
        let mut generator = BatchGenerator::new(dataset, 2);

        // two epochs plus one batch: exhaustion happens twice, transparently
        for step in 0..5 {
            let batch = generator
                .next()
                .unwrap()
                .unwrap_or_else(|e| panic!("step {step} failed: {e}"));
            assert_eq!(batch.len(), 2);
        }
    }

    #[test]
    fn test_speed_reporting_survives_warm_up_rollover() {
        let dataset = VecDataset::new(vec![record_batch(1, 0)]);
        let mut generator = BatchGenerator::new(dataset, 1).with_speed_reporting(2);

        for _ in 0..6 {
            assert!(generator.next().unwrap().is_ok());
        }
        assert!(generator.warm_up_done);
        // counter restarted when warm-up completed
        assert!(generator.ctr <= 3);
    }
}
