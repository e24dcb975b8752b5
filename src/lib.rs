pub mod batch;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod traits;

pub mod mocks;

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

pub use batch::{to_categorical, BatchGenerator, EvalBatch};
pub use config::Config;
pub use dataset::{ImageFolderDataset, RecordBatch};
pub use errors::{EvalError, Result};
pub use logging::initialize_logging;
pub use metrics::{EvalMetrics, EvalSummary};
pub use model::{resolve_weights, Model};
pub use traits::*;

/// Outcome of one evaluation run.
#[derive(Debug, Clone, Copy)]
pub struct EvalReport {
    pub summary: EvalSummary,
    pub elapsed: Duration,
}

/// Drives batches from a generator through a classification model and
/// accumulates score and accuracy.
pub struct Evaluator<M: ClassificationModel> {
    model: M,
}

impl<M: ClassificationModel> Evaluator<M> {
    pub const fn new(model: M) -> Self {
        Self { model }
    }

    /// Run `steps` batches through the model.
    ///
    /// The generator is expected to be endless (it resets its underlying
    /// iterator on exhaustion), so the step count is what bounds the run.
    pub fn evaluate<G>(&self, generator: &mut G, steps: usize) -> Result<EvalReport>
    where
        G: Iterator<Item = Result<EvalBatch>>,
    {
        if steps == 0 {
            return Err(EvalError::Validation {
                field: "steps".to_string(),
                reason: "is zero; batch size exceeds the validation set".to_string(),
            });
        }

        let progress_bar = ProgressBar::new(steps as u64);
        progress_bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec} {eta})",
            )
            .map_err(|e| EvalError::Configuration {
                message: format!("invalid progress bar template: {e}"),
            })?
            .progress_chars("#>-"),
        );

        let mut metrics = EvalMetrics::new();
        let tic = Instant::now();

        for _ in 0..steps {
            let batch = generator.next().ok_or_else(|| EvalError::Validation {
                field: "generator".to_string(),
                reason: "ended before the requested step count".to_string(),
            })??;

            let logits = self.model.predict(batch.images.view())?;
            metrics.update(logits.view(), batch.labels.view())?;
            progress_bar.inc(1);
        }

        progress_bar.finish();

        let elapsed = tic.elapsed();
        let summary = metrics.summary();
        info!("Time cost: {:.4} sec", elapsed.as_secs_f64());
        info!("Test score: {:.6}", summary.score);
        info!("Test accuracy: {:.6}", summary.accuracy);
        info!(
            "Test: err-top1={:.4}\terr-top5={:.4}",
            summary.err_top1, summary.err_top5
        );

        Ok(EvalReport { summary, elapsed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocks::MockClassificationModel;
    use ndarray::prelude::*;

    fn eval_batch(labels: &[u32], num_classes: usize) -> EvalBatch {
        EvalBatch {
            images: Array4::zeros((labels.len(), 8, 8, 3)),
            labels: to_categorical(Array1::from_vec(labels.to_vec()).view(), num_classes)
                .unwrap(),
        }
    }

    #[test]
    fn test_evaluate_accumulates_over_steps() -> Result<()> {
        let model = MockClassificationModel::new(8, 4, 0);
        let evaluator = Evaluator::new(model);

        // mock always predicts class 0: half these labels match
        let batches = vec![
            Ok(eval_batch(&[0, 1], 4)),
            Ok(eval_batch(&[0, 2], 4)),
        ];
        let mut generator = batches.into_iter();

        let report = evaluator.evaluate(&mut generator, 2)?;
        assert_eq!(report.summary.samples, 4);
        assert!((report.summary.accuracy - 0.5).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_evaluate_rejects_zero_steps() {
        let evaluator = Evaluator::new(MockClassificationModel::new(8, 4, 0));
        let mut generator = std::iter::empty();

        assert!(evaluator.evaluate(&mut generator, 0).is_err());
    }

    #[test]
    fn test_evaluate_fails_on_short_generator() {
        let evaluator = Evaluator::new(MockClassificationModel::new(8, 4, 0));
        let mut generator = vec![Ok(eval_batch(&[0], 4))].into_iter();

        assert!(evaluator.evaluate(&mut generator, 2).is_err());
    }

    #[test]
    fn test_evaluate_propagates_generator_errors() {
        let evaluator = Evaluator::new(MockClassificationModel::new(8, 4, 0));
        let mut generator = vec![Err(EvalError::Validation {
            field: "dataset".to_string(),
            reason: "broken".to_string(),
        })]
        .into_iter();

        assert!(evaluator.evaluate(&mut generator, 1).is_err());
    }
}
