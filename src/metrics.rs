use ndarray::prelude::*;

use crate::errors::{EvalError, Result};

/// Floor for predicted probabilities inside the log, so a confidently wrong
/// prediction cannot produce an infinite score.
const PROB_EPSILON: f64 = 1e-12;

/// Final figures for one evaluation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalSummary {
    /// Mean categorical cross-entropy
    pub score: f64,
    /// Top-1 accuracy
    pub accuracy: f64,
    pub err_top1: f64,
    pub err_top5: f64,
    pub samples: usize,
}

/// Running accumulator for score and accuracy over logit batches.
///
/// Logits are turned into probabilities with a max-subtracted softmax per
/// row, then scored against one-hot labels: mean cross-entropy (the "score"),
/// top-1 accuracy and top-1/top-5 error rates.
#[derive(Debug, Default)]
pub struct EvalMetrics {
    loss_sum: f64,
    correct_top1: usize,
    correct_top5: usize,
    samples: usize,
}

impl EvalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, logits: ArrayView2<f32>, labels: ArrayView2<f32>) -> Result<()> {
        if logits.shape() != labels.shape() {
            return Err(EvalError::Validation {
                field: "logits".to_string(),
                reason: format!(
                    "shape {:?} does not match labels shape {:?}",
                    logits.shape(),
                    labels.shape()
                ),
            });
        }

        for (logit_row, label_row) in logits.rows().into_iter().zip(labels.rows()) {
            let truth = argmax(label_row.iter().copied());
            let probs = softmax(logit_row);

            let p_true = probs[truth];
            self.loss_sum += -(p_true.max(PROB_EPSILON)).ln();

            // argmax with lowest-index tie-breaking, so tied rows do not
            // all count as correct
            if argmax(probs.iter().copied()) == truth {
                self.correct_top1 += 1;
            }
            let rank = probs.iter().filter(|&&p| p > p_true).count();
            if rank < 5 {
                self.correct_top5 += 1;
            }
            self.samples += 1;
        }

        Ok(())
    }

    pub fn summary(&self) -> EvalSummary {
        let n = self.samples.max(1) as f64;
        let accuracy = self.correct_top1 as f64 / n;
        EvalSummary {
            score: self.loss_sum / n,
            accuracy,
            err_top1: 1.0 - accuracy,
            err_top5: 1.0 - self.correct_top5 as f64 / n,
            samples: self.samples,
        }
    }
}

/// Index of the largest value; ties break toward the lowest index.
fn argmax<I>(values: I) -> usize
where
    I: IntoIterator,
    I::Item: PartialOrd + Copy,
{
    let mut best = 0;
    let mut best_value = None;
    for (i, v) in values.into_iter().enumerate() {
        let larger = match best_value {
            None => true,
            Some(b) => v > b,
        };
        if larger {
            best = i;
            best_value = Some(v);
        }
    }
    best
}

fn softmax(row: ArrayView1<f32>) -> Vec<f64> {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = row.iter().map(|&v| (f64::from(v) - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
