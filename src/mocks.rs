use crate::errors::Result;
use crate::traits::ClassificationModel;
use ndarray::prelude::*;

/// Mock classification model for tests.
///
/// Predicts a fixed class for every sample, so accuracy against any label
/// set is easy to compute by hand.
#[derive(Debug, Clone)]
pub struct MockClassificationModel {
    pub image_size: u32,
    pub num_classes: usize,
    pub predicted_class: usize,
}

impl MockClassificationModel {
    pub const fn new(image_size: u32, num_classes: usize, predicted_class: usize) -> Self {
        Self {
            image_size,
            num_classes,
            predicted_class,
        }
    }
}

impl ClassificationModel for MockClassificationModel {
    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array2<f32>> {
        let mut logits = Array2::<f32>::zeros((batch.shape()[0], self.num_classes));
        logits
            .column_mut(self.predicted_class)
            .mapv_inplace(|_| 10.0);
        Ok(logits)
    }

    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

pub const fn create_mock_model() -> MockClassificationModel {
    MockClassificationModel::new(224, 1000, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_model_creation() {
        let mock = create_mock_model();
        assert_eq!(mock.input_size(), 224);
        assert_eq!(mock.num_classes(), 1000);
    }

    #[test]
    fn test_mock_model_predict() -> Result<()> {
        let mock = MockClassificationModel::new(8, 4, 2);
        let batch = Array4::<f32>::zeros((3, 8, 8, 3));

        let logits = mock.predict(batch.view())?;
        assert_eq!(logits.shape(), &[3, 4]);
        for row in logits.rows() {
            assert_eq!(row.to_vec(), vec![0.0, 0.0, 10.0, 0.0]);
        }
        Ok(())
    }
}
