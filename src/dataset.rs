use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::ImageFormat;
use ndarray::prelude::*;
use nshare::AsNdarray3;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::errors::{EvalError, Result};
use crate::traits::DatasetIterator;

/// Normalization constants used by the standard ImageNet validation pipeline.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Ratio of the crop edge to the resized shorter side (224/256).
const CROP_RATIO: f32 = 0.875;

/// One decoded batch: channel-first image tensor plus integer labels.
///
/// Read once per batch and discarded after use; nothing downstream holds on
/// to these arrays.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    /// NCHW, normalized f32
    pub images: Array4<f32>,
    pub labels: Array1<u32>,
}

/// Directory-backed validation dataset with an ImageNet-style layout: one
/// subdirectory per class, sorted subdirectory names defining labels 0..N.
///
/// Decoding and preprocessing of a batch runs in parallel on the rayon pool.
pub struct ImageFolderDataset {
    samples: Vec<(PathBuf, u32)>,
    num_classes: usize,
    batch_size: usize,
    image_size: u32,
    cursor: usize,
}

impl ImageFolderDataset {
    pub fn new(root: &Path, batch_size: usize, image_size: u32) -> Result<Self> {
        if batch_size == 0 {
            return Err(EvalError::Validation {
                field: "batch_size".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let mut class_dirs: Vec<PathBuf> = std::fs::read_dir(root)
            .map_err(|e| EvalError::FileSystem {
                path: root.to_path_buf(),
                operation: "read dataset root".to_string(),
                source: e,
            })?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        class_dirs.sort();

        if class_dirs.is_empty() {
            return Err(EvalError::Dataset {
                path: root.to_path_buf(),
                operation: "class discovery".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no class subdirectories found",
                )),
            });
        }

        let num_classes = class_dirs.len();
        let mut samples = Vec::new();
        for (label, class_dir) in class_dirs.iter().enumerate() {
            let mut files: Vec<PathBuf> = WalkDir::new(class_dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| ImageFormat::from_path(e.path()).is_ok())
                .map(|e| e.into_path())
                .collect();
            files.sort();
            samples.extend(files.into_iter().map(|p| (p, label as u32)));
        }

        if samples.is_empty() {
            return Err(EvalError::Dataset {
                path: root.to_path_buf(),
                operation: "sample discovery".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no image files found under class subdirectories",
                )),
            });
        }

        Ok(Self {
            samples,
            num_classes,
            batch_size,
            image_size,
            cursor: 0,
        })
    }

    pub const fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl DatasetIterator for ImageFolderDataset {
    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        if self.cursor >= self.samples.len() {
            return Ok(None);
        }

        let end = (self.cursor + self.batch_size).min(self.samples.len());
        let chunk = &self.samples[self.cursor..end];
        self.cursor = end;

        let image_size = self.image_size;
        let tensors: Vec<Array3<f32>> = chunk
            .par_iter()
            .map(|(path, _)| load_image(path, image_size))
            .collect::<Result<_>>()?;

        let size = image_size as usize;
        let mut images = Array4::<f32>::zeros((chunk.len(), 3, size, size));
        for (i, tensor) in tensors.iter().enumerate() {
            images.slice_mut(s![i, .., .., ..]).assign(tensor);
        }
        let labels = chunk.iter().map(|(_, label)| *label).collect::<Array1<_>>();

        Ok(Some(RecordBatch { images, labels }))
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Decode one image and produce a normalized CHW tensor: resize the shorter
/// side so the center crop covers `CROP_RATIO` of it, crop to
/// `image_size` x `image_size`, scale to [0, 1] and apply ImageNet
/// mean/std normalization.
pub fn load_image(path: &Path, image_size: u32) -> Result<Array3<f32>> {
    let image = image::open(path)
        .map_err(|e| EvalError::ImageProcessing {
            path: path.display().to_string(),
            operation: "image decode".to_string(),
            source: Box::new(e),
        })?
        .into_rgb8();

    let (w, h) = image.dimensions();
    let resize_short = (image_size as f32 / CROP_RATIO).round() as u32;
    let (new_w, new_h) = if w <= h {
        (resize_short, (h * resize_short).div_ceil(w))
    } else {
        ((w * resize_short).div_ceil(h), resize_short)
    };
    let resized = imageops::resize(&image, new_w, new_h, FilterType::Triangle);

    let x = (new_w - image_size) / 2;
    let y = (new_h - image_size) / 2;
    let cropped = imageops::crop_imm(&resized, x, y, image_size, image_size).to_image();

    let mut tensor = cropped.as_ndarray3().mapv(|v| f32::from(v) / 255.0);
    for (c, mut channel) in tensor.outer_iter_mut().enumerate() {
        channel.mapv_inplace(|v| (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c]);
    }

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_class_images(root: &Path, class: &str, count: usize, color: Rgb<u8>) {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let img = RgbImage::from_pixel(32, 48, color);
            img.save(dir.join(format!("img_{i}.png"))).unwrap();
        }
    }

    #[test]
    fn test_labels_follow_sorted_class_dirs() -> Result<()> {
        let temp = TempDir::new()?;
        write_class_images(temp.path(), "n02_b", 1, Rgb([0, 255, 0]));
        write_class_images(temp.path(), "n01_a", 1, Rgb([255, 0, 0]));

        let mut dataset = ImageFolderDataset::new(temp.path(), 4, 8)?;
        assert_eq!(dataset.num_classes(), 2);
        assert_eq!(dataset.len(), 2);

        let batch = dataset.next_batch()?.unwrap();
        // n01_a sorts before n02 so it takes label 0
        assert_eq!(batch.labels.to_vec(), vec![0, 1]);
        Ok(())
    }

    #[test]
    fn test_batch_shapes_and_partial_final_batch() -> Result<()> {
        let temp = TempDir::new()?;
        write_class_images(temp.path(), "a", 3, Rgb([10, 20, 30]));

        let mut dataset = ImageFolderDataset::new(temp.path(), 2, 8)?;

        let first = dataset.next_batch()?.unwrap();
        assert_eq!(first.images.shape(), &[2, 3, 8, 8]);
        assert_eq!(first.labels.len(), 2);

        let second = dataset.next_batch()?.unwrap();
        assert_eq!(second.images.shape(), &[1, 3, 8, 8]);

        assert!(dataset.next_batch()?.is_none());
        Ok(())
    }

    #[test]
    fn test_reset_rewinds_to_start() -> Result<()> {
        let temp = TempDir::new()?;
        write_class_images(temp.path(), "a", 2, Rgb([0, 0, 0]));

        let mut dataset = ImageFolderDataset::new(temp.path(), 2, 8)?;
        assert!(dataset.next_batch()?.is_some());
        assert!(dataset.next_batch()?.is_none());

        dataset.reset();
        assert!(dataset.next_batch()?.is_some());
        Ok(())
    }

    #[test]
    fn test_empty_root_is_rejected() {
        let temp = TempDir::new().unwrap();
        assert!(ImageFolderDataset::new(temp.path(), 2, 8).is_err());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let temp = TempDir::new().unwrap();
        write_class_images(temp.path(), "a", 1, Rgb([0, 0, 0]));

        assert!(ImageFolderDataset::new(temp.path(), 0, 8).is_err());
    }

    #[test]
    fn test_normalization_range() -> Result<()> {
        let temp = TempDir::new()?;
        write_class_images(temp.path(), "a", 1, Rgb([255, 255, 255]));

        let mut dataset = ImageFolderDataset::new(temp.path(), 1, 8)?;
        let batch = dataset.next_batch()?.unwrap();

        // white pixels map to (1.0 - mean) / std per channel
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            let got = batch.images[[0, c, 0, 0]];
            assert!((got - expected).abs() < 1e-4);
        }
        Ok(())
    }
}
