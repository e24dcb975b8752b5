use std::path::{Path, PathBuf};

use ndarray::prelude::*;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::SessionBuilder, Session},
};
use parking_lot::Mutex;

use crate::{
    config::Config,
    errors::{EvalError, Result},
    traits::ClassificationModel,
};

/// Memory layout of the graph's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// channels-first, [N, 3, H, W]
    Nchw,
    /// channels-last, [N, H, W, 3]
    Nhwc,
}

/// Resolve the weights file for this run.
///
/// An explicit `--resume` path wins; otherwise `--use-pretrained` selects
/// `<model-dir>/<model>.onnx`. With neither, the run cannot proceed.
pub fn resolve_weights(config: &Config) -> Result<PathBuf> {
    if let Some(resume) = &config.resume {
        if !resume.as_os_str().is_empty() {
            return Ok(resume.clone());
        }
    }

    if config.use_pretrained {
        return Ok(config.model_dir.join(format!("{}.onnx", config.model)));
    }

    Err(EvalError::Validation {
        field: "weights".to_string(),
        reason: "either --use-pretrained or a --resume path must be supplied".to_string(),
    })
}

/// ONNX classification network behind an ONNX Runtime session.
///
/// The session is created with TensorRT and CUDA execution providers for the
/// configured device and falls back to CPU when neither is available. A
/// zero-tensor warm-up run primes the providers and doubles as output-shape
/// discovery.
pub struct Model {
    image_size: u32,
    num_classes: usize,
    layout: InputLayout,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl Model {
    pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
        let mut session = SessionBuilder::new()
            .map_err(|e| EvalError::Model {
                operation: "session builder initialization".to_string(),
                source: Box::new(e),
            })?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| EvalError::Model {
                operation: "execution provider setup".to_string(),
                source: Box::new(e),
            })?
            .with_memory_pattern(true)
            .map_err(|e| EvalError::Model {
                operation: "memory pattern setup".to_string(),
                source: Box::new(e),
            })?
            .commit_from_file(model_path)
            .map_err(|e| EvalError::Model {
                operation: format!("model file loading: {}", model_path.display()),
                source: Box::new(e),
            })?;

        let input_name = session.inputs[0].name.clone();
        let output_name = session.outputs[0].name.clone();
        let dims = session.inputs[0]
            .input_type
            .tensor_shape()
            .ok_or_else(|| EvalError::Model {
                operation: "model input shape lookup".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "input tensor shape unavailable",
                )),
            })?
            .to_vec();
        let (layout, image_size) = detect_input_layout(&dims)?;

        // warm-up run; the output shape tells us the class count
        let size = image_size as usize;
        let data = match layout {
            InputLayout::Nchw => Array4::<f32>::zeros((1, 3, size, size)),
            InputLayout::Nhwc => Array4::<f32>::zeros((1, size, size, 3)),
        };
        let outputs = session
            .run(ort::inputs![input_name.as_str() => TensorRef::from_array_view(&data).map_err(|e| EvalError::Model {
                operation: "warm-up tensor creation".to_string(),
                source: Box::new(e),
            })?])
            .map_err(|e| EvalError::Model {
                operation: "warm-up run".to_string(),
                source: Box::new(e),
            })?;
        let logits = outputs[output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix2>()
            .map_err(|e| EvalError::Model {
                operation: "logit shape discovery".to_string(),
                source: Box::new(e),
            })?;
        let num_classes = logits.ncols();
        drop(outputs);

        Ok(Self {
            image_size,
            num_classes,
            layout,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }

    pub const fn layout(&self) -> InputLayout {
        self.layout
    }
}

impl ClassificationModel for Model {
    fn predict(&self, batch: ArrayView4<f32>) -> Result<Array2<f32>> {
        // the generator hands over channel-last batches; channel-first graphs
        // get the axes permuted back before the run
        let batch = match self.layout {
            InputLayout::Nhwc => batch,
            InputLayout::Nchw => batch.permuted_axes([0, 3, 1, 2]),
        };
        let batch = batch.as_standard_layout();

        let mut session = self.session.lock();
        let outputs = session.run(
            ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&batch)?],
        )?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix2>()?
            .to_owned())
    }

    fn input_size(&self) -> u32 {
        self.image_size
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

/// Classify a 4-D input shape as channel-first or channel-last and extract
/// the spatial size. Dynamic batch dimensions (-1) are fine; the spatial
/// dimensions must be static.
fn detect_input_layout(dims: &[i64]) -> Result<(InputLayout, u32)> {
    if dims.len() != 4 {
        return Err(EvalError::Model {
            operation: "input layout detection".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected a 4-D image input, got {dims:?}"),
            )),
        });
    }

    if dims[1] == 3 && dims[2] > 0 {
        return Ok((InputLayout::Nchw, dims[2] as u32));
    }
    if dims[3] == 3 && dims[1] > 0 {
        return Ok((InputLayout::Nhwc, dims[1] as u32));
    }

    Err(EvalError::Model {
        operation: "input layout detection".to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("cannot locate the channel axis in {dims:?}"),
        )),
    })
}
