use clap::Parser;
use std::path::PathBuf;

/// Command-line configuration for the evaluation run.
///
/// A flat record of scalar values; nothing here owns state beyond the parsed
/// flags themselves.
#[derive(Parser, Clone, Debug)]
#[command(version, about = "Evaluate a pretrained model for image classification", long_about = None)]
pub struct Config {
    /// Validation dataset root, one subdirectory per class
    #[arg(long, default_value = "../imgcls_data/imagenet/val")]
    pub val_dir: PathBuf,

    /// Name of the model to evaluate
    #[arg(long)]
    pub model: String,

    /// Directory holding pretrained weights files
    #[arg(long, default_value = "../imgcls_data/models")]
    pub model_dir: PathBuf,

    /// Use the pretrained weights file named after the model
    #[arg(long)]
    pub use_pretrained: bool,

    /// Resume from an explicit weights path, overriding the name lookup
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Evaluation batch size per device
    #[arg(long, default_value_t = 512)]
    pub batch_size: usize,

    /// Number of devices; scales the effective batch size
    #[arg(long, default_value_t = 0)]
    pub num_devices: usize,

    /// Device ordinal passed to the execution providers
    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Number of preprocessing workers
    #[arg(short = 'j', long, default_value_t = 4)]
    pub num_workers: usize,

    /// Number of validation samples
    #[arg(long, default_value_t = 50000)]
    pub val_size: usize,

    /// Directory of log files; empty disables file logging
    #[arg(long, default_value = "")]
    pub save_dir: PathBuf,

    /// Filename of the evaluation log
    #[arg(long, default_value = "train.log")]
    pub logging_file_name: String,

    /// Report smoothed samples/sec from the batch generator
    #[arg(long)]
    pub report_speed: bool,

    /// Batches to discard before throughput reporting starts
    #[arg(long, default_value_t = 100)]
    pub warm_batches: usize,
}

impl Config {
    pub fn new() -> Self {
        Self::parse()
    }

    /// Batch size actually fed to the session: per-device size times the
    /// device count, with zero devices meaning plain CPU execution.
    pub const fn effective_batch_size(&self) -> usize {
        self.batch_size * max_usize(1, self.num_devices)
    }

    /// Number of evaluation steps; the remainder of the validation set that
    /// does not fill a whole batch is dropped.
    pub const fn steps(&self) -> usize {
        self.val_size / self.effective_batch_size()
    }
}

const fn max_usize(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}
