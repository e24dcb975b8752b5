use anyhow::{ensure, Result};
use rayon::ThreadPoolBuilder;
use tracing::{info, warn};

use imgcls_eval_rs::{
    initialize_logging, resolve_weights, BatchGenerator, ClassificationModel, Config,
    DatasetIterator, Evaluator, ImageFolderDataset, Model,
};

fn main() -> Result<()> {
    let config = Config::new();

    ensure!(
        config.use_pretrained
            || config
                .resume
                .as_ref()
                .is_some_and(|p| !p.as_os_str().is_empty()),
        "Either --use-pretrained or --resume must be supplied"
    );
    ensure!(config.batch_size > 0, "--batch-size must be positive");

    let log_file_exists = initialize_logging(&config.save_dir, &config.logging_file_name)?;
    if log_file_exists {
        info!("Log file already exists, appending");
    }
    info!("Script arguments: {:?}", config);

    let weights = resolve_weights(&config)?;
    ensure!(
        weights.exists(),
        "Weights file does not exist: {}",
        weights.display()
    );
    ensure!(
        config.val_dir.exists(),
        "Validation directory does not exist: {}",
        config.val_dir.display()
    );

    ThreadPoolBuilder::new()
        .num_threads(config.num_workers)
        .build_global()?;

    let model = Model::new(&weights, config.device_id)?;
    info!(
        "Loaded {} from {} (input size {}, {} classes)",
        config.model,
        weights.display(),
        model.input_size(),
        model.num_classes()
    );

    let batch_size = config.effective_batch_size();
    let dataset = ImageFolderDataset::new(&config.val_dir, batch_size, model.input_size())?;

    let mut val_size = config.val_size;
    if dataset.len() < val_size {
        warn!(
            "validation set holds {} samples, fewer than --val-size {}",
            dataset.len(),
            val_size
        );
        val_size = dataset.len();
    }
    let steps = val_size / batch_size;

    let num_classes = model.num_classes();
    let mut generator = BatchGenerator::new(dataset, num_classes);
    if config.report_speed {
        generator = generator.with_speed_reporting(config.warm_batches);
    }

    let evaluator = Evaluator::new(model);
    let report = evaluator.evaluate(&mut generator, steps)?;
    info!(
        "score: [{:.6}, {:.6}]",
        report.summary.score, report.summary.accuracy
    );

    Ok(())
}
