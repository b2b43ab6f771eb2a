//! The cross-validation training program of weakly-supervised patch localization.

pub mod common;
pub mod config;
pub mod cross_validation;
pub mod data;
pub mod fit;
pub mod lifecycle;
pub mod logging;
pub mod predict;
pub mod utils;

use crate::{
    common::*,
    config::Config,
    cross_validation::CrossValidationInit,
    data::DatasetTables,
    logging::save_json,
};

/// The entry of training program.
pub fn start(config: Arc<Config>) -> Result<()> {
    let start_time = Local::now();
    let trained_models_dir = config.trained_models_dir();
    let predictions_dir = config.predictions_dir();

    // create dirs and save config
    for dir in [&trained_models_dir, &predictions_dir] {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory '{}'", dir.display()))?;
    }
    {
        let path = config.cv_dir().join(format!(
            "config-{}.json",
            start_time.format(utils::FILE_STRFTIME)
        ));
        save_json(&path, &*config)?;
    }

    // load dataset
    info!("loading dataset");
    let tables = DatasetTables::load(&config.dataset)?;
    let splitter = {
        let config::CrossValidationConfig {
            num_splits,
            seed,
            val_ratio,
            group_by_image,
        } = config.cross_validation;
        FoldSplitter::new(num_splits, seed, val_ratio, group_by_image)?
    };

    // prepare model backend
    let backend = TorchScriptBackend::new(&config.model.module_file)?;
    let ctx = ExecutionContext::new(config.training.device, config.training.shuffle_seed);
    info!("use device {:?}", config.training.device);

    let mut cross_validation = CrossValidationInit {
        train_mode: config.training.train_mode,
        nr_epochs: config.training.nr_epochs,
        compile_options: config.training.compile_options(),
        lr_schedule: config.training.lr_schedule(),
        batch_size: config.training.batch_size,
        test_batch_size: config.training.test_batch_size,
        image_size: config.training.image_size,
        box_size: config.training.box_size,
        shuffle_seed: config.training.shuffle_seed,
        trained_models_dir,
        predictions_dir,
        norm: Some(mil_loc::processor::imagenet_norm_fn()),
        loader: Arc::new(data::image_loader(&config.dataset)),
    }
    .build(backend, splitter, tables, ctx)?;

    cross_validation.run()?;

    info!(
        "finished in {}s",
        (Local::now() - start_time).num_seconds()
    );
    Ok(())
}
