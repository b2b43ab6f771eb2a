//! The cross-validation driver.

use crate::{
    common::*,
    config::LearningRateSchedule,
    data::DatasetTables,
    lifecycle::{FoldGenerators, ModelLifecycle},
    predict::Predictor,
    utils::LrScheduler,
};
use derivative::Derivative;

/// Cross-validation options.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CrossValidationInit {
    /// Train new models if set, otherwise load the trained ones.
    pub train_mode: bool,
    pub nr_epochs: usize,
    pub compile_options: CompileOptions,
    pub lr_schedule: LearningRateSchedule,
    pub batch_size: usize,
    pub test_batch_size: usize,
    /// The network input height and width.
    pub image_size: usize,
    pub box_size: usize,
    /// The base seed of batch shuffling. Fold `f` uses `seed + f`.
    pub shuffle_seed: Option<u64>,
    pub trained_models_dir: PathBuf,
    pub predictions_dir: PathBuf,
    #[derivative(Debug = "ignore")]
    pub norm: Option<NormFn>,
    pub loader: Arc<dyn ImageLoader>,
}

impl CrossValidationInit {
    pub fn build<B>(
        self,
        backend: B,
        splitter: FoldSplitter,
        tables: DatasetTables,
        ctx: ExecutionContext,
    ) -> Result<CrossValidation<B>>
    where
        B: ModelBackend,
    {
        let Self {
            train_mode,
            nr_epochs,
            compile_options,
            lr_schedule,
            batch_size,
            test_batch_size,
            image_size,
            box_size,
            shuffle_seed,
            trained_models_dir,
            predictions_dir,
            norm,
            loader,
        } = self;

        ensure!(nr_epochs > 0, "nr_epochs must be positive");
        ensure!(
            batch_size > 0 && test_batch_size > 0,
            "batch sizes must be positive"
        );
        ensure!(
            tables.box_size() == box_size,
            "the label grids are {0}x{0}, but the configured box size is {1}",
            tables.box_size(),
            box_size
        );

        let lr_scheduler = LrScheduler::new(&lr_schedule)?;
        let predictor = Predictor {
            batch_size: test_batch_size,
            net_h: image_size,
            net_w: image_size,
            box_size,
            norm: norm.clone(),
            loader: loader.clone(),
            output_dir: predictions_dir,
        };
        let lifecycle = ModelLifecycle::new(
            backend,
            nr_epochs,
            compile_options,
            lr_scheduler,
            trained_models_dir,
            predictor,
        );

        Ok(CrossValidation {
            train_mode,
            batch_size,
            image_size,
            box_size,
            shuffle_seed,
            norm,
            loader,
            splitter,
            tables,
            ctx,
            lifecycle,
        })
    }
}

/// Runs the folds of a dataset one after another.
#[derive(Derivative)]
#[derivative(Debug(bound = "B: Debug"))]
pub struct CrossValidation<B>
where
    B: ModelBackend,
{
    train_mode: bool,
    batch_size: usize,
    image_size: usize,
    box_size: usize,
    shuffle_seed: Option<u64>,
    #[derivative(Debug = "ignore")]
    norm: Option<NormFn>,
    loader: Arc<dyn ImageLoader>,
    splitter: FoldSplitter,
    tables: DatasetTables,
    ctx: ExecutionContext,
    lifecycle: ModelLifecycle<B>,
}

impl<B> CrossValidation<B>
where
    B: ModelBackend,
{
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Runs every fold in order. The first failing fold aborts the run.
    pub fn run(&mut self) -> Result<()> {
        let num_splits = self.splitter.num_splits();
        info!(
            "run {}-fold cross-validation in {} mode",
            num_splits,
            if self.train_mode { "train" } else { "inference" }
        );

        for fold in 0..num_splits {
            let span = info_span!("fold", fold);
            let _enter = span.enter();
            self.run_fold(fold)
                .with_context(|| format!("fold {} failed", fold))?;
        }

        Ok(())
    }

    /// Runs a single fold.
    pub fn run_fold(&mut self, fold: usize) -> Result<()> {
        let tables = self.tables.split(&self.splitter, fold)?;
        info!(
            "fold {}: {} train, {} validation, {} test instances",
            fold,
            tables.train.len(),
            tables.val.len(),
            tables.test.len()
        );

        self.ctx.reset();

        if self.train_mode {
            let generators = self.build_generators(&tables)?;
            self.lifecycle.train(&mut self.ctx, &tables, generators)?;
        } else {
            self.lifecycle.infer(&mut self.ctx, &tables)?;
        }

        Ok(())
    }

    fn build_generators(&self, tables: &FoldTables) -> Result<FoldGenerators> {
        let fold = tables.fold;
        let batch_size = self.batch_size;

        ensure!(
            !tables.train.is_empty() && !tables.val.is_empty(),
            "fold {} has an empty train or validation set",
            fold
        );
        for (name, table) in [
            ("train", &tables.train),
            ("validation", &tables.val),
            ("test", &tables.test),
        ] {
            ensure!(
                table.is_empty() || table.len() >= batch_size,
                "the {} set of fold {} has {} instances, fewer than batch_size {}",
                name,
                fold,
                table.len(),
                batch_size
            );
        }

        let generator = |table: &InstanceTable, shuffle: bool| {
            BatchGeneratorInit {
                batch_size,
                shuffle,
                seed: self.shuffle_seed.map(|seed| seed.wrapping_add(fold as u64)),
                norm: self.norm.clone(),
                net_h: self.image_size,
                net_w: self.image_size,
                box_size: self.box_size,
            }
            .build(table.clone(), self.loader.clone())
        };

        let train = generator(&tables.train, true)?;
        let val = generator(&tables.val, false)?;
        let test = generator(&tables.test, false)?;
        info!(
            "{} train batches, {} validation batches, {} test batches",
            train.length(),
            val.length(),
            test.length()
        );

        Ok(FoldGenerators { train, val, test })
    }
}
