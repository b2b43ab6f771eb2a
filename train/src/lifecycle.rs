//! The per-fold model lifecycle.

use crate::{
    common::*,
    fit::{self, Callback, History},
    logging::{save_json, CurveLogger},
    predict::{Predictor, Role},
    utils::{discover_checkpoint, LrScheduler, ModelCheckpoint},
};

/// The batch generators of a fold in train mode.
#[derive(Debug)]
pub struct FoldGenerators {
    pub train: BatchGenerator,
    pub val: BatchGenerator,
    pub test: BatchGenerator,
}

/// Drives one model per fold through training or inference.
#[derive(Debug)]
pub struct ModelLifecycle<B>
where
    B: ModelBackend,
{
    backend: B,
    nr_epochs: usize,
    compile_options: CompileOptions,
    lr_scheduler: LrScheduler,
    trained_models_dir: PathBuf,
    predictor: Predictor,
}

impl<B> ModelLifecycle<B>
where
    B: ModelBackend,
{
    pub fn new(
        backend: B,
        nr_epochs: usize,
        compile_options: CompileOptions,
        lr_scheduler: LrScheduler,
        trained_models_dir: impl AsRef<Path>,
        predictor: Predictor,
    ) -> Self {
        Self {
            backend,
            nr_epochs,
            compile_options,
            lr_scheduler,
            trained_models_dir: trained_models_dir.as_ref().to_owned(),
            predictor,
        }
    }

    /// Builds, trains, evaluates a fresh model and saves its predictions.
    ///
    /// A checkpoint is written after every epoch.
    pub fn train(
        &mut self,
        ctx: &mut ExecutionContext,
        tables: &FoldTables,
        generators: FoldGenerators,
    ) -> Result<History> {
        let fold = tables.fold;
        let FoldGenerators {
            mut train,
            mut val,
            test,
        } = generators;

        info!("build model");
        let model = self.backend.build(ctx)?;
        let mut model = self.backend.compile(model, &self.compile_options)?;

        info!("train model for {} epochs", self.nr_epochs);
        let history = {
            let mut checkpoint = ModelCheckpoint::new(&self.trained_models_dir, fold);
            let mut curve_logger =
                CurveLogger::new(&self.trained_models_dir.join("events"), fold)?;
            let mut callbacks: [&mut dyn Callback; 2] = [&mut checkpoint, &mut curve_logger];
            fit::fit(
                &mut model,
                &mut train,
                &mut val,
                self.nr_epochs,
                &self.lr_scheduler,
                &mut callbacks,
            )?
        };

        save_json(
            &self
                .trained_models_dir
                .join(format!("train_info_{}.json", fold)),
            &history,
        )?;
        save_json(
            &self
                .trained_models_dir
                .join(format!("train_settings_{}.json", fold)),
            &self.compile_options,
        )?;

        let generators = [(Role::Train, &train), (Role::Val, &val), (Role::Test, &test)];
        for (role, generator) in generators {
            if generator.size() == 0 {
                warn!("the {} set is empty, skip evaluation", role);
                continue;
            }

            let StepOutput { loss, accuracy } =
                fit::evaluate(&mut model, generator, generator.length())?;
            info!(
                "evaluate {} set in {} steps\tloss: {:.5}\taccuracy: {:.5}",
                role,
                generator.length(),
                loss,
                accuracy
            );
        }

        self.predict_all(&mut model, tables)?;
        Ok(history)
    }

    /// Loads the model trained for the fold and saves its predictions.
    ///
    /// Exactly one checkpoint of the last epoch must exist for the fold.
    pub fn infer(&mut self, ctx: &mut ExecutionContext, tables: &FoldTables) -> Result<PathBuf> {
        let fold = tables.fold;
        let nr_epochs = self.nr_epochs;

        let checkpoint_file = discover_checkpoint(&self.trained_models_dir, fold, nr_epochs)?
            .into_exactly_one()
            .with_context(|| {
                format!(
                    "failed to find the checkpoint of fold {} at epoch {} in '{}'",
                    fold,
                    nr_epochs,
                    self.trained_models_dir.display()
                )
            })?;
        info!("load checkpoint {}", checkpoint_file.display());

        let custom_objects = CustomObjects::for_pooling(self.compile_options.pooling_operator)?;
        let model = self.backend.load(ctx, &checkpoint_file, &custom_objects)?;
        let mut model = self.backend.compile(model, &self.compile_options)?;

        self.predict_all(&mut model, tables)?;
        Ok(checkpoint_file)
    }

    fn predict_all(&self, model: &mut B::Model, tables: &FoldTables) -> Result<()> {
        for role in Role::ALL {
            let table = match role {
                Role::Train => &tables.train,
                Role::Val => &tables.val,
                Role::Test => &tables.test,
            };
            self.predictor.predict_and_save(model, table, role, tables.fold)?;
        }
        Ok(())
    }
}
