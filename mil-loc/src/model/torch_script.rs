use super::*;
use crate::{batch::Batch, common::*, loss::CustomObjects};
use tch::{nn::OptimizerConfig as _, TrainableCModule};

/// Builds models from a TorchScript module file.
///
/// The module provides the network in its `forward` method, taking images in
/// `(batch, height, width, 3)` layout and returning patch predictions in
/// `(batch, box_size, box_size, channels)` layout. It also exposes the loss
/// methods named by the pooling operator registry and the accuracy method,
/// each called as `method(labels, predictions)`.
#[derive(Debug, Clone)]
pub struct TorchScriptBackend {
    module_file: PathBuf,
}

impl TorchScriptBackend {
    pub fn new(module_file: impl AsRef<Path>) -> Result<Self> {
        let module_file = module_file.as_ref();
        ensure!(
            module_file.is_file(),
            "the module file '{}' does not exist",
            module_file.display()
        );
        Ok(Self {
            module_file: module_file.to_owned(),
        })
    }

    fn instantiate(&self, ctx: &mut ExecutionContext) -> Result<TorchScriptModel> {
        ensure!(!ctx.is_active(), "another model is active in the execution context");
        let device = ctx.device();
        let vs = nn::VarStore::new(device);
        let module = TrainableCModule::load(&self.module_file, vs.root()).with_context(|| {
            format!("failed to load module file '{}'", self.module_file.display())
        })?;
        ctx.acquire()?;

        Ok(TorchScriptModel {
            vs,
            module,
            optimizer: None,
            custom_objects: None,
            device,
        })
    }
}

impl ModelBackend for TorchScriptBackend {
    type Model = TorchScriptModel;

    fn build(&mut self, ctx: &mut ExecutionContext) -> Result<Self::Model> {
        info!("build model from '{}'", self.module_file.display());
        self.instantiate(ctx)
    }

    fn compile(&mut self, mut model: Self::Model, options: &CompileOptions) -> Result<Self::Model> {
        options.validate()?;
        let CompileOptions {
            lr,
            reg_weight,
            pooling_operator,
        } = *options;

        let optimizer = nn::Adam {
            wd: reg_weight,
            ..Default::default()
        }
        .build(&model.vs, lr)?;

        model.optimizer = Some(optimizer);
        model.custom_objects = Some(CustomObjects::for_pooling(pooling_operator)?);
        Ok(model)
    }

    fn load(
        &mut self,
        ctx: &mut ExecutionContext,
        path: &Path,
        custom_objects: &CustomObjects,
    ) -> Result<Self::Model> {
        info!("load model checkpoint '{}'", path.display());
        let mut model = self.instantiate(ctx)?;
        model
            .vs
            .load(path)
            .with_context(|| format!("failed to load checkpoint '{}'", path.display()))?;
        model.custom_objects = Some(custom_objects.clone());
        Ok(model)
    }
}

/// A model backed by a trainable TorchScript module.
#[derive(Debug)]
pub struct TorchScriptModel {
    vs: nn::VarStore,
    module: TrainableCModule,
    optimizer: Option<nn::Optimizer>,
    custom_objects: Option<CustomObjects>,
    device: Device,
}

impl TorchScriptModel {
    fn custom_objects(&self) -> Result<&CustomObjects> {
        self.custom_objects
            .as_ref()
            .ok_or_else(|| format_err!("the model is not compiled"))
    }

    fn forward(&self, images: &Tensor) -> Result<Tensor> {
        let output = self.module.forward_ts(&[images])?;
        Ok(output)
    }

    fn loss_and_accuracy(&self, labels: &Tensor, preds: &Tensor) -> Result<(Tensor, Tensor)> {
        let CustomObjects { loss, accuracy, .. } = *self.custom_objects()?;
        let loss = self.module.method_ts(loss, &[labels, preds])?;
        let accuracy = tch::no_grad(|| self.module.method_ts(accuracy, &[labels, preds]))?;
        Ok((loss, accuracy))
    }
}

impl TrainableModel for TorchScriptModel {
    fn train_step(&mut self, batch: &Batch) -> Result<StepOutput> {
        let images = batch.images.to_device(self.device);
        let labels = batch.labels.to_device(self.device);

        self.module.set_train();
        let preds = self.forward(&images)?;
        let (loss, accuracy) = self.loss_and_accuracy(&labels, &preds)?;

        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| format_err!("the model is not compiled"))?;
        optimizer.backward_step(&loss);

        Ok(StepOutput {
            loss: f64::from(&loss),
            accuracy: f64::from(&accuracy),
        })
    }

    fn test_step(&mut self, batch: &Batch) -> Result<StepOutput> {
        let images = batch.images.to_device(self.device);
        let labels = batch.labels.to_device(self.device);

        self.module.set_eval();
        let (loss, accuracy) = tch::no_grad(|| -> Result<_> {
            let preds = self.forward(&images)?;
            self.loss_and_accuracy(&labels, &preds)
        })?;

        Ok(StepOutput {
            loss: f64::from(&loss),
            accuracy: f64::from(&accuracy),
        })
    }

    fn predict(&mut self, images: &Tensor) -> Result<Tensor> {
        let images = images.to_device(self.device);
        self.module.set_eval();
        let preds = tch::no_grad(|| self.forward(&images))?;
        Ok(preds.to_device(Device::Cpu))
    }

    fn set_lr(&mut self, lr: f64) -> Result<()> {
        let optimizer = self
            .optimizer
            .as_mut()
            .ok_or_else(|| format_err!("the model is not compiled"))?;
        optimizer.set_lr(lr);
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.vs
            .save(path)
            .with_context(|| format!("failed to save checkpoint '{}'", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn missing_module_file_test() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let err = TorchScriptBackend::new(dir.path().join("missing.pt")).unwrap_err();
        assert!(format!("{}", err).contains("does not exist"));
        Ok(())
    }

    #[test]
    fn invalid_module_file_test() -> Result<()> {
        let mut module_file = tempfile::NamedTempFile::new()?;
        module_file.write_all(b"not a torchscript archive")?;
        module_file.flush()?;

        let mut backend = TorchScriptBackend::new(module_file.path())?;
        let mut ctx = ExecutionContext::new(Device::Cpu, Some(1));

        let err = backend.build(&mut ctx).unwrap_err();
        assert!(format!("{:#}", err).contains("failed to load module file"));
        assert!(!ctx.is_active());

        // the failed load leaves the slot free, an occupied slot is rejected
        ctx.acquire()?;
        let err = backend.build(&mut ctx).unwrap_err();
        assert!(format!("{:#}", err).contains("another model is active"));
        Ok(())
    }
}
