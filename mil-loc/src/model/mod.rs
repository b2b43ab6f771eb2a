//! The trainable model contract and its TorchScript implementation.

mod context;
mod torch_script;

pub use context::*;
pub use torch_script::*;

use crate::{batch::Batch, common::*, loss::CustomObjects, loss::PoolingOperator};

/// The loss and accuracy of one optimization or evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub loss: f64,
    pub accuracy: f64,
}

/// Options applied when compiling a model for training or inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub lr: f64,
    pub reg_weight: f64,
    pub pooling_operator: PoolingOperator,
}

impl CompileOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.lr > 0.0, "lr must be positive");
        ensure!(self.reg_weight >= 0.0, "reg_weight must be non-negative");
        Ok(())
    }
}

/// A model that can be optimized, evaluated and persisted.
pub trait TrainableModel {
    /// Runs forward and backward passes on a batch and updates the parameters.
    fn train_step(&mut self, batch: &Batch) -> Result<StepOutput>;

    /// Computes the loss and accuracy on a batch without updating the parameters.
    fn test_step(&mut self, batch: &Batch) -> Result<StepOutput>;

    /// Computes patch predictions of shape `(batch, box_size, box_size, channels)`.
    fn predict(&mut self, images: &Tensor) -> Result<Tensor>;

    /// Sets the optimizer learning rate.
    fn set_lr(&mut self, lr: f64) -> Result<()>;

    /// Writes a full snapshot of the parameters.
    fn save(&self, path: &Path) -> Result<()>;
}

/// Creates and restores models within an execution context.
pub trait ModelBackend {
    type Model: TrainableModel;

    /// Builds a fresh model. It occupies the context's model slot.
    fn build(&mut self, ctx: &mut ExecutionContext) -> Result<Self::Model>;

    /// Attaches the optimizer, loss and accuracy functions.
    fn compile(&mut self, model: Self::Model, options: &CompileOptions) -> Result<Self::Model>;

    /// Restores a model from a checkpoint. It occupies the context's model slot.
    fn load(
        &mut self,
        ctx: &mut ExecutionContext,
        path: &Path,
        custom_objects: &CustomObjects,
    ) -> Result<Self::Model>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_options_validate_test() {
        let options = CompileOptions {
            lr: 0.001,
            reg_weight: 0.0,
            pooling_operator: PoolingOperator::LogSumExp,
        };
        assert!(options.validate().is_ok());

        let mut invalid = options.clone();
        invalid.lr = 0.0;
        assert!(invalid.validate().is_err());

        let mut invalid = options;
        invalid.reg_weight = -0.1;
        assert!(invalid.validate().is_err());
    }
}
