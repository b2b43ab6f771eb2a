//! The epoch training loop.

use crate::{
    common::*,
    utils::{LrScheduler, RateCounter},
};

/// The per-epoch metric values of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub loss: Vec<f64>,
    pub accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_accuracy: Vec<f64>,
    pub lr: Vec<f64>,
}

impl History {
    pub fn push(&mut self, logs: &EpochLogs) {
        self.loss.push(logs.loss);
        self.accuracy.push(logs.accuracy);
        self.val_loss.push(logs.val_loss);
        self.val_accuracy.push(logs.val_accuracy);
        self.lr.push(logs.lr);
    }

    pub fn num_epochs(&self) -> usize {
        self.loss.len()
    }
}

/// The summary of one finished epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLogs {
    /// The 0-based epoch index.
    pub epoch: usize,
    pub lr: f64,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Hooks invoked by [fit] after every epoch.
pub trait Callback {
    fn on_epoch_end(&mut self, model: &dyn TrainableModel, logs: &EpochLogs) -> Result<()>;
}

/// The running mean of step outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    loss: f64,
    accuracy: f64,
    steps: usize,
}

impl Metrics {
    pub fn add(&mut self, output: StepOutput) {
        self.loss += output.loss;
        self.accuracy += output.accuracy;
        self.steps += 1;
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn mean(&self) -> Result<StepOutput> {
        ensure!(self.steps > 0, "no step was run");
        let steps = self.steps as f64;
        Ok(StepOutput {
            loss: self.loss / steps,
            accuracy: self.accuracy / steps,
        })
    }
}

/// Trains the model for `nr_epochs` epochs and validates it after each one.
///
/// Every batch of the generators is visited once per epoch, including the
/// overlapping last batch.
pub fn fit<M>(
    model: &mut M,
    train: &mut BatchGenerator,
    val: &mut BatchGenerator,
    nr_epochs: usize,
    lr_scheduler: &LrScheduler,
    callbacks: &mut [&mut dyn Callback],
) -> Result<History>
where
    M: TrainableModel,
{
    ensure!(nr_epochs > 0, "nr_epochs must be positive");
    info!(
        "train on {} instances in {} steps, validate on {} instances in {} steps",
        train.size(),
        train.length(),
        val.size(),
        val.length()
    );

    let mut history = History::default();

    for epoch in 0..nr_epochs {
        let lr = lr_scheduler.lr(epoch);
        model.set_lr(lr)?;

        let mut metrics = Metrics::default();
        let mut rate_counter = RateCounter::with_second_interval();

        for index in 0..train.length() {
            let batch = train.get_batch(index)?;
            let output = model.train_step(&batch)?;
            metrics.add(output);
            debug!(
                "epoch: {}\tstep: {}\tloss: {:.5}\taccuracy: {:.5}",
                epoch + 1,
                index,
                output.loss,
                output.accuracy
            );

            rate_counter.add(1.0);
            if let Some(batch_rate) = rate_counter.rate() {
                let record_rate = batch_rate * train.batch_size() as f64;
                info!(
                    "epoch: {}\tstep: {}/{}\tlr: {:.5}\t{:.2} batches/s\t{:.2} records/s",
                    epoch + 1,
                    index + 1,
                    train.length(),
                    lr,
                    batch_rate,
                    record_rate
                );
            }
        }

        let StepOutput { loss, accuracy } = metrics.mean()?;
        let StepOutput {
            loss: val_loss,
            accuracy: val_accuracy,
        } = evaluate(model, val, val.length())?;

        let logs = EpochLogs {
            epoch,
            lr,
            loss,
            accuracy,
            val_loss,
            val_accuracy,
        };
        info!(
            "epoch {}/{}\tloss: {:.5}\taccuracy: {:.5}\tval_loss: {:.5}\tval_accuracy: {:.5}",
            epoch + 1,
            nr_epochs,
            loss,
            accuracy,
            val_loss,
            val_accuracy
        );

        history.push(&logs);
        for callback in callbacks.iter_mut() {
            callback.on_epoch_end(&*model, &logs)?;
        }

        train.on_epoch_end();
        val.on_epoch_end();
    }

    Ok(history)
}

/// Averages the loss and accuracy over the first `steps` batches.
pub fn evaluate<M>(model: &mut M, generator: &BatchGenerator, steps: usize) -> Result<StepOutput>
where
    M: TrainableModel + ?Sized,
{
    ensure!(
        steps > 0 && steps <= generator.length(),
        "cannot evaluate {} steps on a generator of {} batches",
        steps,
        generator.length()
    );

    let mut metrics = Metrics::default();
    for index in 0..steps {
        let batch = generator.get_batch(index)?;
        metrics.add(model.test_step(&batch)?);
    }
    metrics.mean()
}
