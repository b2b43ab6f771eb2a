use crate::{common::*, config::LearningRateSchedule};

/// Maps epoch indices to learning rates.
#[derive(Debug, Clone)]
pub enum LrScheduler {
    Constant { lr: R64 },
    StepWise { steps: Vec<(usize, R64)> },
}

impl LrScheduler {
    pub fn new(config: &LearningRateSchedule) -> Result<Self> {
        let scheduler = match *config {
            LearningRateSchedule::Constant { lr } => {
                ensure!(lr > 0.0, "the lr must be positive");
                Self::Constant { lr }
            }
            LearningRateSchedule::StepWise { ref steps } => {
                ensure!(
                    !steps.is_empty() && steps[0].0 == 0,
                    "the steps must start from zero"
                );

                steps.iter().try_fold(None, |prev_epoch, (curr_epoch, lr)| {
                    if let Some(prev_epoch) = prev_epoch {
                        ensure!(curr_epoch > prev_epoch, "the steps must be monotonic");
                    }
                    ensure!(lr.raw() > 0.0, "lr must be positive");
                    Ok(Some(curr_epoch))
                })?;

                Self::StepWise {
                    steps: steps.clone(),
                }
            }
        };

        Ok(scheduler)
    }

    /// The learning rate of the 0-based epoch.
    pub fn lr(&self, epoch: usize) -> f64 {
        match self {
            Self::Constant { lr } => lr.raw(),
            Self::StepWise { steps } => {
                let index = match steps.binary_search_by_key(&epoch, |(start, _lr)| *start) {
                    Ok(index) => index,
                    Err(index) => index.saturating_sub(1),
                };
                steps[index].1.raw()
            }
        }
    }
}
