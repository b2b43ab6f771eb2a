use crate::common::*;

/// The process-wide model execution state.
///
/// At most one model is active at a time. A backend acquires the slot when it
/// builds or loads a model, and the slot is released only by [reset](Self::reset).
#[derive(Debug)]
pub struct ExecutionContext {
    device: Device,
    seed: Option<u64>,
    generation: usize,
    active: bool,
}

impl ExecutionContext {
    pub fn new(device: Device, seed: Option<u64>) -> Self {
        Self {
            device,
            seed,
            generation: 0,
            active: false,
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// The number of resets so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Clears the model slot and re-seeds the backend random generator.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.active = false;
        if let Some(seed) = self.seed {
            tch::manual_seed(seed as i64);
        }
        debug!("execution context reset, generation {}", self.generation);
    }

    /// Occupies the model slot.
    pub fn acquire(&mut self) -> Result<()> {
        ensure!(
            !self.active,
            "a model is already active in generation {}, reset the context before building another",
            self.generation
        );
        self.active = true;
        Ok(())
    }
}
