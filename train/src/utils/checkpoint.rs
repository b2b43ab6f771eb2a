use crate::{
    common::*,
    fit::{Callback, EpochLogs},
};

/// The file name of the checkpoint saved after the 1-based `epoch`.
pub fn checkpoint_file_name(fold: usize, epoch: usize, val_loss: f64) -> String {
    format!("{}{:.2}.ckpt", checkpoint_prefix(fold, epoch), val_loss)
}

/// The file name prefix shared by the checkpoints of a fold at the 1-based `epoch`.
///
/// The trailing `-` keeps epoch 10 from matching the prefix of epoch 1.
pub fn checkpoint_prefix(fold: usize, epoch: usize) -> String {
    format!("CV_{}_epoch-{:02}-", fold, epoch)
}

/// The outcome of a checkpoint file lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointDiscovery {
    ExactlyOne(PathBuf),
    NotFound,
    Ambiguous(Vec<PathBuf>),
}

impl CheckpointDiscovery {
    /// Returns the unique checkpoint, or fails if there is none or more than one.
    pub fn into_exactly_one(self) -> Result<PathBuf> {
        match self {
            Self::ExactlyOne(path) => Ok(path),
            Self::NotFound => bail!("no matching checkpoint file found"),
            Self::Ambiguous(paths) => bail!(
                "{} checkpoint files match, refuse to choose one of them: {}",
                paths.len(),
                paths.iter().map(|path| path.display()).join(", ")
            ),
        }
    }
}

/// Looks up the checkpoint of `fold` written at the last of `nr_epochs` epochs.
pub fn discover_checkpoint(
    checkpoint_dir: &Path,
    fold: usize,
    nr_epochs: usize,
) -> Result<CheckpointDiscovery> {
    ensure!(
        checkpoint_dir.is_dir(),
        "the checkpoint directory '{}' does not exist",
        checkpoint_dir.display()
    );

    let pattern = format!(
        "{}/{}*.ckpt",
        glob::Pattern::escape(&checkpoint_dir.display().to_string()),
        glob::Pattern::escape(&checkpoint_prefix(fold, nr_epochs))
    );
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)?.try_collect()?;
    paths.sort();

    let discovery = match paths.len() {
        0 => CheckpointDiscovery::NotFound,
        1 => CheckpointDiscovery::ExactlyOne(paths.remove(0)),
        _ => CheckpointDiscovery::Ambiguous(paths),
    };
    Ok(discovery)
}

/// Saves the model after every epoch.
#[derive(Debug, Clone)]
pub struct ModelCheckpoint {
    checkpoint_dir: PathBuf,
    fold: usize,
}

impl ModelCheckpoint {
    pub fn new(checkpoint_dir: impl AsRef<Path>, fold: usize) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.as_ref().to_owned(),
            fold,
        }
    }
}

impl Callback for ModelCheckpoint {
    fn on_epoch_end(&mut self, model: &dyn TrainableModel, logs: &EpochLogs) -> Result<()> {
        let file_name = checkpoint_file_name(self.fold, logs.epoch + 1, logs.val_loss);
        let path = self.checkpoint_dir.join(file_name);
        model
            .save(&path)
            .with_context(|| format!("failed to save checkpoint '{}'", path.display()))?;
        info!("saved checkpoint {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_name_test() {
        assert_eq!(checkpoint_file_name(0, 3, 0.4567), "CV_0_epoch-03-0.46.ckpt");
        assert_eq!(checkpoint_file_name(4, 12, 1.0), "CV_4_epoch-12-1.00.ckpt");
        assert_eq!(checkpoint_prefix(2, 9), "CV_2_epoch-09-");
        assert_eq!(checkpoint_prefix(2, 100), "CV_2_epoch-100-");
    }

    #[test]
    fn discover_checkpoint_test() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let touch = |name: &str| fs::write(dir.path().join(name), b"");

        touch("CV_0_epoch-01-0.90.ckpt")?;
        touch("CV_0_epoch-02-0.70.ckpt")?;
        touch("CV_1_epoch-02-0.80.ckpt")?;
        touch("CV_1_epoch-02-0.75.ckpt")?;
        touch("CV_2_epoch-20-0.10.ckpt")?;

        assert_eq!(
            discover_checkpoint(dir.path(), 0, 2)?,
            CheckpointDiscovery::ExactlyOne(dir.path().join("CV_0_epoch-02-0.70.ckpt"))
        );
        assert_eq!(
            discover_checkpoint(dir.path(), 1, 2)?,
            CheckpointDiscovery::Ambiguous(vec![
                dir.path().join("CV_1_epoch-02-0.75.ckpt"),
                dir.path().join("CV_1_epoch-02-0.80.ckpt"),
            ])
        );
        assert_eq!(
            discover_checkpoint(dir.path(), 2, 2)?,
            CheckpointDiscovery::NotFound
        );
        assert_eq!(
            discover_checkpoint(dir.path(), 3, 2)?,
            CheckpointDiscovery::NotFound
        );

        assert!(discover_checkpoint(dir.path(), 0, 2)?
            .into_exactly_one()
            .is_ok());
        assert!(discover_checkpoint(dir.path(), 1, 2)?
            .into_exactly_one()
            .is_err());
        assert!(discover_checkpoint(dir.path(), 2, 2)?
            .into_exactly_one()
            .is_err());
        Ok(())
    }

    #[test]
    fn missing_checkpoint_dir_test() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(discover_checkpoint(&dir.path().join("missing"), 0, 1).is_err());
        Ok(())
    }
}
