//! Data logging toolkit.

use crate::{
    common::*,
    fit::{Callback, EpochLogs},
};

/// Writes the per-epoch training curves of a fold as TensorBoard scalars.
#[derive(Debug)]
pub struct CurveLogger {
    fold: usize,
    event_writer: EventWriter<BufWriter<File>>,
}

impl CurveLogger {
    /// Creates the event file under `<event_dir>/CV_<fold>/`.
    pub fn new(event_dir: &Path, fold: usize) -> Result<Self> {
        let fold_dir = event_dir.join(format!("CV_{}", fold));
        fs::create_dir_all(&fold_dir)
            .with_context(|| format!("failed to create directory '{}'", fold_dir.display()))?;

        let event_path_prefix = fold_dir
            .join("mil-loc")
            .into_os_string()
            .into_string()
            .map_err(|path| format_err!("the path '{:?}' is not valid UTF-8", path))?;
        let event_writer =
            EventWriter::from_prefix(event_path_prefix, "", EventWriterConfig::default())?;

        Ok(Self { fold, event_writer })
    }
}

impl Callback for CurveLogger {
    fn on_epoch_end(&mut self, _model: &dyn TrainableModel, logs: &EpochLogs) -> Result<()> {
        let EpochLogs {
            epoch,
            lr,
            loss,
            accuracy,
            val_loss,
            val_accuracy,
        } = *logs;
        let step = epoch as i64;
        let fold = self.fold;

        let scalars = [
            ("loss/train", loss),
            ("loss/validation", val_loss),
            ("accuracy/train", accuracy),
            ("accuracy/validation", val_accuracy),
            ("params/learning_rate", lr),
        ];
        for (tag, value) in scalars {
            self.event_writer
                .write_scalar(format!("CV_{}/{}", fold, tag), step, value as f32)?;
        }

        Ok(())
    }
}

/// Serializes the value to a pretty JSON file.
pub fn save_json<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}
