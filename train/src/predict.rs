//! Patch prediction and prediction artifacts.

use crate::{common::*, logging::save_json};
use derivative::Derivative;
use ndarray_npy::WriteNpyExt as _;

/// The partition a table plays in a fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Train,
    Val,
    Test,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Train, Self::Val, Self::Test];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The patch predictions of a table in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    /// Predictions in shape `(instances, box_size, box_size, channels)`.
    pub predictions: Array4<f32>,
    /// Labels in shape `(instances, box_size, box_size, channels)`.
    pub labels: Array4<f32>,
    pub image_ids: Vec<String>,
}

/// Runs batched prediction over tables and saves the results.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Predictor {
    pub batch_size: usize,
    pub net_h: usize,
    pub net_w: usize,
    pub box_size: usize,
    #[derivative(Debug = "ignore")]
    pub norm: Option<NormFn>,
    pub loader: Arc<dyn ImageLoader>,
    pub output_dir: PathBuf,
}

impl Predictor {
    /// Predicts every instance of the table exactly once.
    ///
    /// Returns `None` if the table is empty.
    pub fn predict<M>(&self, model: &mut M, table: &InstanceTable) -> Result<Option<Predictions>>
    where
        M: TrainableModel + ?Sized,
    {
        if table.is_empty() {
            return Ok(None);
        }

        let num_instances = table.len();
        let num_channels = table.num_channels();
        let box_size = self.box_size;
        let row_len = box_size * box_size * num_channels;

        let generator = BatchGeneratorInit {
            batch_size: self.batch_size.min(num_instances),
            shuffle: false,
            seed: None,
            norm: self.norm.clone(),
            net_h: self.net_h,
            net_w: self.net_w,
            box_size,
        }
        .build(table.clone(), self.loader.clone())?;

        let mut values: Vec<f32> = Vec::with_capacity(num_instances * row_len);
        let mut num_emitted = 0;

        for index in 0..generator.length() {
            let range = generator.batch_range(index)?;
            let batch = generator.get_batch(index)?;
            let output = model.predict(&batch.images)?;

            let expect_size = [
                range.len() as i64,
                box_size as i64,
                box_size as i64,
                num_channels as i64,
            ];
            ensure!(
                output.size() == expect_size,
                "expect prediction shape {:?}, but get {:?}",
                expect_size,
                output.size()
            );

            let output: Vec<f32> = Vec::from(
                &output
                    .to_device(Device::Cpu)
                    .to_kind(Kind::Float)
                    .contiguous(),
            );

            // the last batch overlaps rows that were already emitted
            let skip = num_emitted - range.start;
            values.extend_from_slice(&output[(skip * row_len)..]);
            num_emitted = range.end;
        }

        let predictions = Array4::from_shape_vec(
            (num_instances, box_size, box_size, num_channels),
            values,
        )?;
        let labels = Array4::from_shape_vec(
            (num_instances, box_size, box_size, num_channels),
            table
                .iter()
                .flat_map(|record| record.channel_last().into_raw_vec())
                .collect(),
        )?;
        let image_ids = table.iter().map(|record| record.image.clone()).collect();

        Ok(Some(Predictions {
            predictions,
            labels,
            image_ids,
        }))
    }

    /// Predicts the table and writes the prediction, label and image id files
    /// of the role and fold.
    pub fn predict_and_save<M>(
        &self,
        model: &mut M,
        table: &InstanceTable,
        role: Role,
        fold: usize,
    ) -> Result<()>
    where
        M: TrainableModel + ?Sized,
    {
        let Predictions {
            predictions,
            labels,
            image_ids,
        } = match self.predict(model, table)? {
            Some(predictions) => predictions,
            None => {
                warn!("the {} set of fold {} is empty, skip prediction", role, fold);
                return Ok(());
            }
        };
        info!(
            "predicted {} instances of the {} set, shape {:?}",
            image_ids.len(),
            role,
            predictions.shape()
        );

        let [predictions_path, labels_path, image_ids_path] =
            prediction_paths(&self.output_dir, role, fold);
        write_npy(&predictions_path, &predictions)?;
        write_npy(&labels_path, &labels)?;
        save_json(&image_ids_path, &image_ids)?;

        Ok(())
    }
}

/// The prediction, label and image id file paths of a role and fold.
pub fn prediction_paths(output_dir: &Path, role: Role, fold: usize) -> [PathBuf; 3] {
    [
        output_dir.join(format!("predictions_{}_set_CV{}.npy", role, fold)),
        output_dir.join(format!("patch_labels_{}_set_CV{}.npy", role, fold)),
        output_dir.join(format!("image_indices_{}_set_CV{}.json", role, fold)),
    ]
}

fn write_npy(path: &Path, array: &Array4<f32>) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create '{}'", path.display()))?;
    array
        .write_npy(BufWriter::new(file))
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}
