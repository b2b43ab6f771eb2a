//! Dataset loading.

use crate::{
    common::*,
    config::{DatasetConfig, DatasetKind},
};

/// The instance tables of a dataset.
#[derive(Debug, Clone)]
pub enum DatasetTables {
    /// Each fold takes its test set from the table.
    KFold(InstanceTable),
    /// The folds split the train/validation table and share the test table.
    PresetTest {
        train_val: InstanceTable,
        test: InstanceTable,
    },
}

impl DatasetTables {
    /// Loads the label files of the dataset and applies the class selection.
    ///
    /// Rows without a positive cell in the selected class are kept unless
    /// `positive_only` is set.
    pub fn load(config: &DatasetConfig) -> Result<Self> {
        let prepare_table = |table: InstanceTable| -> Result<InstanceTable> {
            let class_name = match config.class_name.as_deref() {
                Some(class_name) => class_name,
                None => return Ok(table),
            };
            let table = table.select_channels(&[class_name])?;
            if config.positive_only {
                table.filter_on_channel(class_name)
            } else {
                Ok(table)
            }
        };

        let tables = match &config.kind {
            DatasetKind::Xray { label_file, .. } | DatasetKind::Pascal { label_file, .. } => {
                let table = prepare_table(load_instance_table(label_file)?)?;
                info!(
                    "loaded {} instances from '{}'",
                    table.len(),
                    label_file.display()
                );
                Self::KFold(table)
            }
            DatasetKind::Mura {
                train_label_file,
                test_label_file,
                ..
            } => {
                let train_val = prepare_table(load_instance_table(train_label_file)?)?;
                let test = prepare_table(load_instance_table(test_label_file)?)?;
                info!(
                    "loaded {} train/validation instances from '{}' and {} test instances from '{}'",
                    train_val.len(),
                    train_label_file.display(),
                    test.len(),
                    test_label_file.display()
                );
                ensure!(
                    train_val.channels() == test.channels()
                        && train_val.box_size() == test.box_size(),
                    "the train and test label files have different channels or box sizes"
                );
                Self::PresetTest { train_val, test }
            }
        };

        Ok(tables)
    }

    /// Builds the train, validation and test tables of a fold.
    pub fn split(&self, splitter: &FoldSplitter, fold: usize) -> Result<FoldTables> {
        match self {
            Self::KFold(table) => splitter.split(table, fold),
            Self::PresetTest { train_val, test } => splitter.split_with_test(train_val, test, fold),
        }
    }

    pub fn box_size(&self) -> usize {
        match self {
            Self::KFold(table) => table.box_size(),
            Self::PresetTest { train_val, .. } => train_val.box_size(),
        }
    }
}

/// Creates the image loader of the dataset.
pub fn image_loader(config: &DatasetConfig) -> FileImageLoader {
    FileImageLoader::new(
        config.kind.image_dir(),
        config.resize_mode,
        config.resized_images,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_label_file(dir: &Path, name: &str, rows: &[(&str, &str, &str)]) -> Result<PathBuf> {
        let path = dir.join(name);
        let mut file = File::create(&path)?;
        writeln!(file, "image,Mass,Nodule")?;
        for (image, mass, nodule) in rows {
            writeln!(file, "{},{},{}", image, mass, nodule)?;
        }
        Ok(path)
    }

    fn dataset_config(kind: DatasetKind, class_name: Option<&str>) -> DatasetConfig {
        DatasetConfig {
            name: "test".into(),
            class_name: class_name.map(ToOwned::to_owned),
            positive_only: false,
            resized_images: false,
            resize_mode: ResizeMode::Interpolate,
            kind,
        }
    }

    #[test]
    fn load_k_fold_with_class_test() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let label_file = write_label_file(
            dir.path(),
            "labels.csv",
            &[
                ("0.png", "0 0 0 1", "0 0 0 0"),
                ("1.png", "0 0 0 0", "1 1 0 0"),
                ("2.png", "1 0 0 0", "0 0 0 0"),
            ],
        )?;
        let mut config = dataset_config(
            DatasetKind::Xray {
                image_dir: dir.path().to_owned(),
                label_file,
            },
            Some("Mass"),
        );

        let images = |config: &DatasetConfig| -> Result<Vec<String>> {
            let table = match DatasetTables::load(config)? {
                DatasetTables::KFold(table) => table,
                _ => bail!("expect a k-fold dataset"),
            };
            assert_eq!(table.num_channels(), 1);
            assert_eq!(table.box_size(), 2);
            Ok(table.iter().map(|record| record.image.clone()).collect())
        };

        // negative rows stay by default
        assert_eq!(images(&config)?, vec!["0.png", "1.png", "2.png"]);

        config.positive_only = true;
        assert_eq!(images(&config)?, vec!["0.png", "2.png"]);
        Ok(())
    }

    #[test]
    fn load_preset_test_split_test() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let train_rows: Vec<_> = (0..10)
            .map(|index| (format!("train_{}.png", index), "1 0 0 0", "0 0 0 0"))
            .collect();
        let train_rows: Vec<_> = train_rows
            .iter()
            .map(|(image, mass, nodule)| (image.as_str(), *mass, *nodule))
            .collect();
        let train_label_file = write_label_file(dir.path(), "train.csv", &train_rows)?;
        let test_label_file = write_label_file(
            dir.path(),
            "test.csv",
            &[
                ("test_0.png", "0 1 0 0", "0 0 0 0"),
                ("test_1.png", "0 0 0 0", "0 0 1 0"),
            ],
        )?;
        let config = dataset_config(
            DatasetKind::Mura {
                image_dir: dir.path().to_owned(),
                train_label_file,
                test_label_file,
            },
            Some("Mass"),
        );

        let tables = DatasetTables::load(&config)?;
        let splitter = FoldSplitter::new(5, 1, r64(0.1), false)?;
        let FoldTables {
            train, val, test, ..
        } = tables.split(&splitter, 0)?;

        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(test.len(), 2);
        assert_eq!(test.records()[0].image, "test_0.png");
        assert_eq!(test.num_channels(), 1);
        Ok(())
    }

    #[test]
    fn missing_class_test() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let label_file =
            write_label_file(dir.path(), "labels.csv", &[("0.png", "0 0 0 1", "0 0 0 0")])?;
        let config = dataset_config(
            DatasetKind::Pascal {
                image_dir: dir.path().to_owned(),
                label_file,
            },
            Some("Cardiomegaly"),
        );
        assert!(DatasetTables::load(&config).is_err());
        Ok(())
    }
}
