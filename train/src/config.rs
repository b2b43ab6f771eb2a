//! Training program configuration format.

use crate::common::*;

pub use cross_validation::*;
pub use dataset::*;
pub use training::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub cross_validation: CrossValidationConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let TrainingConfig {
            nr_epochs,
            lr,
            reg_weight,
            batch_size,
            test_batch_size,
            image_size,
            box_size,
            ref lr_schedule,
            ..
        } = self.training;

        ensure!(nr_epochs > 0, "nr_epochs must be positive");
        ensure!(lr > 0.0, "lr must be positive");
        ensure!(reg_weight >= 0.0, "reg_weight must be non-negative");
        ensure!(batch_size > 0, "batch_size must be positive");
        ensure!(test_batch_size > 0, "test_batch_size must be positive");
        ensure!(image_size > 0, "image_size must be positive");
        ensure!(box_size > 0, "box_size must be positive");
        if let Some(LearningRateSchedule::StepWise { steps }) = lr_schedule {
            ensure!(!steps.is_empty(), "the lr schedule must not be empty");
        }

        ensure!(
            !self.dataset.positive_only || self.dataset.class_name.is_some(),
            "positive_only requires class_name"
        );

        let CrossValidationConfig {
            num_splits,
            val_ratio,
            ..
        } = self.cross_validation;
        ensure!(num_splits >= 2, "num_splits must be at least 2");
        ensure!(
            val_ratio > 0.0 && val_ratio < 1.0,
            "val_ratio must be in range (0, 1)"
        );

        Ok(())
    }

    /// The directory `<results_dir>/<dataset>/<pooling operator>/CV`.
    pub fn cv_dir(&self) -> PathBuf {
        self.logging
            .results_dir
            .join(&self.dataset.name)
            .join(self.training.pooling_operator.name())
            .join("CV")
    }

    /// The directory where checkpoints, histories and curves are written.
    pub fn trained_models_dir(&self) -> PathBuf {
        self.cv_dir().join("trained_models")
    }

    /// The directory where prediction arrays are written.
    pub fn predictions_dir(&self) -> PathBuf {
        self.cv_dir().join("predictions")
    }
}

/// The model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// The TorchScript module that provides the network, the pooling losses
    /// and the accuracy function.
    pub module_file: PathBuf,
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub results_dir: PathBuf,
}

mod dataset {
    use super::*;

    /// Dataset options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// The dataset name used in result paths.
        pub name: String,
        /// If set, only this label channel is kept.
        pub class_name: Option<String>,
        /// Drop the rows without a positive cell in the `class_name` channel.
        #[serde(default)]
        pub positive_only: bool,
        /// If set, images are stored at the network input size.
        #[serde(default)]
        pub resized_images: bool,
        #[serde(default)]
        pub resize_mode: ResizeMode,
        /// The dataset configuration.
        pub kind: DatasetKind,
    }

    /// Variants of dataset and options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum DatasetKind {
        /// Chest X-ray dataset options.
        Xray {
            image_dir: PathBuf,
            label_file: PathBuf,
        },
        /// PASCAL VOC dataset options.
        Pascal {
            image_dir: PathBuf,
            label_file: PathBuf,
        },
        /// MURA dataset options. The test set is fixed.
        Mura {
            image_dir: PathBuf,
            train_label_file: PathBuf,
            test_label_file: PathBuf,
        },
    }

    impl DatasetKind {
        pub fn image_dir(&self) -> &Path {
            match self {
                Self::Xray { image_dir, .. } => image_dir,
                Self::Pascal { image_dir, .. } => image_dir,
                Self::Mura { image_dir, .. } => image_dir,
            }
        }
    }
}

mod cross_validation {
    use super::*;

    /// Fold splitting options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CrossValidationConfig {
        #[serde(default = "default_num_splits")]
        pub num_splits: usize,
        #[serde(default = "default_split_seed")]
        pub seed: u64,
        /// The fraction of the non-test rows held out for validation.
        #[serde(default = "default_val_ratio")]
        pub val_ratio: R64,
        /// Keep rows of the same image in the same partition.
        #[serde(default)]
        pub group_by_image: bool,
    }

    impl Default for CrossValidationConfig {
        fn default() -> Self {
            Self {
                num_splits: default_num_splits(),
                seed: default_split_seed(),
                val_ratio: default_val_ratio(),
                group_by_image: false,
            }
        }
    }

    fn default_num_splits() -> usize {
        5
    }

    fn default_split_seed() -> u64 {
        1
    }

    fn default_val_ratio() -> R64 {
        r64(0.1)
    }
}

mod training {
    use super::*;

    /// The training options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TrainingConfig {
        /// Train new models if set, otherwise load the trained ones and predict.
        pub train_mode: bool,
        pub nr_epochs: usize,
        pub lr: R64,
        /// The weight decay of the optimizer.
        pub reg_weight: R64,
        pub pooling_operator: PoolingOperator,
        #[serde(default = "default_batch_size")]
        pub batch_size: usize,
        /// The batch size at prediction time.
        #[serde(default = "default_test_batch_size")]
        pub test_batch_size: usize,
        /// The network input height and width.
        #[serde(default = "default_image_size")]
        pub image_size: usize,
        /// The height and width of the patch grid.
        #[serde(default = "default_box_size")]
        pub box_size: usize,
        /// Learning rate scheduling strategy. It defaults to the constant `lr`.
        pub lr_schedule: Option<LearningRateSchedule>,
        /// The seed of batch shuffling and backend initialization.
        pub shuffle_seed: Option<u64>,
        #[serde(with = "tch_serde::serde_device", default = "default_device")]
        pub device: Device,
    }

    impl TrainingConfig {
        pub fn lr_schedule(&self) -> LearningRateSchedule {
            self.lr_schedule
                .clone()
                .unwrap_or(LearningRateSchedule::Constant { lr: self.lr })
        }

        pub fn compile_options(&self) -> CompileOptions {
            CompileOptions {
                lr: self.lr.raw(),
                reg_weight: self.reg_weight.raw(),
                pooling_operator: self.pooling_operator,
            }
        }
    }

    /// The learning rate scheduling strategy.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LearningRateSchedule {
        /// Use constant learning rate.
        Constant { lr: R64 },
        /// Use specific learning rate starting from specified epochs.
        StepWise { steps: Vec<(usize, R64)> },
    }

    fn default_batch_size() -> usize {
        10
    }

    fn default_test_batch_size() -> usize {
        1
    }

    fn default_image_size() -> usize {
        512
    }

    fn default_box_size() -> usize {
        16
    }

    fn default_device() -> Device {
        Device::cuda_if_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG_TEXT: &str = r#"
    {
        dataset: {
            name: "Xray",
            class_name: "Cardiomegaly",
            kind: {
                type: "Xray",
                image_dir: "/data/xray/images",
                label_file: "/data/xray/labels.csv",
            },
        },
        model: { module_file: "model.pt" },
        training: {
            train_mode: true,
            nr_epochs: 2,
            lr: 0.001,
            reg_weight: 0.0001,
            pooling_operator: "lse01",
        },
        logging: { results_dir: "/tmp/results" },
    }
    "#;

    #[test]
    fn parse_config_defaults_test() -> Result<()> {
        let config: Config = json5::from_str(CONFIG_TEXT)?;
        config.validate()?;

        assert_eq!(config.cross_validation.num_splits, 5);
        assert_eq!(config.cross_validation.seed, 1);
        assert_eq!(config.training.batch_size, 10);
        assert_eq!(config.training.test_batch_size, 1);
        assert_eq!(config.training.image_size, 512);
        assert_eq!(config.training.box_size, 16);
        assert_eq!(config.dataset.resize_mode, ResizeMode::Interpolate);
        assert!(!config.dataset.positive_only);
        assert_eq!(
            config.training.pooling_operator,
            PoolingOperator::NormalizedLogSumExp
        );
        assert!(matches!(
            config.training.lr_schedule(),
            LearningRateSchedule::Constant { lr } if lr == 0.001
        ));
        assert_eq!(
            config.trained_models_dir(),
            Path::new("/tmp/results/Xray/lse01/CV/trained_models")
        );
        assert_eq!(
            config.predictions_dir(),
            Path::new("/tmp/results/Xray/lse01/CV/predictions")
        );
        Ok(())
    }

    #[test]
    fn reject_invalid_config_test() -> Result<()> {
        let mut config: Config = json5::from_str(CONFIG_TEXT)?;
        config.training.nr_epochs = 0;
        assert!(config.validate().is_err());

        let mut config: Config = json5::from_str(CONFIG_TEXT)?;
        config.cross_validation.val_ratio = r64(1.0);
        assert!(config.validate().is_err());

        let mut config: Config = json5::from_str(CONFIG_TEXT)?;
        config.dataset.class_name = None;
        config.dataset.positive_only = true;
        assert!(config.validate().is_err());
        Ok(())
    }
}
