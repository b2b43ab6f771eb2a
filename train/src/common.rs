//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use chrono::Local;
pub use itertools::Itertools as _;
pub use mil_loc::{
    batch::{Batch, BatchGenerator, BatchGeneratorInit},
    dataset::{load_instance_table, FoldSplitter, FoldTables, InstanceRecord, InstanceTable},
    loss::{CustomObjects, PoolingOperator},
    model::{
        CompileOptions, ExecutionContext, ModelBackend, StepOutput, TorchScriptBackend,
        TrainableModel,
    },
    processor::{FileImageLoader, ImageLoader, NormFn, ResizeMode},
};
pub use ndarray::Array4;
pub use noisy_float::prelude::*;
pub use serde::{Deserialize, Serialize};
pub use std::{
    fmt::{self, Debug, Display},
    fs,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
pub use tch::{Device, Kind, Tensor};
pub use tfrecord::{EventWriter, EventWriterConfig};
pub use tracing::{debug, info, info_span, warn};
