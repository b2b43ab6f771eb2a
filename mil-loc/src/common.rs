pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use derivative::Derivative;
pub use indexmap::{IndexMap, IndexSet};
pub use itertools::{izip, Itertools as _};
pub use log::{debug, info, warn};
pub use ndarray::{Array2, Array3, Axis};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    collections::{HashMap, HashSet},
    fmt,
    fmt::Debug,
    fs,
    num::NonZeroUsize,
    ops::Range,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
pub use tch::{nn, Device, IndexOp, Kind, Tensor};
