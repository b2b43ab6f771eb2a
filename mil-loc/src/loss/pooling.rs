use crate::common::*;

/// The pooling operator aggregating patch predictions into an image-level score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolingOperator {
    #[serde(rename = "nor")]
    Normal,
    #[serde(rename = "lse")]
    LogSumExp,
    #[serde(rename = "lse01")]
    NormalizedLogSumExp,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "mean")]
    Mean,
}

impl PoolingOperator {
    pub const ALL: [Self; 5] = [
        Self::Normal,
        Self::LogSumExp,
        Self::NormalizedLogSumExp,
        Self::Max,
        Self::Mean,
    ];

    /// The short name used in configuration files and result paths.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "nor",
            Self::LogSumExp => "lse",
            Self::NormalizedLogSumExp => "lse01",
            Self::Max => "max",
            Self::Mean => "mean",
        }
    }
}

impl fmt::Display for PoolingOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PoolingOperator {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name() == name)
            .ok_or_else(|| {
                format_err!(
                    "unknown pooling operator '{}', expect one of {}",
                    name,
                    Self::ALL.iter().map(|op| op.name()).join(", ")
                )
            })
    }
}

/// The loss function registered for each pooling operator.
const LOSS_FUNCTIONS: [(PoolingOperator, &str); 5] = [
    (PoolingOperator::Normal, "loss_nor"),
    (PoolingOperator::LogSumExp, "loss_lse"),
    (PoolingOperator::NormalizedLogSumExp, "loss_lse01"),
    (PoolingOperator::Max, "loss_max"),
    (PoolingOperator::Mean, "loss_mean"),
];

/// The accuracy function shared by all pooling operators.
pub const ACCURACY_FUNCTION: &str = "accuracy";

/// The custom functions a persisted model refers to by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomObjects {
    pub pooling_operator: PoolingOperator,
    pub loss: &'static str,
    pub accuracy: &'static str,
}

impl CustomObjects {
    /// Resolves the functions registered for a pooling operator.
    pub fn for_pooling(pooling_operator: PoolingOperator) -> Result<Self> {
        let &(_, loss) = LOSS_FUNCTIONS
            .iter()
            .find(|(op, _)| *op == pooling_operator)
            .ok_or_else(|| {
                format_err!("no loss function registered for '{}'", pooling_operator)
            })?;

        Ok(Self {
            pooling_operator,
            loss,
            accuracy: ACCURACY_FUNCTION,
        })
    }
}
