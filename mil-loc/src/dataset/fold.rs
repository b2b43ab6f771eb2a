use super::*;
use crate::common::*;

/// The partition of a table's row indices for one fold.
///
/// The three index lists are disjoint, sorted, and together cover every row
/// of the table the assignment was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    pub fold: usize,
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

/// The train, validation and test tables for one fold.
#[derive(Debug, Clone)]
pub struct FoldTables {
    pub fold: usize,
    pub train: InstanceTable,
    pub val: InstanceTable,
    pub test: InstanceTable,
}

/// Seeded K-fold partitioning.
///
/// Rows are grouped (one group per row, or one group per image identifier),
/// the groups are shuffled with the seed, and cut into `num_splits` contiguous
/// folds whose sizes differ by at most one group. The same seed always yields
/// the same folds.
#[derive(Debug, Clone)]
pub struct FoldSplitter {
    num_splits: usize,
    seed: u64,
    val_ratio: R64,
    group_by_image: bool,
}

impl FoldSplitter {
    /// Creates a splitter.
    ///
    /// * `num_splits` - The number of folds. It must be at least 2.
    /// * `seed` - The seed fixing fold boundaries.
    /// * `val_ratio` - The ratio of non-test groups moved to validation, in `(0, 1)`.
    /// * `group_by_image` - Keep rows sharing an image identifier in the same partition.
    pub fn new(num_splits: usize, seed: u64, val_ratio: R64, group_by_image: bool) -> Result<Self> {
        ensure!(num_splits >= 2, "num_splits must be at least 2");
        ensure!(
            val_ratio > 0.0 && val_ratio < 1.0,
            "val_ratio must be in range (0, 1), but get {}",
            val_ratio
        );

        Ok(Self {
            num_splits,
            seed,
            val_ratio,
            group_by_image,
        })
    }

    pub fn num_splits(&self) -> usize {
        self.num_splits
    }

    /// Computes the assignment where fold `fold` is the test partition and the
    /// validation partition is drawn from the remaining folds.
    pub fn assign(&self, table: &InstanceTable, fold: usize) -> Result<FoldAssignment> {
        let mut folds = self.folds(table, fold)?;
        let test_groups = folds.remove(fold);

        let mut rest: Vec<Vec<usize>> = folds.into_iter().flatten().collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(fold as u64 + 1));
        rest.shuffle(&mut rng);

        let num_val = ((rest.len() as f64 * self.val_ratio.raw()).round() as usize)
            .clamp(1, rest.len().saturating_sub(1).max(1));
        let train_groups = rest.split_off(num_val);
        let val_groups = rest;

        Ok(FoldAssignment {
            fold,
            train: flatten_sorted(train_groups),
            val: flatten_sorted(val_groups),
            test: flatten_sorted(test_groups),
        })
    }

    /// Computes the assignment for a dataset with a separate test table, where
    /// fold `fold` is the validation partition and the test partition is empty.
    pub fn assign_without_test(
        &self,
        table: &InstanceTable,
        fold: usize,
    ) -> Result<FoldAssignment> {
        let mut folds = self.folds(table, fold)?;
        let val_groups = folds.remove(fold);
        let train_groups: Vec<_> = folds.into_iter().flatten().collect();

        Ok(FoldAssignment {
            fold,
            train: flatten_sorted(train_groups),
            val: flatten_sorted(val_groups),
            test: vec![],
        })
    }

    /// Splits the table into train, validation and test tables for a fold.
    pub fn split(&self, table: &InstanceTable, fold: usize) -> Result<FoldTables> {
        let FoldAssignment {
            train, val, test, ..
        } = self.assign(table, fold)?;

        Ok(FoldTables {
            fold,
            train: table.select(&train)?,
            val: table.select(&val)?,
            test: table.select(&test)?,
        })
    }

    /// Splits the train/validation table for a fold and pairs it with a preset test table.
    pub fn split_with_test(
        &self,
        train_val: &InstanceTable,
        test: &InstanceTable,
        fold: usize,
    ) -> Result<FoldTables> {
        let FoldAssignment { train, val, .. } = self.assign_without_test(train_val, fold)?;

        Ok(FoldTables {
            fold,
            train: train_val.select(&train)?,
            val: train_val.select(&val)?,
            test: test.clone(),
        })
    }

    /// Returns the groups of every fold, each group being a list of row indices.
    fn folds(&self, table: &InstanceTable, fold: usize) -> Result<Vec<Vec<Vec<usize>>>> {
        let num_splits = self.num_splits;
        ensure!(
            fold < num_splits,
            "fold index {} is out of range, expect less than {}",
            fold,
            num_splits
        );

        let mut groups = self.groups(table);
        ensure!(
            groups.len() >= num_splits,
            "cannot split {} groups into {} folds",
            groups.len(),
            num_splits
        );

        let mut rng = StdRng::seed_from_u64(self.seed);
        groups.shuffle(&mut rng);

        let num_groups = groups.len();
        let base = num_groups / num_splits;
        let rem = num_groups % num_splits;
        let mut groups = groups.into_iter();

        let folds = (0..num_splits)
            .map(|index| {
                let size = if index < rem { base + 1 } else { base };
                groups.by_ref().take(size).collect()
            })
            .collect();

        Ok(folds)
    }

    fn groups(&self, table: &InstanceTable) -> Vec<Vec<usize>> {
        if self.group_by_image {
            let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
            table.iter().enumerate().for_each(|(index, record)| {
                groups.entry(record.image.as_str()).or_default().push(index);
            });
            groups.into_iter().map(|(_, indices)| indices).collect()
        } else {
            (0..table.len()).map(|index| vec![index]).collect()
        }
    }
}

fn flatten_sorted(groups: Vec<Vec<usize>>) -> Vec<usize> {
    let mut indices: Vec<usize> = groups.into_iter().flatten().collect();
    indices.sort_unstable();
    indices
}
