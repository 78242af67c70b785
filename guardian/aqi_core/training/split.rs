use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{AqiError, Result};

/// Row indices of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    /// Rows used for fitting.
    pub train: Vec<usize>,
    /// Rows held out for evaluation.
    pub test: Vec<usize>,
}

fn shuffled(n_samples: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    indices
}

/// Seeded shuffle split; the test partition holds `ceil(n * test_size)` rows.
pub fn train_test_split(n_samples: usize, test_size: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(AqiError::Config(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let n_test = (n_samples as f64 * test_size).ceil() as usize;
    let n_train = n_samples.saturating_sub(n_test);
    if n_train < 2 || n_test == 0 {
        return Err(AqiError::DatasetShape(format!(
            "{n_samples} rows cannot be split into train ({n_train}) and test ({n_test}) partitions"
        )));
    }
    let indices = shuffled(n_samples, seed);
    Ok(SplitIndices {
        train: indices[..n_train].to_vec(),
        test: indices[n_train..].to_vec(),
    })
}

/// K-fold cross-validator with a seeded shuffle.
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    n_splits: usize,
    seed: u64,
}

impl KFold {
    /// Creates a splitter with `n_splits` folds.
    #[must_use]
    pub const fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    /// Train/test indices for each fold; the remainder goes to the first folds.
    pub fn split(&self, n_samples: usize) -> Result<Vec<SplitIndices>> {
        if self.n_splits < 2 || n_samples < self.n_splits {
            return Err(AqiError::DatasetShape(format!(
                "{n_samples} rows cannot be divided into {} folds",
                self.n_splits
            )));
        }
        let indices = shuffled(n_samples, self.seed);
        let fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for fold in 0..self.n_splits {
            let end = start + fold_size + usize::from(fold < remainder);
            let mut train = Vec::with_capacity(n_samples - (end - start));
            train.extend_from_slice(&indices[..start]);
            train.extend_from_slice(&indices[end..]);
            folds.push(SplitIndices {
                train,
                test: indices[start..end].to_vec(),
            });
            start = end;
        }
        Ok(folds)
    }
}
