//! Dataset Partitioner & Tensor Builder
//!
//! Rows are split into contiguous train / validation / evaluation index
//! ranges exactly once, in that order, with no shuffling: given a fixed
//! generation seed, the partition is fully reproducible.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::types::SimError;

/// Contiguous, non-overlapping index ranges covering `0..n`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    pub train: Range<usize>,
    pub valid: Range<usize>,
    pub eval: Range<usize>,
}

impl Partition {
    pub fn train_size(&self) -> usize {
        self.train.len()
    }

    pub fn valid_size(&self) -> usize {
        self.valid.len()
    }

    pub fn eval_size(&self) -> usize {
        self.eval.len()
    }
}

/// 按比例切分 `0..n`，余下的行全部归评估分区
pub fn split_indices(n: usize, train_frac: f64, val_frac: f64) -> Result<Partition, SimError> {
    if n == 0 {
        return Err(SimError::EmptySample);
    }
    if !(0.0 < train_frac && train_frac < 1.0)
        || !(0.0 < val_frac && val_frac < 1.0)
        || train_frac + val_frac > 1.0
    {
        return Err(SimError::BadPartition { train_frac, val_frac });
    }
    let train_size = (n as f64 * train_frac).round() as usize;
    let valid_size = (n as f64 * val_frac).round() as usize;
    if train_size == 0 || valid_size == 0 || train_size + valid_size >= n {
        return Err(SimError::BadPartition { train_frac, val_frac });
    }
    Ok(Partition {
        train: 0..train_size,
        valid: train_size..train_size + valid_size,
        eval: train_size + valid_size..n,
    })
}

/// Row-major feature/label tensor pair.
///
/// `label_dim == 0` marks a feature-only view (counterfactual feature
/// matrices). When a weight vector is attached by the caller, it is the
/// trailing feature column and `feature_dim` counts it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TensorDataset {
    pub features: Vec<f64>,
    pub labels: Vec<f64>,
    pub rows: usize,
    pub feature_dim: usize,
    pub label_dim: usize,
}

impl TensorDataset {
    pub fn new(
        features: Vec<f64>,
        labels: Vec<f64>,
        rows: usize,
        feature_dim: usize,
        label_dim: usize,
    ) -> Self {
        debug_assert_eq!(features.len(), rows * feature_dim);
        debug_assert_eq!(labels.len(), rows * label_dim);
        Self {
            features,
            labels,
            rows,
            feature_dim,
            label_dim,
        }
    }

    pub fn feature_row(&self, r: usize) -> &[f64] {
        &self.features[r * self.feature_dim..(r + 1) * self.feature_dim]
    }

    pub fn label_row(&self, r: usize) -> &[f64] {
        &self.labels[r * self.label_dim..(r + 1) * self.label_dim]
    }

    /// 取出一段连续行，得到一个独立的张量视图
    pub fn slice_rows(&self, range: Range<usize>) -> TensorDataset {
        debug_assert!(range.end <= self.rows);
        let f = self.features[range.start * self.feature_dim..range.end * self.feature_dim].to_vec();
        let l = self.labels[range.start * self.label_dim..range.end * self.label_dim].to_vec();
        TensorDataset::new(f, l, range.len(), self.feature_dim, self.label_dim)
    }
}
