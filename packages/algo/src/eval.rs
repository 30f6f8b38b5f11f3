//! Evaluation & Bootstrap Reporter
//!
//! Point RMSE plus a bootstrap standard deviation of the RMSE as the
//! uncertainty measure. Resampling is deterministic: replicate `b` uses
//! its own `ChaCha8Rng::seed_from_u64(b)`, so reports are reproducible
//! and the replicates parallelize cleanly.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::types::N_BOOTSTRAP;

/// sqrt(mean((a - b)^2))
pub fn rmse(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let sum: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    (sum / a.len() as f64).sqrt()
}

/// 逐元素平方误差
pub fn squared_errors(a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).collect()
}

/// 每行在所有维度上求和的平方误差（全组合结果向量误差用）
pub fn row_squared_error_sums(a: &[f64], b: &[f64], rows: usize, dim: usize) -> Vec<f64> {
    debug_assert_eq!(a.len(), rows * dim);
    debug_assert_eq!(b.len(), rows * dim);
    (0..rows)
        .map(|r| {
            let mut sum = 0.0;
            for k in 0..dim {
                let d = a[r * dim + k] - b[r * dim + k];
                sum += d * d;
            }
            sum
        })
        .collect()
}

/// 平方误差向量的 bootstrap RMSE 标准差。
///
/// 有放回重采样 B = 1000 次，每次取 sqrt(mean)，返回样本标准差。
pub fn bootstrap_rmse(sq_errors: &[f64]) -> f64 {
    let n = sq_errors.len();
    if n == 0 {
        return 0.0;
    }
    let estimates: Vec<f64> = (0..N_BOOTSTRAP)
        .into_par_iter()
        .map(|b| {
            // 每个重采样使用独立的确定性种子
            let mut rng = ChaCha8Rng::seed_from_u64(b as u64);
            let sum: f64 = (0..n).map(|_| sq_errors[rng.gen_range(0..n)]).sum();
            (sum / n as f64).max(0.0).sqrt()
        })
        .collect();
    sample_std(&estimates)
}

/// 把一行重复 rows 次（常数均值基线的预测矩阵）
pub fn repeat_rows(row: &[f64], rows: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(row.len() * rows);
    for _ in 0..rows {
        out.extend_from_slice(row);
    }
    out
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// 样本标准差（n - 1）
fn sample_std(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let sum_sq: f64 = xs.iter().map(|x| (x - m) * (x - m)).sum();
    (sum_sq / (xs.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmse_known_values() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0, 3.0];
        assert_eq!(rmse(&a, &b), 0.0);

        let c = vec![0.0, 0.0];
        let d = vec![3.0, 4.0];
        // sqrt((9 + 16) / 2)
        assert!((rmse(&c, &d) - (12.5f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_rmse_empty() {
        assert_eq!(rmse(&[], &[]), 0.0);
    }

    #[test]
    fn test_squared_errors() {
        let e = squared_errors(&[1.0, -1.0], &[0.0, 1.0]);
        assert_eq!(e, vec![1.0, 4.0]);
    }

    #[test]
    fn test_row_squared_error_sums() {
        // 2 行 2 列
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![0.0, 0.0, 3.0, 0.0];
        let sums = row_squared_error_sums(&a, &b, 2, 2);
        assert_eq!(sums, vec![5.0, 16.0]);
    }

    #[test]
    fn test_bootstrap_rmse_zero_errors() {
        // 零误差向量没有方差
        let zeros = vec![0.0; 100];
        assert_eq!(bootstrap_rmse(&zeros), 0.0);
    }

    #[test]
    fn test_bootstrap_rmse_constant_errors() {
        // 常数向量的每个重采样都得到同一估计
        let constant = vec![4.0; 50];
        assert!(bootstrap_rmse(&constant) < 1e-12);
    }

    #[test]
    fn test_bootstrap_rmse_varied_errors_positive() {
        let varied: Vec<f64> = (0..100).map(|i| (i % 7) as f64).collect();
        assert!(bootstrap_rmse(&varied) > 0.0);
    }

    #[test]
    fn test_bootstrap_rmse_deterministic() {
        let varied: Vec<f64> = (0..60).map(|i| (i % 5) as f64 * 0.3).collect();
        assert_eq!(bootstrap_rmse(&varied), bootstrap_rmse(&varied));
    }

    #[test]
    fn test_bootstrap_rmse_empty() {
        assert_eq!(bootstrap_rmse(&[]), 0.0);
    }

    #[test]
    fn test_repeat_rows() {
        assert_eq!(repeat_rows(&[1.0, 2.0], 3).len(), 6);
        assert_eq!(repeat_rows(&[1.0, 2.0], 2), vec![1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_sample_std() {
        assert_eq!(sample_std(&[5.0]), 0.0);
        let xs = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((sample_std(&xs) - 4.571428571428571f64.sqrt()).abs() < 1e-9);
    }
}
