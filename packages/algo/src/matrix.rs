//! Flat-Matrix Helpers
//!
//! Row-major `Vec<f64>` linear algebra used by the data generator:
//! column statistics, covariance, and power-iteration principal
//! components (the auxiliary summary features of the ensembling
//! pipeline).

use crate::types::EPSILON;

/// Power-iteration sweeps per component
const POWER_ITERATIONS: usize = 100;

/// 点积计算
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// 按列求均值，data 为 rows x cols 的行主序矩阵
pub fn column_means(data: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut means = vec![0.0; cols];
    if rows == 0 {
        return means;
    }
    for r in 0..rows {
        for c in 0..cols {
            means[c] += data[r * cols + c];
        }
    }
    for m in means.iter_mut() {
        *m /= rows as f64;
    }
    means
}

/// 样本协方差矩阵 (cols x cols)，除以 rows - 1
pub fn covariance(data: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut cov = vec![0.0; cols * cols];
    if rows < 2 {
        return cov;
    }
    let means = column_means(data, rows, cols);
    for r in 0..rows {
        for i in 0..cols {
            let di = data[r * cols + i] - means[i];
            for j in 0..cols {
                let dj = data[r * cols + j] - means[j];
                cov[i * cols + j] += di * dj;
            }
        }
    }
    let denom = (rows - 1) as f64;
    for v in cov.iter_mut() {
        *v /= denom;
    }
    cov
}

/// 幂迭代求前 k 个主成分方向（带收缩 deflation）。
///
/// 返回 k x cols 的行主序矩阵，每行一个单位长度的成分向量。
/// 初始向量取确定性的全 1 方向，保证可复现。
pub fn principal_components(data: &[f64], rows: usize, cols: usize, k: usize) -> Vec<f64> {
    let k = k.min(cols);
    let mut cov = covariance(data, rows, cols);
    let mut components = vec![0.0; k * cols];

    for comp in 0..k {
        // 确定性初始方向
        let mut v = vec![1.0 / (cols as f64).sqrt(); cols];
        for _ in 0..POWER_ITERATIONS {
            let mut next = vec![0.0; cols];
            for i in 0..cols {
                next[i] = dot(&cov[i * cols..(i + 1) * cols], &v);
            }
            let norm = dot(&next, &next).sqrt();
            if norm < EPSILON {
                // 剩余方差退化，保留当前方向
                break;
            }
            for (vi, ni) in v.iter_mut().zip(next.iter()) {
                *vi = ni / norm;
            }
        }

        let eigenvalue = {
            let mut cv = vec![0.0; cols];
            for i in 0..cols {
                cv[i] = dot(&cov[i * cols..(i + 1) * cols], &v);
            }
            dot(&v, &cv)
        };

        components[comp * cols..(comp + 1) * cols].copy_from_slice(&v);

        // deflation: cov -= lambda * v v^T
        for i in 0..cols {
            for j in 0..cols {
                cov[i * cols + j] -= eigenvalue * v[i] * v[j];
            }
        }
    }

    components
}

/// 将 rows x cols 的矩阵投影到 k 个主成分上，得到 rows x k 的得分。
///
/// `means` 为居中所用的列均值（通常来自训练分区）。
pub fn project(
    data: &[f64],
    rows: usize,
    cols: usize,
    components: &[f64],
    k: usize,
    means: &[f64],
) -> Vec<f64> {
    let mut scores = vec![0.0; rows * k];
    let mut centered = vec![0.0; cols];
    for r in 0..rows {
        for c in 0..cols {
            centered[c] = data[r * cols + c] - means[c];
        }
        for comp in 0..k {
            scores[r * k + comp] = dot(&centered, &components[comp * cols..(comp + 1) * cols]);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        assert!((dot(&a, &b) - 32.0).abs() < EPSILON);
    }

    #[test]
    fn test_column_means() {
        // 2x2: [[1, 2], [3, 4]]
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let means = column_means(&data, 2, 2);
        assert!((means[0] - 2.0).abs() < EPSILON);
        assert!((means[1] - 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_covariance_diagonal() {
        // 第一列方差 4，第二列方差 0
        let data = vec![0.0, 1.0, 2.0, 1.0, 4.0, 1.0];
        let cov = covariance(&data, 3, 2);
        assert!((cov[0] - 4.0).abs() < 1e-9);
        assert!(cov[3].abs() < 1e-9);
        // 对称性
        assert!((cov[1] - cov[2]).abs() < EPSILON);
    }

    #[test]
    fn test_principal_component_dominant_direction() {
        // 数据沿第一坐标轴铺开，第一主成分应接近 e_0
        let mut data = Vec::new();
        for i in 0..20 {
            let t = i as f64 - 9.5;
            data.push(t * 3.0);
            data.push(t * 0.01);
        }
        let comps = principal_components(&data, 20, 2, 1);
        assert!(comps[0].abs() > 0.99, "comp = {:?}", comps);
        assert!(comps[1].abs() < 0.1);
    }

    #[test]
    fn test_project_centers_data() {
        let data = vec![1.0, 0.0, 3.0, 0.0];
        let means = column_means(&data, 2, 2);
        let comps = vec![1.0, 0.0];
        let scores = project(&data, 2, 2, &comps, 1, &means);
        // 居中后为 -1 和 +1
        assert!((scores[0] + 1.0).abs() < EPSILON);
        assert!((scores[1] - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_principal_components_capped_at_cols() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let comps = principal_components(&data, 2, 2, 5);
        assert_eq!(comps.len(), 2 * 2);
    }
}
