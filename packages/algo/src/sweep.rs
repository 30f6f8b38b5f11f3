//! Hyperparameter Sweep
//!
//! Fixed candidate grid plus minimum-validation-error selection.
//! Candidate scores are a sum type so a diverged training run can never
//! win selection by NaN comparison; if every candidate diverges the
//! sweep fails loudly.

use serde::{Deserialize, Serialize};

use crate::types::{HyperparamCandidate, SimError};

/// 一个候选的验证得分
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ValidationScore {
    Valid(f64),
    Diverged,
}

impl ValidationScore {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationScore::Valid(_))
    }
}

/// 枚举候选网格。
///
/// 学习率与批大小固定（0.01 / 100），表示层宽度由混杂维数与迭代号
/// 推出；混杂边较密时（p > 0.5）加宽混杂表示。
pub fn candidate_grid(
    hyper_param_itr: usize,
    n_confounder: usize,
    p_confounder_cause: f64,
) -> Vec<HyperparamCandidate> {
    let dense_bonus = if p_confounder_cause > 0.5 { 2 } else { 0 };
    (0..hyper_param_itr)
        .map(|itr| HyperparamCandidate {
            itr,
            learning_rate: 0.01,
            batch_size: 100,
            n_outcome_rep: (n_confounder + 4 + itr).max(4),
            n_confounder_rep: (n_confounder + dense_bonus + 2 * itr).max(4),
        })
        .collect()
}

/// 选出验证误差最小的候选下标。
///
/// 并列时取先遇到的下标；Diverged 候选被排除；全部发散时报错。
pub fn select_best(scores: &[ValidationScore]) -> Result<usize, SimError> {
    let mut best: Option<(usize, f64)> = None;
    for (i, s) in scores.iter().enumerate() {
        if let ValidationScore::Valid(v) = s {
            if v.is_finite() && best.map_or(true, |(_, b)| *v < b) {
                best = Some((i, *v));
            }
        }
    }
    best.map(|(i, _)| i).ok_or(SimError::AllDiverged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_size_and_ids() {
        let grid = candidate_grid(5, 10, 0.5);
        assert_eq!(grid.len(), 5);
        for (i, c) in grid.iter().enumerate() {
            assert_eq!(c.itr, i);
            assert_eq!(c.learning_rate, 0.01);
            assert_eq!(c.batch_size, 100);
            assert!(c.n_hidden() > 0);
        }
        // 宽度随迭代号单调增长，保证候选互不相同
        assert!(grid[4].n_hidden() > grid[0].n_hidden());
    }

    #[test]
    fn test_grid_dense_graph_widens_confounder_rep() {
        let sparse = candidate_grid(3, 10, 0.3);
        let dense = candidate_grid(3, 10, 0.8);
        assert!(dense[0].n_confounder_rep > sparse[0].n_confounder_rep);
    }

    #[test]
    fn test_select_first_minimum() {
        // 并列最小值取第一个出现的下标
        let scores = [
            ValidationScore::Valid(0.5),
            ValidationScore::Valid(0.2),
            ValidationScore::Valid(0.8),
            ValidationScore::Valid(0.2),
        ];
        assert_eq!(select_best(&scores).unwrap(), 1);
    }

    #[test]
    fn test_select_skips_diverged() {
        let scores = [
            ValidationScore::Diverged,
            ValidationScore::Valid(0.9),
            ValidationScore::Valid(0.3),
        ];
        assert_eq!(select_best(&scores).unwrap(), 2);
    }

    #[test]
    fn test_all_diverged_fails_loudly() {
        let scores = [ValidationScore::Diverged, ValidationScore::Diverged];
        assert!(matches!(select_best(&scores), Err(SimError::AllDiverged)));
        assert!(matches!(select_best(&[]), Err(SimError::AllDiverged)));
    }

    #[test]
    fn test_non_finite_valid_scores_are_ignored() {
        // 防御 NaN 渗入 Valid 的情况
        let scores = [
            ValidationScore::Valid(f64::NAN),
            ValidationScore::Valid(0.7),
        ];
        assert_eq!(select_best(&scores).unwrap(), 1);
    }
}
