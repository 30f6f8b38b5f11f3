//! Experiment pipelines.
//!
//! Both drivers share the partition-resolution rules of the original
//! experiment design, the outcome-model hyperparameter sweep, and the
//! full-combination evaluation block; they differ in their first stage
//! (propensity reweighting vs. ensemble rounds with principal-component
//! features).

pub mod bmc;
pub mod overlap;

use std::path::PathBuf;

use rand_chacha::ChaCha8Rng;
use yinguo_algo::dataset::TensorDataset;
use yinguo_algo::eval;
use yinguo_algo::{
    candidate_grid, select_best, DataGenerator, HyperparamCandidate, ModelTrainer,
    OutcomeRegression, SimulationConfig, SupervisedModel, ValidationScore,
};

use crate::checkpoint::{BestCheckpoint, CheckpointStore};
use crate::error::RunnerError;

pub(crate) const BATCH_SIZE: usize = 100;
pub(crate) const LEARNING_RATE: f64 = 0.01;
pub(crate) const HYPER_PARAM_ITR: usize = 5;

/// 集成轮次的固定分区大小（评估分区远大于训练分区）
const ROUND_TRAIN_STEP: usize = 700;
const FIXED_VALID_SIZE: usize = 200;
const FIXED_EVAL_SIZE: usize = 4100;

/// Shared run options; binaries use the defaults, tests shrink the
/// epoch counts.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// 保留既有检查点目录（不销毁重建）
    pub eval_only: bool,
    /// 对 n_flip = 1..=n_cause 逐个报告反事实误差
    pub eval_delta: bool,
    /// 结果回归每个候选的训练轮数
    pub max_epoch: usize,
    /// 倾向网络的训练轮数
    pub propensity_max_epoch: usize,
    /// 检查点根目录
    pub model_root: PathBuf,
    /// `--save-data` 输出目录
    pub data_root: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            eval_only: false,
            eval_delta: false,
            max_epoch: 100,
            propensity_max_epoch: 5000,
            model_root: PathBuf::from("model"),
            data_root: PathBuf::from("."),
        }
    }
}

/// Per-flip counterfactual error (the `--eval-delta` sweep).
#[derive(Clone, Debug)]
pub struct FlipReport {
    pub n_flip: usize,
    pub rmse: f64,
    pub rmse_sd: f64,
}

/// Final metrics of a full evaluation run.
#[derive(Clone, Debug)]
pub struct EvalReport {
    pub best: HyperparamCandidate,
    /// 预测 CATE 对真值的 RMSE 及其 bootstrap 标准差
    pub cate_rmse: f64,
    pub cate_rmse_sd: f64,
    /// 全部 2^n_cause 组合结果向量的误差
    pub rmse_all: f64,
    pub rmse_all_sd: f64,
    /// 常数均值基线的组合结果误差
    pub rmse_mean_baseline: f64,
}

/// What a pipeline run produced.
#[derive(Clone, Debug)]
pub enum PipelineOutcome {
    Report(EvalReport),
    DeltaSweep(Vec<FlipReport>),
    DataSaved,
}

/// 按轮次解析有效样本量与分区比例。
///
/// - `sample_size_train` 非零：训练行数固定，验证 200 / 评估 4100；
/// - 第 0 轮：基准比例除以 `sample_size / 1000`（不小于 1），使训练分区
///   的绝对行数不随总样本量增长；
/// - 第 r ≥ 1 轮：训练行数按 700 * (r + 1) 扩张，验证 200 / 评估 4100。
pub(crate) fn resolve_partition(config: &SimulationConfig, round: usize) -> SimulationConfig {
    let mut resolved = config.clone();
    if config.sample_size_train != 0 {
        let n = config.sample_size_train + FIXED_VALID_SIZE + FIXED_EVAL_SIZE;
        resolved.sample_size = n;
        resolved.train_frac = config.sample_size_train as f64 / n as f64;
        resolved.val_frac = FIXED_VALID_SIZE as f64 / n as f64;
    } else if round == 0 {
        let ratio = (config.sample_size as f64 / 1000.0).max(1.0);
        resolved.train_frac = config.train_frac / ratio;
        resolved.val_frac = config.val_frac / ratio;
    } else {
        let train = ROUND_TRAIN_STEP * (round + 1);
        let n = train + FIXED_VALID_SIZE + FIXED_EVAL_SIZE;
        resolved.sample_size = n;
        resolved.train_frac = train as f64 / n as f64;
        resolved.val_frac = FIXED_VALID_SIZE as f64 / n as f64;
    }
    resolved
}

pub(crate) struct SweepOutcome {
    pub best: HyperparamCandidate,
    pub model: OutcomeRegression,
}

/// 超参数扫描控制器：每个候选训练一个结果模型，按验证 RMSE 选最优。
///
/// 每个候选的最优状态都会落盘；选中的候选另外以 `best.json` 保存。
pub(crate) fn run_outcome_sweep(
    train: &TensorDataset,
    valid: &TensorDataset,
    weighted: bool,
    config: &SimulationConfig,
    max_epoch: usize,
    store: &CheckpointStore,
    tag: &str,
    rng: &mut ChaCha8Rng,
) -> Result<SweepOutcome, RunnerError> {
    let n_input = train.feature_dim - usize::from(weighted);
    let n_outcome = train.label_dim;
    let candidates = candidate_grid(HYPER_PARAM_ITR, config.n_confounder, config.p_confounder_cause);

    let mut scores = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let mut model =
            OutcomeRegression::new(n_input, n_outcome, candidate.n_hidden(), weighted, rng);
        let trainer = ModelTrainer::new(candidate.batch_size, max_epoch);
        let report = trainer.train(&mut model, candidate.learning_rate, train, valid, rng);

        let score = match report.score {
            ValidationScore::Valid(_) => {
                store.save_candidate(tag, candidate.itr, &model.snapshot())?;
                // 选择依据是验证分区上的（无加权）预测 RMSE
                let y_hat = model.predict(valid);
                let vrmse = eval::rmse(&y_hat, &valid.labels);
                if vrmse.is_finite() {
                    ValidationScore::Valid(vrmse)
                } else {
                    ValidationScore::Diverged
                }
            }
            ValidationScore::Diverged => {
                tracing::warn!(tag, itr = candidate.itr, "candidate diverged");
                ValidationScore::Diverged
            }
        };
        tracing::info!(tag, itr = candidate.itr, ?score, "candidate scored");
        scores.push(score);
    }

    let valid_count = scores.iter().filter(|s| s.is_valid()).count();
    let best_index = select_best(&scores).map_err(RunnerError::from)?;
    let best = candidates[best_index].clone();
    tracing::info!(
        tag,
        itr = best.itr,
        hidden = best.n_hidden(),
        valid_candidates = valid_count,
        "best hyper-parameter candidate"
    );

    // 从落盘状态恢复选中的候选，再另存为 best
    let state = store.load_candidate(tag, best.itr)?;
    let mut model = OutcomeRegression::new(n_input, n_outcome, best.n_hidden(), weighted, rng);
    model.restore(&state);
    store.save_best(&BestCheckpoint {
        candidate: best.clone(),
        state,
    })?;

    Ok(SweepOutcome { best, model })
}

/// 一个翻转量下的反事实误差
pub(crate) fn evaluate_flip(
    model: &OutcomeRegression,
    x_test: &TensorDataset,
    new_x_test: &TensorDataset,
    cate_test: &[f64],
) -> (f64, f64) {
    let y_hat0 = model.predict(x_test);
    let y_hat1 = model.predict(new_x_test);
    let cate_hat: Vec<f64> = y_hat1.iter().zip(y_hat0.iter()).map(|(a, b)| a - b).collect();
    let err = eval::rmse(&cate_hat, cate_test);
    let sd = eval::bootstrap_rmse(&eval::squared_errors(&cate_hat, cate_test));
    (err, sd)
}

/// 完整评估：单翻转 CATE 误差 + 全组合结果向量误差 + 常数均值基线
pub(crate) fn evaluate_full(
    dg: &DataGenerator,
    model: &OutcomeRegression,
    best: &HyperparamCandidate,
    x_test: &TensorDataset,
    new_x_test: &TensorDataset,
    cate_test: &[f64],
    new_x_list: &[TensorDataset],
) -> EvalReport {
    let (cate_rmse, cate_rmse_sd) = evaluate_flip(model, x_test, new_x_test, cate_test);

    // 逐组合预测并排成 N_eval x (2^n_cause * n_outcome)
    let n_test = x_test.rows;
    let stride = dg.n_combo() * dg.n_outcome();
    let mut y_mat = vec![0.0; n_test * stride];
    for (combo, new_x) in new_x_list.iter().enumerate() {
        let y_hat = model.predict(new_x);
        for r in 0..n_test {
            for k in 0..dg.n_outcome() {
                y_mat[r * stride + combo * dg.n_outcome() + k] = y_hat[r * dg.n_outcome() + k];
            }
        }
    }

    let (y_true, true_stride) = dg.true_outcome_matrix();
    debug_assert_eq!(stride, true_stride);
    let eval_offset = (dg.sample_size() - n_test) * stride;
    let y_true_eval = &y_true[eval_offset..];

    let err_all = eval::row_squared_error_sums(y_true_eval, &y_mat, n_test, stride);
    let rmse_all = mean(&err_all).sqrt();
    let rmse_all_sd = eval::bootstrap_rmse(&err_all);

    // 常数均值基线：全部行上的组合结果均值
    let mut y_mean = vec![0.0; stride];
    for r in 0..dg.sample_size() {
        for c in 0..stride {
            y_mean[c] += y_true[r * stride + c];
        }
    }
    for v in y_mean.iter_mut() {
        *v /= dg.sample_size() as f64;
    }
    let baseline = eval::repeat_rows(&y_mean, n_test);
    let err_mean = eval::row_squared_error_sums(y_true_eval, &baseline, n_test, stride);
    let rmse_mean_baseline = mean(&err_mean).sqrt();

    EvalReport {
        best: best.clone(),
        cate_rmse,
        cate_rmse_sd,
        rmse_all,
        rmse_all_sd,
        rmse_mean_baseline,
    }
}

pub(crate) fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// 控制台输出统一保留三位小数
pub(crate) fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_partition_base_round() {
        let config = SimulationConfig::default();
        let resolved = resolve_partition(&config, 0);
        assert_eq!(resolved.sample_size, 1000);
        assert!((resolved.train_frac - 0.7).abs() < 1e-12);
        assert!((resolved.val_frac - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_resolve_partition_scales_down_large_samples() {
        // 总样本量翻倍时训练分区的绝对行数保持不变
        let config = SimulationConfig {
            sample_size: 2000,
            ..Default::default()
        };
        let resolved = resolve_partition(&config, 0);
        assert!((resolved.train_frac - 0.35).abs() < 1e-12);
        assert!((resolved.val_frac - 0.05).abs() < 1e-12);
        let train_rows = (resolved.sample_size as f64 * resolved.train_frac).round() as usize;
        assert_eq!(train_rows, 700);
    }

    #[test]
    fn test_resolve_partition_ensemble_round() {
        let config = SimulationConfig::default();
        let resolved = resolve_partition(&config, 2);
        assert_eq!(resolved.sample_size, 2100 + 200 + 4100);
        let train_rows = (resolved.sample_size as f64 * resolved.train_frac).round() as usize;
        assert_eq!(train_rows, 2100);
    }

    #[test]
    fn test_resolve_partition_fixed_train_size() {
        let config = SimulationConfig {
            sample_size_train: 1000,
            ..Default::default()
        };
        let resolved = resolve_partition(&config, 0);
        assert_eq!(resolved.sample_size, 1000 + 200 + 4100);
        let train_rows = (resolved.sample_size as f64 * resolved.train_frac).round() as usize;
        assert_eq!(train_rows, 1000);
        assert!(resolved.validate().is_ok());
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.12345), 0.123);
        assert_eq!(round3(0.9996), 1.0);
    }
}
