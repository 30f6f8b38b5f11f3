//! Common Types and Constants
//!
//! Shared data structures used across all simulation modules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==================== Constants ====================

/// Numerical stability epsilon
pub const EPSILON: f64 = 1e-10;

/// 权重截断上限（防止极端倾向得分）
pub const MAX_WEIGHT: f64 = 20.0;

/// Lower clamp for estimated propensities
pub const PROPENSITY_MIN: f64 = 0.05;

/// Upper clamp for estimated propensities
pub const PROPENSITY_MAX: f64 = 0.95;

/// Bootstrap resample count
pub const N_BOOTSTRAP: usize = 1000;

/// Maximum number of principal-component features appended in ensemble runs
pub const MAX_NPC: usize = 3;

/// Upper bound on `n_cause` for full treatment-combination enumeration
/// (ground truth stores one outcome matrix per combination, 2^n_cause total)
pub const MAX_ENUM_CAUSE: usize = 12;

// ==================== Errors ====================

/// 模拟核心的错误类型
#[derive(Debug, Error)]
pub enum SimError {
    #[error("real-data mode is not supported by the synthetic generator")]
    RealDataUnsupported,

    #[error("train_frac {train_frac} and val_frac {val_frac} must lie in (0, 1) and leave room for an evaluation split")]
    BadPartition { train_frac: f64, val_frac: f64 },

    #[error("sample_size must be positive")]
    EmptySample,

    #[error("probability {name} = {value} is outside [0, 1]")]
    BadProbability { name: &'static str, value: f64 },

    #[error("noise levels must be non-negative")]
    NegativeNoise,

    #[error("n_flip {n_flip} exceeds n_cause {n_cause}")]
    FlipExceedsCauses { n_flip: usize, n_cause: usize },

    #[error("n_cause {n_cause} exceeds the enumeration bound {max} for ground-truth outcomes")]
    TooManyCauses { n_cause: usize, max: usize },

    #[error("cause {child} lists cause parent {parent} with index >= its own")]
    CauseOrdering { child: usize, parent: usize },

    #[error("every hyper-parameter candidate diverged")]
    AllDiverged,

    #[error("dimension mismatch: {0}")]
    Shape(String),
}

// ==================== Simulation Configuration ====================

/// Full parameter bundle for one simulation experiment.
///
/// Immutable once handed to a pipeline; the checkpoint namespace is keyed
/// on a content hash of this struct, so any field change yields a fresh
/// run id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Registry key / simulation identifier
    pub sim_id: String,
    pub n_confounder: usize,
    pub n_cause: usize,
    pub n_outcome: usize,
    pub sample_size: usize,
    /// 混杂因子 -> 处理变量 的边概率
    pub p_confounder_cause: f64,
    /// 处理变量 -> 后续处理变量 的边概率
    pub p_cause_cause: f64,
    pub cause_noise: f64,
    pub outcome_noise: f64,
    /// false 时父节点聚合经过 tanh 非线性
    pub linear: bool,
    /// 混杂强度（重标定混杂因子对处理变量的影响）
    pub confounding_level: f64,
    /// 保留字段：合成管线不支持真实数据
    pub real_data: bool,
    pub train_frac: f64,
    pub val_frac: f64,
    /// 单变量结果效应的纳入概率
    pub p_outcome_single: f64,
    /// 两变量交互效应的纳入概率
    pub p_outcome_double: f64,
    pub outcome_interaction: bool,
    /// 反事实评估翻转的处理变量个数
    pub n_flip: usize,
    /// 非零时固定训练集行数（验证 200 / 评估 4100）
    pub sample_size_train: usize,
    /// 每次运行创建一次随机数生成器所用的种子
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_id: "default".to_string(),
            n_confounder: 10,
            n_cause: 2,
            n_outcome: 1,
            sample_size: 1000,
            p_confounder_cause: 0.5,
            p_cause_cause: 0.3,
            cause_noise: 1.0,
            outcome_noise: 1.0,
            linear: true,
            confounding_level: 1.0,
            real_data: false,
            train_frac: 0.7,
            val_frac: 0.1,
            p_outcome_single: 0.5,
            p_outcome_double: 0.3,
            outcome_interaction: false,
            n_flip: 1,
            sample_size_train: 0,
            seed: 100,
        }
    }
}

impl SimulationConfig {
    /// 校验配置；配置错误是致命的，调用方直接向上传播
    pub fn validate(&self) -> Result<(), SimError> {
        if self.real_data {
            return Err(SimError::RealDataUnsupported);
        }
        if self.sample_size == 0 || self.n_outcome == 0 {
            return Err(SimError::EmptySample);
        }
        if self.n_cause > MAX_ENUM_CAUSE {
            return Err(SimError::TooManyCauses {
                n_cause: self.n_cause,
                max: MAX_ENUM_CAUSE,
            });
        }
        for (name, value) in [
            ("p_confounder_cause", self.p_confounder_cause),
            ("p_cause_cause", self.p_cause_cause),
            ("p_outcome_single", self.p_outcome_single),
            ("p_outcome_double", self.p_outcome_double),
        ] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return Err(SimError::BadProbability { name, value });
            }
        }
        if self.cause_noise < 0.0 || self.outcome_noise < 0.0 {
            return Err(SimError::NegativeNoise);
        }
        if !(0.0 < self.train_frac && self.train_frac < 1.0)
            || !(0.0 < self.val_frac && self.val_frac < 1.0)
            || self.train_frac + self.val_frac > 1.0
        {
            return Err(SimError::BadPartition {
                train_frac: self.train_frac,
                val_frac: self.val_frac,
            });
        }
        if self.n_flip > self.n_cause {
            return Err(SimError::FlipExceedsCauses {
                n_flip: self.n_flip,
                n_cause: self.n_cause,
            });
        }
        Ok(())
    }
}

// ==================== Hyperparameter Types ====================

/// One hyper-parameter sweep candidate.
///
/// Candidates are independent; only the iteration id feeds into
/// checkpoint naming to avoid filesystem collisions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperparamCandidate {
    pub itr: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    /// 结果表示层宽度
    pub n_outcome_rep: usize,
    /// 混杂表示层宽度
    pub n_confounder_rep: usize,
}

impl HyperparamCandidate {
    /// Hidden width of the outcome network for this candidate
    pub fn n_hidden(&self) -> usize {
        self.n_outcome_rep + self.n_confounder_rep
    }
}

// ==================== Tests ====================
