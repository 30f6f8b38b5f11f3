//! # yinguo-algo - 因果模拟核心算法库
//!
//! 本 crate 提供纯 Rust 实现的因果推断模拟算法:
//!
//! - **Causal Graph Sampler** - 随机因果结构采样（混杂/处理/结果）
//! - **Structural Data Generator** - 结构方程数据生成与反事实真值枚举
//! - **Counterfactual Constructor** - 干预特征构造与真实 CATE 计算
//! - **Propensity / Outcome Networks** - 倾向与结果回归估计器（单隐层）
//! - **Overlap Reweighting** - 逆概率与重叠权重
//! - **Bootstrap Evaluation** - RMSE 及其 bootstrap 标准差
//!
//! ## 设计理念
//!
//! - **纯 Rust** - 无外部张量库依赖，可在任何 Rust 项目中使用
//! - **可复现** - 随机源显式传递，一次实验一个生成器，结果逐位一致
//! - **充分测试** - 所有算法都有完整的单元测试
//! - **高性能** - bootstrap 评估并行化，针对批量实验优化
//!
//! ## 模块结构
//!
//! - [`graph`] - 因果图采样（无环由生成序保证并显式校验）
//! - [`datagen`] - 结构数据生成器（噪声一次抽取、反事实复用）
//! - [`dataset`] - 分区与张量视图（训练/验证/评估连续切分）
//! - [`network`] - 倾向网络与结果回归（手写梯度下降）
//! - [`trainer`] - 小批量 SGD 轮次驱动与最优验证快照
//! - [`sweep`] - 超参数网格与最小验证误差选择
//! - [`eval`] - RMSE 与 bootstrap 误差报告
//! - [`matrix`] - 扁平矩阵运算（协方差、幂迭代主成分）
//! - [`sanitize`] - 数值稳定性工具
//! - [`types`] - 公共类型和常量

// ============================================================================
// 模块声明
// ============================================================================

pub mod dataset;
pub mod datagen;
pub mod eval;
pub mod graph;
pub mod matrix;
pub mod network;
pub mod sanitize;
pub mod sweep;
pub mod trainer;
pub mod types;

// ============================================================================
// 重新导出
// ============================================================================

/// 重新导出所有公共类型
pub use types::*;

/// 重新导出因果图与数据生成器
pub use datagen::{flip_causes, DataGenerator};
pub use graph::{CausalGraph, CauseNode, OutcomeNode};

/// 重新导出数据集视图
pub use dataset::{split_indices, Partition, TensorDataset};

/// 重新导出模型与训练器
pub use network::{ModelState, OutcomeRegression, PropensityNetwork, SupervisedModel};
pub use trainer::{ModelTrainer, TrainReport};

/// 重新导出超参数扫描与评估
pub use eval::{bootstrap_rmse, rmse};
pub use sweep::{candidate_grid, select_best, ValidationScore};
