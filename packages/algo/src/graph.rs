//! Causal Graph Sampler
//!
//! Draws a random directed causal structure over confounders, causes
//! (binary treatments) and outcomes. Acyclicity among causes is a
//! construction rule, not a search problem: cause `j` may only draw
//! parents from causes `0..j`, and that ordering invariant is checked
//! explicitly when the graph is assembled.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::types::{SimError, SimulationConfig};

/// 一个处理变量节点：混杂父节点与更早的处理父节点，以及各自的边权
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CauseNode {
    pub confounder_parents: Vec<usize>,
    pub confounder_weights: Vec<f64>,
    /// 仅允许更小下标的处理变量作为父节点
    pub cause_parents: Vec<usize>,
    pub cause_weights: Vec<f64>,
}

/// 一个结果变量节点：混杂主效应、单变量处理效应、两变量交互效应
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutcomeNode {
    /// 每个混杂因子一个权重
    pub confounder_weights: Vec<f64>,
    /// (cause index, weight)
    pub single_effects: Vec<(usize, f64)>,
    /// (cause i, cause j, weight), i < j
    pub pair_effects: Vec<(usize, usize, f64)>,
}

/// Sampled causal structure. Created once per experiment configuration
/// and immutable afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CausalGraph {
    pub n_confounder: usize,
    pub n_cause: usize,
    pub causes: Vec<CauseNode>,
    pub outcomes: Vec<OutcomeNode>,
}

impl CausalGraph {
    /// 按配置采样一张因果图。
    ///
    /// 每条 混杂->处理 边以 `p_confounder_cause` 纳入，每条 更早处理->处理
    /// 边以 `p_cause_cause` 纳入；边权一次性从 N(0, 1) 抽取后不再改变。
    /// 没有父节点的处理变量仅由噪声驱动。
    pub fn sample(config: &SimulationConfig, rng: &mut ChaCha8Rng) -> Result<Self, SimError> {
        let mut causes = Vec::with_capacity(config.n_cause);
        for j in 0..config.n_cause {
            let mut node = CauseNode {
                confounder_parents: Vec::new(),
                confounder_weights: Vec::new(),
                cause_parents: Vec::new(),
                cause_weights: Vec::new(),
            };
            for c in 0..config.n_confounder {
                if rng.gen_bool(config.p_confounder_cause) {
                    node.confounder_parents.push(c);
                    node.confounder_weights.push(rng.sample(StandardNormal));
                }
            }
            for i in 0..j {
                if rng.gen_bool(config.p_cause_cause) {
                    node.cause_parents.push(i);
                    node.cause_weights.push(rng.sample(StandardNormal));
                }
            }
            causes.push(node);
        }

        let mut outcomes = Vec::with_capacity(config.n_outcome);
        for _ in 0..config.n_outcome {
            let confounder_weights: Vec<f64> = (0..config.n_confounder)
                .map(|_| rng.sample::<f64, _>(StandardNormal))
                .collect();

            let mut single_effects = Vec::new();
            for j in 0..config.n_cause {
                if rng.gen_bool(config.p_outcome_single) {
                    single_effects.push((j, rng.sample::<f64, _>(StandardNormal)));
                }
            }

            let mut pair_effects = Vec::new();
            if config.outcome_interaction {
                for i in 0..config.n_cause {
                    for j in (i + 1)..config.n_cause {
                        if rng.gen_bool(config.p_outcome_double) {
                            pair_effects.push((i, j, rng.sample::<f64, _>(StandardNormal)));
                        }
                    }
                }
            }

            outcomes.push(OutcomeNode {
                confounder_weights,
                single_effects,
                pair_effects,
            });
        }

        let graph = Self {
            n_confounder: config.n_confounder,
            n_cause: config.n_cause,
            causes,
            outcomes,
        };
        graph.check_ordering()?;
        Ok(graph)
    }

    /// 显式的无环不变量：处理父节点的下标必须严格小于子节点
    pub fn check_ordering(&self) -> Result<(), SimError> {
        for (child, node) in self.causes.iter().enumerate() {
            for &parent in &node.cause_parents {
                if parent >= child {
                    return Err(SimError::CauseOrdering { child, parent });
                }
            }
        }
        Ok(())
    }
}
