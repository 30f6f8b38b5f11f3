//! Structural Data Generator & Counterfactual Constructor
//!
//! Samples a causal graph, then generates confounder / cause / outcome
//! arrays under the structural mechanism, and re-evaluates that same
//! mechanism under interventions. Per-row noise is drawn exactly once
//! and reused for every counterfactual re-evaluation, so counterfactual
//! comparisons are never contaminated by resampled noise.
//!
//! Treatment combinations are indexed by bit pattern: bit `j` of the
//! combination index is the assignment of cause `j`.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::dataset::{split_indices, Partition, TensorDataset};
use crate::graph::CausalGraph;
use crate::matrix;
use crate::sanitize::sigmoid;
use crate::types::{SimError, SimulationConfig, MAX_NPC};

/// 翻转前 n_flip 个处理变量（固定按下标取前 k 个，跨调用一致）
pub fn flip_causes(assignment: &[f64], n_flip: usize) -> Vec<f64> {
    let mut flipped = assignment.to_vec();
    for v in flipped.iter_mut().take(n_flip) {
        *v = 1.0 - *v;
    }
    flipped
}

/// Synthetic observational dataset with known confounding structure.
///
/// Row count and partition boundaries are fixed at generation time and
/// never reshuffled within a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataGenerator {
    graph: CausalGraph,
    n_confounder: usize,
    n_cause: usize,
    n_outcome: usize,
    sample_size: usize,
    linear: bool,
    train_size: usize,
    val_size: usize,
    /// N x n_confounder
    confounder: Vec<f64>,
    /// N x n_cause，取值 0/1
    cause: Vec<f64>,
    /// N x n_outcome 事实结果
    outcome: Vec<f64>,
    /// N x n_outcome 已缩放的噪声抽样，反事实重算时复用
    outcome_noise: Vec<f64>,
    /// 每个处理组合一个 N x n_outcome 矩阵，共 2^n_cause 个
    outcome_list: Vec<Vec<f64>>,
}

impl DataGenerator {
    /// 生成一份完整的数据集。
    ///
    /// 生成顺序：混杂因子 -> 处理变量（按下标序，经 logistic 链接采样
    /// 二值指示）-> 结果变量（混杂主效应 + 单变量效应 + 交互效应 + 噪声）。
    pub fn new(config: &SimulationConfig, rng: &mut ChaCha8Rng) -> Result<Self, SimError> {
        config.validate()?;

        let n = config.sample_size;
        let n_confounder = config.n_confounder;
        let n_cause = config.n_cause;
        let n_outcome = config.n_outcome;

        let partition = split_indices(n, config.train_frac, config.val_frac)?;
        let graph = CausalGraph::sample(config, rng)?;

        // 混杂因子：独立标准正态
        let confounder: Vec<f64> = (0..n * n_confounder)
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();

        // 处理变量：行内按下标序生成，后面的处理可依赖前面的实现值
        let mut cause = vec![0.0; n * n_cause];
        for r in 0..n {
            for j in 0..n_cause {
                let node = &graph.causes[j];
                let mut conf_term = 0.0;
                for (k, &c) in node.confounder_parents.iter().enumerate() {
                    conf_term += node.confounder_weights[k] * confounder[r * n_confounder + c];
                }
                let mut cause_term = 0.0;
                for (k, &i) in node.cause_parents.iter().enumerate() {
                    cause_term += node.cause_weights[k] * cause[r * n_cause + i];
                }
                let mut agg = config.confounding_level * conf_term + cause_term;
                if !config.linear {
                    agg = agg.tanh();
                }
                let latent = agg + config.cause_noise * rng.sample::<f64, _>(StandardNormal);
                let p = sigmoid(latent);
                cause[r * n_cause + j] = if rng.gen::<f64>() < p { 1.0 } else { 0.0 };
            }
        }

        // 结果噪声：每行每个结果变量抽一次，之后反事实重算复用
        let outcome_noise: Vec<f64> = (0..n * n_outcome)
            .map(|_| config.outcome_noise * rng.sample::<f64, _>(StandardNormal))
            .collect();

        let mut gen = Self {
            graph,
            n_confounder,
            n_cause,
            n_outcome,
            sample_size: n,
            linear: config.linear,
            train_size: partition.train_size(),
            val_size: partition.valid_size(),
            confounder,
            cause,
            outcome: Vec::new(),
            outcome_noise,
            outcome_list: Vec::new(),
        };

        // 事实结果
        let mut outcome = vec![0.0; n * n_outcome];
        let mut buf = vec![0.0; n_outcome];
        for r in 0..n {
            let assignment = gen.cause[r * n_cause..(r + 1) * n_cause].to_vec();
            gen.mechanism(r, &assignment, &mut buf);
            for k in 0..n_outcome {
                outcome[r * n_outcome + k] = buf[k] + gen.outcome_noise[r * n_outcome + k];
            }
        }
        gen.outcome = outcome;

        // 全部 2^n_cause 个处理组合下的真值（混杂与噪声保持不变）
        let n_combo = 1usize << n_cause;
        let mut outcome_list = Vec::with_capacity(n_combo);
        let mut assignment = vec![0.0; n_cause];
        for combo in 0..n_combo {
            combo_assignment(combo, &mut assignment);
            let mut mat = vec![0.0; n * n_outcome];
            for r in 0..n {
                gen.mechanism(r, &assignment, &mut buf);
                for k in 0..n_outcome {
                    mat[r * n_outcome + k] = buf[k] + gen.outcome_noise[r * n_outcome + k];
                }
            }
            outcome_list.push(mat);
        }
        gen.outcome_list = outcome_list;

        Ok(gen)
    }

    /// 结构方程（不含噪声）：给定混杂行与处理赋值，写出各结果变量的值
    fn mechanism(&self, row: usize, assignment: &[f64], out: &mut [f64]) {
        let conf_row = &self.confounder[row * self.n_confounder..(row + 1) * self.n_confounder];
        for (k, node) in self.graph.outcomes.iter().enumerate() {
            let mut conf_term = 0.0;
            for (c, &w) in node.confounder_weights.iter().enumerate() {
                conf_term += w * conf_row[c];
            }
            if !self.linear {
                conf_term = conf_term.tanh();
            }
            let mut value = conf_term;
            for &(j, w) in &node.single_effects {
                value += w * assignment[j];
            }
            for &(i, j, w) in &node.pair_effects {
                value += w * assignment[i] * assignment[j];
            }
            out[k] = value;
        }
    }

    // ==================== Accessors ====================

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn train_size(&self) -> usize {
        self.train_size
    }

    pub fn val_size(&self) -> usize {
        self.val_size
    }

    pub fn eval_size(&self) -> usize {
        self.sample_size - self.train_size - self.val_size
    }

    pub fn n_confounder(&self) -> usize {
        self.n_confounder
    }

    pub fn n_cause(&self) -> usize {
        self.n_cause
    }

    pub fn n_outcome(&self) -> usize {
        self.n_outcome
    }

    /// 处理组合总数 2^n_cause
    pub fn n_combo(&self) -> usize {
        self.outcome_list.len()
    }

    pub fn graph(&self) -> &CausalGraph {
        &self.graph
    }

    pub fn confounder(&self) -> &[f64] {
        &self.confounder
    }

    pub fn cause(&self) -> &[f64] {
        &self.cause
    }

    pub fn outcome(&self) -> &[f64] {
        &self.outcome
    }

    fn partition(&self) -> Partition {
        Partition {
            train: 0..self.train_size,
            valid: self.train_size..self.train_size + self.val_size,
            eval: self.train_size + self.val_size..self.sample_size,
        }
    }

    // ==================== Dataset views ====================

    /// 倾向视图：(混杂) -> 处理指示标签，按分区切成三份
    pub fn generate_dataset_propensity(
        &self,
    ) -> (TensorDataset, TensorDataset, TensorDataset) {
        let full = TensorDataset::new(
            self.confounder.clone(),
            self.cause.clone(),
            self.sample_size,
            self.n_confounder,
            self.n_cause,
        );
        let p = self.partition();
        (
            full.slice_rows(p.train),
            full.slice_rows(p.valid),
            full.slice_rows(p.eval),
        )
    }

    /// 倾向视图的整表 (x, y)，用于对全部行计算权重
    pub fn propensity_matrix(&self) -> (&[f64], &[f64]) {
        (&self.confounder, &self.cause)
    }

    /// 事实特征 [混杂 | 处理 (| 权重)]，标签为事实结果，覆盖全部行
    pub fn factual_features(&self, weight: Option<&[f64]>) -> Result<TensorDataset, SimError> {
        self.build_features(None, weight)
    }

    /// 结果视图：(混杂, 处理[, 权重]) -> 结果标签
    pub fn generate_dataset(
        &self,
        weight: Option<&[f64]>,
    ) -> Result<(TensorDataset, TensorDataset, TensorDataset), SimError> {
        let full = self.build_features(None, weight)?;
        let p = self.partition();
        Ok((
            full.slice_rows(p.train),
            full.slice_rows(p.valid),
            full.slice_rows(p.eval),
        ))
    }

    /// 集成管线的结果视图：混杂表示后附 npc 个主成分得分特征
    pub fn generate_dataset_bmc(
        &self,
        npc: usize,
    ) -> Result<(TensorDataset, TensorDataset, TensorDataset), SimError> {
        let scores = self.pc_scores(npc);
        let full = self.build_features(Some(&scores), None)?;
        let p = self.partition();
        Ok((
            full.slice_rows(p.train),
            full.slice_rows(p.valid),
            full.slice_rows(p.eval),
        ))
    }

    /// 主成分得分（成分与均值从训练分区估计，得分对全部行计算）
    fn pc_scores(&self, npc: usize) -> Vec<f64> {
        let npc = npc.min(MAX_NPC).min(self.n_confounder);
        let train_rows = self.train_size;
        let train_data = &self.confounder[..train_rows * self.n_confounder];
        let components = matrix::principal_components(train_data, train_rows, self.n_confounder, npc);
        let means = matrix::column_means(train_data, train_rows, self.n_confounder);
        matrix::project(
            &self.confounder,
            self.sample_size,
            self.n_confounder,
            &components,
            npc,
            &means,
        )
    }

    /// 拼接一张 [混杂 (| 主成分) | 处理 (| 权重)] 的特征表
    fn build_features(
        &self,
        pc_scores: Option<&[f64]>,
        weight: Option<&[f64]>,
    ) -> Result<TensorDataset, SimError> {
        if let Some(w) = weight {
            if w.len() != self.sample_size {
                return Err(SimError::Shape(format!(
                    "weight vector has {} entries, expected {}",
                    w.len(),
                    self.sample_size
                )));
            }
        }
        let npc = pc_scores.map(|s| s.len() / self.sample_size).unwrap_or(0);
        let weight_cols = usize::from(weight.is_some());
        let dim = self.n_confounder + npc + self.n_cause + weight_cols;

        let mut features = Vec::with_capacity(self.sample_size * dim);
        for r in 0..self.sample_size {
            features.extend_from_slice(
                &self.confounder[r * self.n_confounder..(r + 1) * self.n_confounder],
            );
            if let Some(scores) = pc_scores {
                features.extend_from_slice(&scores[r * npc..(r + 1) * npc]);
            }
            features.extend_from_slice(&self.cause[r * self.n_cause..(r + 1) * self.n_cause]);
            if let Some(w) = weight {
                features.push(w[r]);
            }
        }
        Ok(TensorDataset::new(
            features,
            self.outcome.clone(),
            self.sample_size,
            dim,
            self.n_outcome,
        ))
    }

    // ==================== Counterfactual construction ====================

    /// 对评估分区构造干预特征与真实 CATE。
    ///
    /// 干预固定翻转前 `n_flip` 个处理变量；结果在同一套每行噪声下重算，
    /// 返回 (干预特征, 真实结果差)。`n_flip = 0` 是恒等干预，CATE 恒为 0。
    pub fn generate_counterfactual_test(
        &self,
        n_flip: usize,
        weight: Option<&[f64]>,
    ) -> Result<(TensorDataset, Vec<f64>), SimError> {
        self.counterfactual_impl(n_flip, weight, 0)
    }

    /// 集成管线变体：特征中附带主成分得分
    pub fn generate_counterfactual_test_bmc(
        &self,
        n_flip: usize,
        npc: usize,
    ) -> Result<(TensorDataset, Vec<f64>), SimError> {
        self.counterfactual_impl(n_flip, None, npc)
    }

    fn counterfactual_impl(
        &self,
        n_flip: usize,
        weight: Option<&[f64]>,
        npc: usize,
    ) -> Result<(TensorDataset, Vec<f64>), SimError> {
        if n_flip > self.n_cause {
            return Err(SimError::FlipExceedsCauses {
                n_flip,
                n_cause: self.n_cause,
            });
        }
        if let Some(w) = weight {
            if w.len() != self.sample_size {
                return Err(SimError::Shape(format!(
                    "weight vector has {} entries, expected {}",
                    w.len(),
                    self.sample_size
                )));
            }
        }
        let scores = if npc > 0 { Some(self.pc_scores(npc)) } else { None };
        let npc_eff = scores
            .as_ref()
            .map(|s| s.len() / self.sample_size)
            .unwrap_or(0);
        let weight_cols = usize::from(weight.is_some());
        let dim = self.n_confounder + npc_eff + self.n_cause + weight_cols;

        let eval = self.partition().eval;
        let mut features = Vec::with_capacity(eval.len() * dim);
        let mut cate = Vec::with_capacity(eval.len() * self.n_outcome);
        let mut buf = vec![0.0; self.n_outcome];

        for r in eval {
            let factual = &self.cause[r * self.n_cause..(r + 1) * self.n_cause];
            let flipped = flip_causes(factual, n_flip);

            features.extend_from_slice(
                &self.confounder[r * self.n_confounder..(r + 1) * self.n_confounder],
            );
            if let Some(s) = &scores {
                features.extend_from_slice(&s[r * npc_eff..(r + 1) * npc_eff]);
            }
            features.extend_from_slice(&flipped);
            if let Some(w) = weight {
                features.push(w[r]);
            }

            // 同一套噪声下的真实结果差
            self.mechanism(r, &flipped, &mut buf);
            for k in 0..self.n_outcome {
                let y_new = buf[k] + self.outcome_noise[r * self.n_outcome + k];
                cate.push(y_new - self.outcome[r * self.n_outcome + k]);
            }
        }

        let rows = self.eval_size();
        Ok((TensorDataset::new(features, Vec::new(), rows, dim, 0), cate))
    }

    /// 枚举全部处理组合：每个组合一张评估分区的特征表
    pub fn generate_all_treatment_tests(
        &self,
        weight: Option<&[f64]>,
    ) -> Result<Vec<TensorDataset>, SimError> {
        self.all_treatments_impl(weight, 0)
    }

    /// 集成管线变体：特征中附带主成分得分
    pub fn generate_all_treatment_tests_bmc(
        &self,
        npc: usize,
    ) -> Result<Vec<TensorDataset>, SimError> {
        self.all_treatments_impl(None, npc)
    }

    fn all_treatments_impl(
        &self,
        weight: Option<&[f64]>,
        npc: usize,
    ) -> Result<Vec<TensorDataset>, SimError> {
        let scores = if npc > 0 { Some(self.pc_scores(npc)) } else { None };
        let npc_eff = scores
            .as_ref()
            .map(|s| s.len() / self.sample_size)
            .unwrap_or(0);
        let weight_cols = usize::from(weight.is_some());
        if let Some(w) = weight {
            if w.len() != self.sample_size {
                return Err(SimError::Shape(format!(
                    "weight vector has {} entries, expected {}",
                    w.len(),
                    self.sample_size
                )));
            }
        }
        let dim = self.n_confounder + npc_eff + self.n_cause + weight_cols;
        let eval = self.partition().eval;
        let rows = eval.len();

        let mut out = Vec::with_capacity(self.n_combo());
        let mut assignment = vec![0.0; self.n_cause];
        for combo in 0..self.n_combo() {
            combo_assignment(combo, &mut assignment);
            let mut features = Vec::with_capacity(rows * dim);
            for r in eval.clone() {
                features.extend_from_slice(
                    &self.confounder[r * self.n_confounder..(r + 1) * self.n_confounder],
                );
                if let Some(s) = &scores {
                    features.extend_from_slice(&s[r * npc_eff..(r + 1) * npc_eff]);
                }
                features.extend_from_slice(&assignment);
                if let Some(w) = weight {
                    features.push(w[r]);
                }
            }
            out.push(TensorDataset::new(features, Vec::new(), rows, dim, 0));
        }
        Ok(out)
    }

    /// 全部组合真值并排成 N x (2^n_cause * n_outcome) 的矩阵
    pub fn true_outcome_matrix(&self) -> (Vec<f64>, usize) {
        let stride = self.n_combo() * self.n_outcome;
        let mut out = vec![0.0; self.sample_size * stride];
        for (c, mat) in self.outcome_list.iter().enumerate() {
            for r in 0..self.sample_size {
                for k in 0..self.n_outcome {
                    out[r * stride + c * self.n_outcome + k] = mat[r * self.n_outcome + k];
                }
            }
        }
        (out, stride)
    }
}

/// 组合下标的第 j 位即处理变量 j 的赋值
fn combo_assignment(combo: usize, assignment: &mut [f64]) {
    for (j, a) in assignment.iter_mut().enumerate() {
        *a = ((combo >> j) & 1) as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn small_config() -> SimulationConfig {
        SimulationConfig {
            sim_id: "test".to_string(),
            n_confounder: 3,
            n_cause: 2,
            n_outcome: 1,
            sample_size: 200,
            ..Default::default()
        }
    }

    fn generate(config: &SimulationConfig) -> DataGenerator {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        DataGenerator::new(config, &mut rng).unwrap()
    }

    #[test]
    fn test_partition_sums_to_sample_size() {
        let dg = generate(&small_config());
        assert_eq!(dg.train_size() + dg.val_size() + dg.eval_size(), 200);
        assert_eq!(dg.train_size(), 140);
        assert_eq!(dg.val_size(), 20);
        assert_eq!(dg.eval_size(), 40);
    }

    #[test]
    fn test_reproducible_given_seed() {
        // 相同种子的两次独立生成必须逐位一致
        let config = small_config();
        let a = generate(&config);
        let b = generate(&config);
        assert_eq!(a.confounder(), b.confounder());
        assert_eq!(a.cause(), b.cause());
        assert_eq!(a.outcome(), b.outcome());
    }

    #[test]
    fn test_causes_are_binary() {
        let dg = generate(&small_config());
        assert!(dg.cause().iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn test_outcome_list_matches_factual_at_observed_combo() {
        // 观察到的组合下标处的枚举真值必须等于事实结果
        let dg = generate(&small_config());
        for r in 0..dg.sample_size() {
            let mut combo = 0usize;
            for j in 0..dg.n_cause() {
                if dg.cause()[r * dg.n_cause() + j] > 0.5 {
                    combo |= 1 << j;
                }
            }
            let enumerated = dg.outcome_list[combo][r];
            assert!(
                (enumerated - dg.outcome()[r]).abs() < 1e-12,
                "row {r}: enumerated {enumerated} vs factual {}",
                dg.outcome()[r]
            );
        }
    }

    #[test]
    fn test_zero_flip_is_identity_intervention() {
        let dg = generate(&small_config());
        let (features, cate) = dg.generate_counterfactual_test(0, None).unwrap();
        assert_eq!(features.rows, dg.eval_size());
        assert!(cate.iter().all(|&v| v.abs() < 1e-12));

        // 特征与事实评估特征一致
        let (_, _, x_test) = dg.generate_dataset(None).unwrap();
        assert_eq!(features.features, x_test.features);
    }

    #[test]
    fn test_flip_exceeds_causes_is_config_error() {
        let dg = generate(&small_config());
        assert!(matches!(
            dg.generate_counterfactual_test(3, None),
            Err(SimError::FlipExceedsCauses { n_flip: 3, n_cause: 2 })
        ));
    }

    #[test]
    fn test_counterfactual_matches_enumerated_truth() {
        // 翻转后的 CATE 必须与枚举矩阵的差一致（同一套噪声）
        let dg = generate(&small_config());
        let n_flip = 1;
        let (_, cate) = dg.generate_counterfactual_test(n_flip, None).unwrap();
        let eval_start = dg.train_size() + dg.val_size();
        for (i, r) in (eval_start..dg.sample_size()).enumerate() {
            let factual = &dg.cause()[r * 2..r * 2 + 2];
            let flipped = flip_causes(factual, n_flip);
            let combo_f = factual[0] as usize | ((factual[1] as usize) << 1);
            let combo_i = flipped[0] as usize | ((flipped[1] as usize) << 1);
            let expected = dg.outcome_list[combo_i][r] - dg.outcome_list[combo_f][r];
            assert!((cate[i] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_weight_column_appended() {
        let dg = generate(&small_config());
        let weight = vec![0.5; dg.sample_size()];
        let (train, _, x_test) = dg.generate_dataset(Some(&weight)).unwrap();
        assert_eq!(train.feature_dim, 3 + 2 + 1);
        assert_eq!(train.feature_row(0)[5], 0.5);
        assert_eq!(x_test.feature_dim, 6);
    }

    #[test]
    fn test_weight_length_mismatch_rejected() {
        let dg = generate(&small_config());
        let weight = vec![1.0; 3];
        assert!(matches!(
            dg.generate_dataset(Some(&weight)),
            Err(SimError::Shape(_))
        ));
    }

    #[test]
    fn test_bmc_dataset_appends_pc_features() {
        let dg = generate(&small_config());
        let (train, valid, eval) = dg.generate_dataset_bmc(1).unwrap();
        assert_eq!(train.feature_dim, 3 + 1 + 2);
        assert_eq!(valid.feature_dim, train.feature_dim);
        assert_eq!(eval.rows, dg.eval_size());
    }

    #[test]
    fn test_all_treatment_tests_enumerate_combinations() {
        let dg = generate(&small_config());
        let tests = dg.generate_all_treatment_tests(None).unwrap();
        assert_eq!(tests.len(), 4);
        for (combo, ds) in tests.iter().enumerate() {
            assert_eq!(ds.rows, dg.eval_size());
            // 处理列为固定组合赋值
            let row = ds.feature_row(0);
            assert_eq!(row[3], (combo & 1) as f64);
            assert_eq!(row[4], ((combo >> 1) & 1) as f64);
        }
    }

    #[test]
    fn test_true_outcome_matrix_stride() {
        let dg = generate(&small_config());
        let (mat, stride) = dg.true_outcome_matrix();
        assert_eq!(stride, 4);
        assert_eq!(mat.len(), dg.sample_size() * 4);
        // 第 0 列等于组合 0 的真值
        assert!((mat[0] - dg.outcome_list[0][0]).abs() < 1e-12);
    }

    #[test]
    fn test_propensity_view_shapes() {
        let dg = generate(&small_config());
        let (train, valid, eval) = dg.generate_dataset_propensity();
        assert_eq!(train.feature_dim, 3);
        assert_eq!(train.label_dim, 2);
        assert_eq!(train.rows + valid.rows + eval.rows, dg.sample_size());
    }

    proptest! {
        // 翻转两次等于没翻（二值指示上的对合性质）
        #[test]
        fn prop_flip_is_involution(
            bits in proptest::collection::vec(0u8..=1, 1..10),
            n_flip in 0usize..10,
        ) {
            let assignment: Vec<f64> = bits.iter().map(|&b| b as f64).collect();
            let n_flip = n_flip.min(assignment.len());
            let twice = flip_causes(&flip_causes(&assignment, n_flip), n_flip);
            prop_assert_eq!(assignment, twice);
        }
    }
}
