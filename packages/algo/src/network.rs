//! Propensity & Outcome Networks
//!
//! Single-hidden-layer estimators over flat `Vec<f64>` parameter blocks,
//! fitted by minibatch gradient descent. The propensity network carries
//! sigmoid heads (one per cause) under a summed cross-entropy loss; the
//! outcome regression carries a linear head under a (optionally
//! per-example weighted) squared-error loss.
//!
//! Derived reweighting quantities (inverse-probability and overlap
//! weights) involve no gradient state: they are plain functions of the
//! fitted propensities and the observed assignments.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::dataset::TensorDataset;
use crate::sanitize::{clamp_propensity, sigmoid};
use crate::types::{EPSILON, MAX_WEIGHT};

// ==================== Shared MLP plumbing ====================

/// 可序列化的参数快照（训练器保存/恢复最优验证状态用）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub w1: Vec<f64>,
    pub b1: Vec<f64>,
    pub w2: Vec<f64>,
    pub b2: Vec<f64>,
}

/// Models the epoch driver can fit: batch gradient step, validation
/// loss, and parameter snapshot/restore.
pub trait SupervisedModel {
    /// 对给定行执行一次累积梯度下降步，返回批内平均损失
    fn train_batch(&mut self, ds: &TensorDataset, rows: &[usize], lr: f64) -> f64;

    /// 整个数据集上的平均损失
    fn validation_loss(&self, ds: &TensorDataset) -> f64;

    fn snapshot(&self) -> ModelState;

    fn restore(&mut self, state: &ModelState);
}

/// 单隐层感知机：h = tanh(W1 x + b1)，o = W2 h + b2
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Mlp {
    n_in: usize,
    n_hidden: usize,
    n_out: usize,
    /// n_hidden x n_in
    w1: Vec<f64>,
    b1: Vec<f64>,
    /// n_out x n_hidden
    w2: Vec<f64>,
    b2: Vec<f64>,
}

struct Grads {
    w1: Vec<f64>,
    b1: Vec<f64>,
    w2: Vec<f64>,
    b2: Vec<f64>,
}

impl Mlp {
    /// Xavier 初始化：std = sqrt(2 / (fan_in + fan_out))
    fn new(n_in: usize, n_hidden: usize, n_out: usize, rng: &mut ChaCha8Rng) -> Self {
        let std1 = (2.0 / (n_in + n_hidden) as f64).sqrt();
        let std2 = (2.0 / (n_hidden + n_out) as f64).sqrt();
        let w1 = (0..n_hidden * n_in)
            .map(|_| rng.sample::<f64, _>(StandardNormal) * std1)
            .collect();
        let w2 = (0..n_out * n_hidden)
            .map(|_| rng.sample::<f64, _>(StandardNormal) * std2)
            .collect();
        Self {
            n_in,
            n_hidden,
            n_out,
            w1,
            b1: vec![0.0; n_hidden],
            w2,
            b2: vec![0.0; n_out],
        }
    }

    fn forward(&self, x: &[f64], hidden: &mut [f64], out: &mut [f64]) {
        for h in 0..self.n_hidden {
            let mut z = self.b1[h];
            let row = &self.w1[h * self.n_in..(h + 1) * self.n_in];
            for (w, xi) in row.iter().zip(x.iter()) {
                z += w * xi;
            }
            hidden[h] = z.tanh();
        }
        for k in 0..self.n_out {
            let mut z = self.b2[k];
            let row = &self.w2[k * self.n_hidden..(k + 1) * self.n_hidden];
            for (w, hi) in row.iter().zip(hidden.iter()) {
                z += w * hi;
            }
            out[k] = z;
        }
    }

    fn zero_grads(&self) -> Grads {
        Grads {
            w1: vec![0.0; self.w1.len()],
            b1: vec![0.0; self.b1.len()],
            w2: vec![0.0; self.w2.len()],
            b2: vec![0.0; self.b2.len()],
        }
    }

    /// 反向传播一行样本，梯度累积进 grads
    fn accumulate(&self, x: &[f64], hidden: &[f64], delta_out: &[f64], grads: &mut Grads) {
        for k in 0..self.n_out {
            let d = delta_out[k];
            grads.b2[k] += d;
            let row = &mut grads.w2[k * self.n_hidden..(k + 1) * self.n_hidden];
            for (g, hi) in row.iter_mut().zip(hidden.iter()) {
                *g += d * hi;
            }
        }
        for h in 0..self.n_hidden {
            let mut back = 0.0;
            for k in 0..self.n_out {
                back += self.w2[k * self.n_hidden + h] * delta_out[k];
            }
            let dh = back * (1.0 - hidden[h] * hidden[h]);
            grads.b1[h] += dh;
            let row = &mut grads.w1[h * self.n_in..(h + 1) * self.n_in];
            for (g, xi) in row.iter_mut().zip(x.iter()) {
                *g += dh * xi;
            }
        }
    }

    /// 按批大小归一后应用一步 SGD
    fn step(&mut self, grads: &Grads, lr: f64, batch: usize) {
        let scale = lr / batch.max(1) as f64;
        for (w, g) in self.w1.iter_mut().zip(grads.w1.iter()) {
            *w -= scale * g;
        }
        for (b, g) in self.b1.iter_mut().zip(grads.b1.iter()) {
            *b -= scale * g;
        }
        for (w, g) in self.w2.iter_mut().zip(grads.w2.iter()) {
            *w -= scale * g;
        }
        for (b, g) in self.b2.iter_mut().zip(grads.b2.iter()) {
            *b -= scale * g;
        }
    }

    fn snapshot(&self) -> ModelState {
        ModelState {
            w1: self.w1.clone(),
            b1: self.b1.clone(),
            w2: self.w2.clone(),
            b2: self.b2.clone(),
        }
    }

    fn restore(&mut self, state: &ModelState) {
        debug_assert_eq!(state.w1.len(), self.w1.len());
        debug_assert_eq!(state.w2.len(), self.w2.len());
        self.w1.copy_from_slice(&state.w1);
        self.b1.copy_from_slice(&state.b1);
        self.w2.copy_from_slice(&state.w2);
        self.b2.copy_from_slice(&state.b2);
    }
}

// ==================== Propensity Network ====================

/// 倾向网络：混杂 -> 各处理变量的指派概率
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropensityNetwork {
    mlp: Mlp,
    n_confounder: usize,
    n_cause: usize,
}

impl PropensityNetwork {
    pub fn new(n_confounder: usize, n_cause: usize, n_hidden: usize, rng: &mut ChaCha8Rng) -> Self {
        Self {
            mlp: Mlp::new(n_confounder, n_hidden.max(1), n_cause, rng),
            n_confounder,
            n_cause,
        }
    }

    /// 原始 sigmoid 概率（训练用，不收缩）
    fn raw_probs(&self, conf_row: &[f64], hidden: &mut [f64], out: &mut [f64]) {
        self.mlp.forward(conf_row, hidden, out);
        for o in out.iter_mut() {
            *o = sigmoid(*o);
        }
    }

    /// 收缩后的各处理倾向概率
    pub fn propensities(&self, conf_row: &[f64]) -> Vec<f64> {
        let mut hidden = vec![0.0; self.mlp.n_hidden];
        let mut out = vec![0.0; self.n_cause];
        self.raw_probs(conf_row, &mut hidden, &mut out);
        out.into_iter().map(clamp_propensity).collect()
    }

    /// 观测指派的似然 P(T = y | x)，逐处理变量连乘（收缩后）
    pub fn observed_likelihood(&self, conf_row: &[f64], cause_row: &[f64]) -> f64 {
        let probs = self.propensities(conf_row);
        let mut lik = 1.0;
        for (p, &y) in probs.iter().zip(cause_row.iter()) {
            lik *= if y > 0.5 { *p } else { 1.0 - *p };
        }
        lik
    }

    /// 逆概率权重：1 / P(T = y | x)，截断于 MAX_WEIGHT
    pub fn ipw_weights(&self, x: &[f64], y: &[f64], rows: usize) -> Vec<f64> {
        (0..rows)
            .map(|r| {
                let lik = self.observed_likelihood(
                    &x[r * self.n_confounder..(r + 1) * self.n_confounder],
                    &y[r * self.n_cause..(r + 1) * self.n_cause],
                );
                (1.0 / lik.max(EPSILON)).min(MAX_WEIGHT)
            })
            .collect()
    }

    /// 重叠权重：相反指派的概率 P(T = 1 - y | x)。
    ///
    /// 落在 [0, 1] 内，必然小于对应的逆概率权重，从而抑制极端倾向样本的
    /// 方差贡献。权重是拟合后倾向的纯函数，不携带任何梯度状态。
    pub fn overlap_weights(&self, x: &[f64], y: &[f64], rows: usize) -> Vec<f64> {
        (0..rows)
            .map(|r| {
                let probs =
                    self.propensities(&x[r * self.n_confounder..(r + 1) * self.n_confounder]);
                let cause_row = &y[r * self.n_cause..(r + 1) * self.n_cause];
                let mut w = 1.0;
                for (p, &yv) in probs.iter().zip(cause_row.iter()) {
                    w *= if yv > 0.5 { 1.0 - *p } else { *p };
                }
                w
            })
            .collect()
    }
}

impl SupervisedModel for PropensityNetwork {
    fn train_batch(&mut self, ds: &TensorDataset, rows: &[usize], lr: f64) -> f64 {
        debug_assert_eq!(ds.feature_dim, self.n_confounder);
        debug_assert_eq!(ds.label_dim, self.n_cause);
        let mut grads = self.mlp.zero_grads();
        let mut hidden = vec![0.0; self.mlp.n_hidden];
        let mut probs = vec![0.0; self.n_cause];
        let mut delta = vec![0.0; self.n_cause];
        let mut loss = 0.0;

        for &r in rows {
            let x = ds.feature_row(r);
            let y = ds.label_row(r);
            self.raw_probs(x, &mut hidden, &mut probs);
            for j in 0..self.n_cause {
                // 交叉熵损失，sigmoid 下梯度简化为 p - y
                loss += -y[j] * (probs[j] + EPSILON).ln()
                    - (1.0 - y[j]) * (1.0 - probs[j] + EPSILON).ln();
                delta[j] = probs[j] - y[j];
            }
            self.mlp.accumulate(x, &hidden, &delta, &mut grads);
        }
        self.mlp.step(&grads, lr, rows.len());
        loss / rows.len().max(1) as f64
    }

    fn validation_loss(&self, ds: &TensorDataset) -> f64 {
        let mut hidden = vec![0.0; self.mlp.n_hidden];
        let mut probs = vec![0.0; self.n_cause];
        let mut loss = 0.0;
        for r in 0..ds.rows {
            let y = ds.label_row(r);
            self.raw_probs(ds.feature_row(r), &mut hidden, &mut probs);
            for j in 0..self.n_cause {
                loss += -y[j] * (probs[j] + EPSILON).ln()
                    - (1.0 - y[j]) * (1.0 - probs[j] + EPSILON).ln();
            }
        }
        loss / ds.rows.max(1) as f64
    }

    fn snapshot(&self) -> ModelState {
        self.mlp.snapshot()
    }

    fn restore(&mut self, state: &ModelState) {
        self.mlp.restore(state);
    }
}

// ==================== Outcome Regression ====================

/// 结果回归网络：(混杂 [, 主成分], 处理 [, 权重]) -> 连续结果
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutcomeRegression {
    mlp: Mlp,
    n_input: usize,
    n_outcome: usize,
    /// true 时特征末列为样本权重，损失按权重缩放
    weighted: bool,
}

impl OutcomeRegression {
    pub fn new(
        n_input: usize,
        n_outcome: usize,
        n_hidden: usize,
        weighted: bool,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        Self {
            mlp: Mlp::new(n_input, n_hidden.max(1), n_outcome, rng),
            n_input,
            n_outcome,
            weighted,
        }
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    fn expected_dim(&self) -> usize {
        self.n_input + usize::from(self.weighted)
    }

    fn row_weight(&self, feature_row: &[f64]) -> f64 {
        if self.weighted {
            feature_row[self.n_input]
        } else {
            1.0
        }
    }

    /// 整表前向预测，返回 rows x n_outcome（权重列不参与前向）
    pub fn predict(&self, ds: &TensorDataset) -> Vec<f64> {
        debug_assert_eq!(ds.feature_dim, self.expected_dim());
        let mut hidden = vec![0.0; self.mlp.n_hidden];
        let mut out = vec![0.0; self.n_outcome];
        let mut y_hat = Vec::with_capacity(ds.rows * self.n_outcome);
        for r in 0..ds.rows {
            let x = &ds.feature_row(r)[..self.n_input];
            self.mlp.forward(x, &mut hidden, &mut out);
            y_hat.extend_from_slice(&out);
        }
        y_hat
    }
}

impl SupervisedModel for OutcomeRegression {
    fn train_batch(&mut self, ds: &TensorDataset, rows: &[usize], lr: f64) -> f64 {
        debug_assert_eq!(ds.feature_dim, self.expected_dim());
        debug_assert_eq!(ds.label_dim, self.n_outcome);
        let mut grads = self.mlp.zero_grads();
        let mut hidden = vec![0.0; self.mlp.n_hidden];
        let mut out = vec![0.0; self.n_outcome];
        let mut delta = vec![0.0; self.n_outcome];
        let mut loss = 0.0;

        for &r in rows {
            let full = ds.feature_row(r);
            let x = &full[..self.n_input];
            let w = self.row_weight(full);
            let y = ds.label_row(r);
            self.mlp.forward(x, &mut hidden, &mut out);
            for k in 0..self.n_outcome {
                let err = out[k] - y[k];
                loss += w * err * err;
                delta[k] = 2.0 * w * err;
            }
            self.mlp.accumulate(x, &hidden, &delta, &mut grads);
        }
        self.mlp.step(&grads, lr, rows.len());
        loss / rows.len().max(1) as f64
    }

    fn validation_loss(&self, ds: &TensorDataset) -> f64 {
        let mut hidden = vec![0.0; self.mlp.n_hidden];
        let mut out = vec![0.0; self.n_outcome];
        let mut loss = 0.0;
        for r in 0..ds.rows {
            let full = ds.feature_row(r);
            let w = self.row_weight(full);
            self.mlp.forward(&full[..self.n_input], &mut hidden, &mut out);
            for (k, &yk) in ds.label_row(r).iter().enumerate() {
                let err = out[k] - yk;
                loss += w * err * err;
            }
        }
        loss / ds.rows.max(1) as f64
    }

    fn snapshot(&self) -> ModelState {
        self.mlp.snapshot()
    }

    fn restore(&mut self, state: &ModelState) {
        self.mlp.restore(state);
    }
}
