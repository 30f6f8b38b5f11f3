//! Model Trainer
//!
//! Minibatch-SGD epoch driver shared by the propensity and outcome
//! stages. Tracks the best validation snapshot and restores it when
//! training finishes, standing in for periodic checkpoint files; the
//! runner persists the returned state. Non-finite losses abort the
//! candidate and report divergence instead of propagating NaN into
//! model selection.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::dataset::TensorDataset;
use crate::network::{ModelState, SupervisedModel};
use crate::sanitize::is_finite_loss;
use crate::sweep::ValidationScore;

/// 训练轮次驱动器
#[derive(Clone, Debug)]
pub struct ModelTrainer {
    pub batch_size: usize,
    pub max_epoch: usize,
    /// 每隔多少轮评估一次验证损失
    pub eval_every: usize,
}

/// 一次训练的结果；best 状态已经恢复进模型
#[derive(Clone, Debug)]
pub struct TrainReport {
    pub score: ValidationScore,
    pub epochs_run: usize,
    pub best_state: Option<ModelState>,
}

impl ModelTrainer {
    pub fn new(batch_size: usize, max_epoch: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_epoch,
            eval_every: 10,
        }
    }

    /// 训练一个模型；打乱顺序来自调用方传入的运行级随机数生成器
    pub fn train<M: SupervisedModel>(
        &self,
        model: &mut M,
        learning_rate: f64,
        train: &TensorDataset,
        valid: &TensorDataset,
        rng: &mut ChaCha8Rng,
    ) -> TrainReport {
        let mut indices: Vec<usize> = (0..train.rows).collect();
        let mut best: Option<(f64, ModelState)> = None;

        for epoch in 0..self.max_epoch {
            indices.shuffle(rng);
            for chunk in indices.chunks(self.batch_size) {
                let loss = model.train_batch(train, chunk, learning_rate);
                if !is_finite_loss(loss) {
                    return TrainReport {
                        score: ValidationScore::Diverged,
                        epochs_run: epoch + 1,
                        best_state: None,
                    };
                }
            }

            if (epoch + 1) % self.eval_every == 0 || epoch + 1 == self.max_epoch {
                let vl = model.validation_loss(valid);
                if !is_finite_loss(vl) {
                    return TrainReport {
                        score: ValidationScore::Diverged,
                        epochs_run: epoch + 1,
                        best_state: None,
                    };
                }
                if best.as_ref().map_or(true, |(b, _)| vl < *b) {
                    best = Some((vl, model.snapshot()));
                }
            }
        }

        match best {
            Some((vl, state)) => {
                model.restore(&state);
                TrainReport {
                    score: ValidationScore::Valid(vl),
                    epochs_run: self.max_epoch,
                    best_state: Some(state),
                }
            }
            // max_epoch 为 0：直接给当前参数打分
            None => {
                let vl = model.validation_loss(valid);
                let score = if is_finite_loss(vl) {
                    ValidationScore::Valid(vl)
                } else {
                    ValidationScore::Diverged
                };
                TrainReport {
                    score,
                    epochs_run: 0,
                    best_state: None,
                }
            }
        }
    }
}
