//! Numeric Sanitization
//!
//! Numerical stability utilities shared by the training loop and the
//! weighting stage.

use crate::types::{EPSILON, PROPENSITY_MAX, PROPENSITY_MIN};

/// 检查数组是否包含无效值 (NaN 或 Inf)
pub fn has_invalid_values(arr: &[f64]) -> bool {
    arr.iter().any(|&x| x.is_nan() || x.is_infinite())
}

/// 训练损失是否仍然有效（发散检测）
pub fn is_finite_loss(loss: f64) -> bool {
    loss.is_finite()
}

/// 将估计的倾向概率收缩到配置的范围内
pub fn clamp_propensity(p: f64) -> f64 {
    if p.is_nan() {
        // 退化估计回退到中性概率
        return 0.5;
    }
    p.clamp(PROPENSITY_MIN, PROPENSITY_MAX)
}

/// Sigmoid 函数（带数值稳定性处理）
pub fn sigmoid(x: f64) -> f64 {
    if x > 20.0 {
        1.0 - EPSILON
    } else if x < -20.0 {
        EPSILON
    } else {
        1.0 / (1.0 + (-x).exp())
    }
}

/// 权重向量必须全部非负且有限
pub fn all_valid_weights(weights: &[f64]) -> bool {
    weights.iter().all(|&w| w.is_finite() && w >= 0.0)
}
