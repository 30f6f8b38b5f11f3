//! Named simulation configuration registry.
//!
//! Each experiment run selects one `SimulationConfig` by string key
//! (`--config`). Keys double as `sim_id`, which feeds into checkpoint
//! naming together with the config content hash.

use std::collections::BTreeMap;

use yinguo_algo::SimulationConfig;

use crate::error::RunnerError;

pub struct Registry {
    configs: BTreeMap<String, SimulationConfig>,
}

impl Registry {
    /// 内置实验配置表
    pub fn builtin() -> Self {
        let mut configs = BTreeMap::new();

        let mut add = |key: &str, config: SimulationConfig| {
            configs.insert(
                key.to_string(),
                SimulationConfig {
                    sim_id: key.to_string(),
                    ..config
                },
            );
        };

        add("n_confounder_10_linear", SimulationConfig::default());
        add(
            "n_confounder_10_nonlinear",
            SimulationConfig {
                linear: false,
                ..Default::default()
            },
        );
        add(
            "n_confounder_20_linear",
            SimulationConfig {
                n_confounder: 20,
                ..Default::default()
            },
        );
        add(
            "n_confounder_2_linear",
            SimulationConfig {
                n_confounder: 2,
                ..Default::default()
            },
        );
        add(
            "sample_size_2000",
            SimulationConfig {
                sample_size: 2000,
                ..Default::default()
            },
        );
        add(
            "sample_size_5000",
            SimulationConfig {
                sample_size: 5000,
                ..Default::default()
            },
        );
        add(
            "confounding_level_2",
            SimulationConfig {
                confounding_level: 2.0,
                ..Default::default()
            },
        );
        add(
            "interaction_linear",
            SimulationConfig {
                outcome_interaction: true,
                ..Default::default()
            },
        );
        add(
            "interaction_nonlinear",
            SimulationConfig {
                outcome_interaction: true,
                linear: false,
                ..Default::default()
            },
        );
        add(
            "n_cause_3_flip_2",
            SimulationConfig {
                n_cause: 3,
                n_flip: 2,
                ..Default::default()
            },
        );
        add(
            "train_1000",
            SimulationConfig {
                sample_size_train: 1000,
                ..Default::default()
            },
        );

        Self { configs }
    }

    pub fn get(&self, key: &str) -> Result<&SimulationConfig, RunnerError> {
        self.configs
            .get(key)
            .ok_or_else(|| RunnerError::UnknownConfig(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(|k| k.as_str())
    }
}
