//! Checkpoint storage.
//!
//! Each run owns the directory `{root}/{model_id}_{sim_id}_{hash}_model/`
//! where `hash` is a content hash of the full `SimulationConfig`:
//! different configurations can never collide on a stale directory, and
//! cleanup is idempotent. A failure to remove an old directory is
//! logged and the run proceeds (the fresh hash key makes stale-file
//! reuse impossible).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use yinguo_algo::{HyperparamCandidate, ModelState, SimulationConfig};

use crate::error::RunnerError;

/// Selected best candidate plus its parameters, persisted as `best.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BestCheckpoint {
    pub candidate: HyperparamCandidate,
    pub state: ModelState,
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// 配置内容哈希（SHA-256 截取 12 个十六进制字符）
    pub fn run_id(config: &SimulationConfig) -> String {
        let bytes = serde_json::to_vec(config).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        let mut id = hex::encode(digest);
        id.truncate(12);
        id
    }

    /// 打开（`fresh` 时先销毁重建）一个运行目录
    pub fn open(
        root: &Path,
        model_id: &str,
        config: &SimulationConfig,
        fresh: bool,
    ) -> Result<Self, RunnerError> {
        let dir = root.join(format!(
            "{}_{}_{}_model",
            model_id,
            config.sim_id,
            Self::run_id(config)
        ));
        if fresh {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    // 清理失败不阻塞运行
                    tracing::warn!(path = %dir.display(), error = %e, "failed to remove stale checkpoint dir");
                }
            }
        }
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_candidate(
        &self,
        tag: &str,
        itr: usize,
        state: &ModelState,
    ) -> Result<(), RunnerError> {
        self.write_json(&format!("{tag}_itr_{itr}.json"), state)
    }

    pub fn load_candidate(&self, tag: &str, itr: usize) -> Result<ModelState, RunnerError> {
        self.read_json(&format!("{tag}_itr_{itr}.json"))
    }

    /// 具名状态（例如倾向网络）
    pub fn save_named(&self, name: &str, state: &ModelState) -> Result<(), RunnerError> {
        self.write_json(&format!("{name}.json"), state)
    }

    pub fn save_best(&self, best: &BestCheckpoint) -> Result<(), RunnerError> {
        self.write_json("best.json", best)
    }

    pub fn load_best(&self) -> Result<BestCheckpoint, RunnerError> {
        self.read_json("best.json")
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), RunnerError> {
        let path = self.dir.join(name);
        let bytes = serde_json::to_vec(value)?;
        fs::write(&path, bytes)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T, RunnerError> {
        let path = self.dir.join(name);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RunnerError::MissingCheckpoint(path))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// 独立 JSON 文件落盘（`--save-data` 的特征/权重/生成器文件）
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), RunnerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec(value)?;
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_stable_and_content_sensitive() {
        let config = SimulationConfig::default();
        assert_eq!(CheckpointStore::run_id(&config), CheckpointStore::run_id(&config));

        let changed = SimulationConfig {
            sample_size: 2000,
            ..config.clone()
        };
        assert_ne!(CheckpointStore::run_id(&config), CheckpointStore::run_id(&changed));
        assert_eq!(CheckpointStore::run_id(&config).len(), 12);
    }
}
