//! End-to-end pipeline tests over small configurations.

use tempfile::TempDir;
use yinguo_algo::{ModelState, SimulationConfig};
use yinguo_runner::checkpoint::{BestCheckpoint, CheckpointStore};
use yinguo_runner::pipeline::{bmc, overlap, PipelineOutcome, RunOptions};

fn small_config(sim_id: &str) -> SimulationConfig {
    SimulationConfig {
        sim_id: sim_id.to_string(),
        n_confounder: 2,
        n_cause: 2,
        n_outcome: 1,
        sample_size: 300,
        ..Default::default()
    }
}

fn test_options(root: &TempDir) -> RunOptions {
    RunOptions {
        max_epoch: 20,
        propensity_max_epoch: 200,
        model_root: root.path().join("model"),
        data_root: root.path().join("data"),
        ..Default::default()
    }
}

#[test]
fn overlap_pipeline_end_to_end() {
    let root = TempDir::new().unwrap();
    let config = SimulationConfig {
        sample_size: 1000,
        ..small_config("e2e_overlap")
    };
    let options = test_options(&root);

    match overlap::run_overlap(&config, &options, false).unwrap() {
        PipelineOutcome::Report(report) => {
            assert!(report.cate_rmse.is_finite() && report.cate_rmse >= 0.0);
            assert!(report.cate_rmse_sd.is_finite() && report.cate_rmse_sd >= 0.0);
            assert!(report.rmse_all.is_finite() && report.rmse_all >= 0.0);
            assert!(report.rmse_all_sd.is_finite() && report.rmse_all_sd >= 0.0);
            assert!(report.rmse_mean_baseline.is_finite());
            // best iteration id comes from the 5-candidate grid
            assert!(report.best.itr < 5);
        }
        other => panic!("expected full report, got {other:?}"),
    }

    // per-candidate checkpoints plus the selected best exist
    let store = CheckpointStore::open(&options.model_root, "IPWO", &config, false).unwrap();
    assert!(store.dir().join("best.json").exists());
    assert!(store.dir().join("propensity.json").exists());
    let best = store.load_best().unwrap();
    assert!(best.candidate.itr < 5);
}

#[test]
fn overlap_pipeline_reproducible_best_choice() {
    // 同一配置重复运行选择同一候选（确定性随机源）
    let config = small_config("e2e_repro");

    let root_a = TempDir::new().unwrap();
    let a = overlap::run_overlap(&config, &test_options(&root_a), false).unwrap();
    let root_b = TempDir::new().unwrap();
    let b = overlap::run_overlap(&config, &test_options(&root_b), false).unwrap();

    match (a, b) {
        (PipelineOutcome::Report(ra), PipelineOutcome::Report(rb)) => {
            assert_eq!(ra.best, rb.best);
            assert_eq!(ra.cate_rmse, rb.cate_rmse);
            assert_eq!(ra.rmse_all, rb.rmse_all);
        }
        other => panic!("expected two reports, got {other:?}"),
    }
}

#[test]
fn overlap_save_data_short_circuits() {
    let root = TempDir::new().unwrap();
    let config = small_config("e2e_save");
    let options = test_options(&root);

    match overlap::run_overlap(&config, &options, true).unwrap() {
        PipelineOutcome::DataSaved => {}
        other => panic!("expected DataSaved, got {other:?}"),
    }
    assert!(options.data_root.join("e2e_save_IPWO_x.json").exists());
    assert!(options.data_root.join("e2e_save_IPWO_w.json").exists());
    assert!(options.data_root.join("e2e_save.json").exists());
}

#[test]
fn overlap_eval_delta_sweeps_all_flips() {
    let root = TempDir::new().unwrap();
    let config = small_config("e2e_delta");
    let options = RunOptions {
        eval_delta: true,
        ..test_options(&root)
    };

    match overlap::run_overlap(&config, &options, false).unwrap() {
        PipelineOutcome::DeltaSweep(flips) => {
            assert_eq!(flips.len(), config.n_cause);
            for (i, flip) in flips.iter().enumerate() {
                assert_eq!(flip.n_flip, i + 1);
                assert!(flip.rmse.is_finite() && flip.rmse >= 0.0);
                assert!(flip.rmse_sd.is_finite() && flip.rmse_sd >= 0.0);
            }
        }
        other => panic!("expected delta sweep, got {other:?}"),
    }
}

#[test]
fn bmc_pipeline_with_ensemble_round() {
    let root = TempDir::new().unwrap();
    let config = small_config("e2e_bmc");
    let options = test_options(&root);

    match bmc::run_bmc(&config, &options, 1).unwrap() {
        PipelineOutcome::Report(report) => {
            assert!(report.cate_rmse.is_finite() && report.cate_rmse >= 0.0);
            assert!(report.rmse_all.is_finite());
            assert!(report.rmse_mean_baseline.is_finite());
            assert!(report.best.itr < 5);
        }
        other => panic!("expected full report, got {other:?}"),
    }

    // 两轮的候选检查点都在同一个运行目录下
    let store = CheckpointStore::open(&options.model_root, "BMC", &config, false).unwrap();
    assert!(store.dir().join("round0_itr_0.json").exists());
    assert!(store.dir().join("round1_itr_0.json").exists());
    assert!(store.dir().join("best.json").exists());
}

#[test]
fn checkpoint_store_roundtrip_and_fresh_recreate() {
    let root = TempDir::new().unwrap();
    let config = small_config("ckpt");

    let store = CheckpointStore::open(root.path(), "IPWO", &config, true).unwrap();
    let state = ModelState {
        w1: vec![1.0, 2.0],
        b1: vec![0.5],
        w2: vec![3.0],
        b2: vec![0.1],
    };
    store.save_candidate("or", 3, &state).unwrap();
    assert_eq!(store.load_candidate("or", 3).unwrap(), state);

    let best = BestCheckpoint {
        candidate: yinguo_algo::candidate_grid(5, 2, 0.5)[3].clone(),
        state: state.clone(),
    };
    store.save_best(&best).unwrap();
    assert_eq!(store.load_best().unwrap().candidate.itr, 3);

    // 重新以 fresh 打开会清空目录
    let store = CheckpointStore::open(root.path(), "IPWO", &config, true).unwrap();
    assert!(store.load_best().is_err());
    assert!(store.load_candidate("or", 3).is_err());
}

#[test]
fn real_data_config_is_rejected() {
    let root = TempDir::new().unwrap();
    let config = SimulationConfig {
        real_data: true,
        ..small_config("real")
    };
    assert!(overlap::run_overlap(&config, &test_options(&root), false).is_err());
    assert!(bmc::run_bmc(&config, &test_options(&root), 0).is_err());
}
