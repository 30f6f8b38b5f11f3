//! BMC pipeline: ensemble rounds over growing training partitions.
//!
//! Each round regenerates the dataset with a larger training partition,
//! appends a small number of principal-component summary features to
//! the confounder representation, and runs an independent hyperparameter
//! sweep. No propensity stage and no weight reuse across rounds; the
//! reported estimator is the best model of the last (largest-data)
//! round.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use yinguo_algo::{DataGenerator, SimulationConfig};

use crate::error::RunnerError;
use crate::pipeline::{
    evaluate_flip, evaluate_full, resolve_partition, round3, run_outcome_sweep, FlipReport,
    PipelineOutcome, RunOptions,
};

const MODEL_ID: &str = "BMC";

pub fn run_bmc(
    config: &SimulationConfig,
    options: &RunOptions,
    n_ensemble: usize,
) -> Result<PipelineOutcome, RunnerError> {
    config.validate().map_err(RunnerError::from)?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let store = crate::checkpoint::CheckpointStore::open(
        &options.model_root,
        MODEL_ID,
        config,
        !options.eval_only,
    )?;

    // 主成分特征个数：多处理变量时用满 3 个
    let npc = if config.n_cause > 3 { 3 } else { 1 };

    // 轮次 0 为单基线；之后每轮扩张训练分区并独立重训
    let mut last = None;
    for round in 0..=n_ensemble {
        let cfg = resolve_partition(config, round);
        cfg.validate().map_err(RunnerError::from)?;
        tracing::info!(round, sample_size = cfg.sample_size, "generating data");
        let dg = DataGenerator::new(&cfg, &mut rng)?;

        let (train, valid, x_test) = dg.generate_dataset_bmc(npc)?;
        tracing::info!(
            round,
            rows = train.rows,
            dim = train.feature_dim,
            "training ensemble round"
        );
        let sweep = run_outcome_sweep(
            &train,
            &valid,
            false,
            &cfg,
            options.max_epoch,
            &store,
            &format!("round{round}"),
            &mut rng,
        )?;
        last = Some((cfg, dg, x_test, sweep));
    }

    // n_ensemble + 1 轮至少执行一次
    let (cfg, dg, x_test, sweep) = last.expect("at least one ensemble round");

    if options.eval_delta {
        let mut flips = Vec::with_capacity(cfg.n_cause);
        for n_flip in 1..=cfg.n_cause {
            let (new_x_test, cate_test) = dg.generate_counterfactual_test_bmc(n_flip, npc)?;
            let (err, sd) = evaluate_flip(&sweep.model, &x_test, &new_x_test, &cate_test);
            println!("bmc {} {} {}", n_flip, round3(err), round3(sd));
            flips.push(FlipReport {
                n_flip,
                rmse: err,
                rmse_sd: sd,
            });
        }
        return Ok(PipelineOutcome::DeltaSweep(flips));
    }

    let new_x_list = dg.generate_all_treatment_tests_bmc(npc)?;
    let (new_x_test, cate_test) = dg.generate_counterfactual_test_bmc(cfg.n_flip, npc)?;
    let report = evaluate_full(
        &dg,
        &sweep.model,
        &sweep.best,
        &x_test,
        &new_x_test,
        &cate_test,
        &new_x_list,
    );

    println!("{}", round3(report.rmse_mean_baseline));
    println!(
        "{} {} {} {}",
        round3(report.cate_rmse),
        round3(report.cate_rmse_sd),
        round3(report.rmse_all),
        round3(report.rmse_all_sd)
    );

    Ok(PipelineOutcome::Report(report))
}
