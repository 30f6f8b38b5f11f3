//! IPWO pipeline: propensity estimation, overlap reweighting, weighted
//! outcome regression.
//!
//! Stage one fits the propensity network on (confounder, cause) pairs;
//! stage two converts fitted propensities into per-example overlap
//! weights and fits the outcome model under the weighted loss. The
//! weights are a fixed input to stage two, never jointly optimized.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use yinguo_algo::sanitize;
use yinguo_algo::{
    DataGenerator, ModelTrainer, PropensityNetwork, SimulationConfig, SupervisedModel,
    ValidationScore,
};

use crate::checkpoint::{save_json, CheckpointStore};
use crate::error::RunnerError;
use crate::pipeline::{
    evaluate_flip, evaluate_full, resolve_partition, round3, run_outcome_sweep, FlipReport,
    PipelineOutcome, RunOptions, BATCH_SIZE, LEARNING_RATE,
};

const MODEL_ID: &str = "IPWO";

pub fn run_overlap(
    config: &SimulationConfig,
    options: &RunOptions,
    save_data: bool,
) -> Result<PipelineOutcome, RunnerError> {
    let cfg = resolve_partition(config, 0);
    cfg.validate().map_err(RunnerError::from)?;

    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let store = CheckpointStore::open(&options.model_root, MODEL_ID, &cfg, !options.eval_only)?;

    tracing::info!(sim_id = %cfg.sim_id, sample_size = cfg.sample_size, "generating data");
    let dg = DataGenerator::new(&cfg, &mut rng)?;

    // ---- stage one: propensity network ----
    let (train_p, valid_p, _) = dg.generate_dataset_propensity();
    tracing::info!(
        rows = train_p.rows,
        n_confounder = cfg.n_confounder,
        n_cause = cfg.n_cause,
        "training propensity network"
    );
    let mut propensity_net = PropensityNetwork::new(
        cfg.n_confounder,
        cfg.n_cause,
        cfg.n_confounder + cfg.n_cause,
        &mut rng,
    );
    let trainer = ModelTrainer::new(BATCH_SIZE, options.propensity_max_epoch);
    let report = trainer.train(&mut propensity_net, LEARNING_RATE, &train_p, &valid_p, &mut rng);
    match report.score {
        ValidationScore::Valid(loss) => {
            tracing::info!(loss, epochs = report.epochs_run, "propensity network trained")
        }
        ValidationScore::Diverged => return Err(RunnerError::PropensityDiverged),
    }
    store.save_named("propensity", &propensity_net.snapshot())?;

    // ---- overlap weights over all rows ----
    let (x, y) = dg.propensity_matrix();
    let weight = propensity_net.overlap_weights(x, y, dg.sample_size());
    if !sanitize::all_valid_weights(&weight) {
        return Err(RunnerError::InvalidWeights);
    }
    tracing::info!(
        rows = weight.len(),
        preview = ?&weight[..weight.len().min(10)],
        "overlap weights"
    );

    if save_data {
        let features = dg.factual_features(None)?.slice_rows(0..dg.train_size());
        let train_weight = &weight[..dg.train_size()];
        save_json(
            &options.data_root.join(format!("{}_{}_x.json", cfg.sim_id, MODEL_ID)),
            &features,
        )?;
        save_json(
            &options.data_root.join(format!("{}_{}_w.json", cfg.sim_id, MODEL_ID)),
            &train_weight,
        )?;
        save_json(&options.data_root.join(format!("{}.json", cfg.sim_id)), &dg)?;
        tracing::info!(dir = %options.data_root.display(), "propensity-stage data saved");
        return Ok(PipelineOutcome::DataSaved);
    }

    // ---- stage two: weighted outcome regression ----
    let (train, valid, x_test) = dg.generate_dataset(Some(&weight))?;
    tracing::info!(rows = train.rows, dim = train.feature_dim, "training weighted outcome model");
    let sweep = run_outcome_sweep(
        &train,
        &valid,
        true,
        &cfg,
        options.max_epoch,
        &store,
        "or",
        &mut rng,
    )?;

    if options.eval_delta {
        let mut flips = Vec::with_capacity(cfg.n_cause);
        for n_flip in 1..=cfg.n_cause {
            let (new_x_test, cate_test) = dg.generate_counterfactual_test(n_flip, Some(&weight))?;
            let (err, sd) = evaluate_flip(&sweep.model, &x_test, &new_x_test, &cate_test);
            println!("propensity {} {} {}", n_flip, round3(err), round3(sd));
            flips.push(FlipReport {
                n_flip,
                rmse: err,
                rmse_sd: sd,
            });
        }
        return Ok(PipelineOutcome::DeltaSweep(flips));
    }

    let new_x_list = dg.generate_all_treatment_tests(Some(&weight))?;
    let (new_x_test, cate_test) = dg.generate_counterfactual_test(cfg.n_flip, Some(&weight))?;
    let report = evaluate_full(
        &dg,
        &sweep.model,
        &sweep.best,
        &x_test,
        &new_x_test,
        &cate_test,
        &new_x_list,
    );

    println!(
        "{} {} {} {}",
        round3(report.cate_rmse),
        round3(report.cate_rmse_sd),
        round3(report.rmse_all),
        round3(report.rmse_all_sd)
    );

    Ok(PipelineOutcome::Report(report))
}
