use clap::Parser;

use yinguo_runner::config::Registry;
use yinguo_runner::logging;
use yinguo_runner::pipeline::{overlap, RunOptions};

#[derive(Parser)]
#[command(name = "run-overlap")]
#[command(about = "IPWO simulation experiment: propensity fitting, overlap reweighting, weighted outcome regression")]
struct Cli {
    /// Registry key of the simulation configuration
    #[arg(long)]
    config: String,

    /// Persist features, weights and the serialized generator after the
    /// propensity stage, then exit
    #[arg(long)]
    save_data: bool,

    /// Keep the existing checkpoint directory instead of recreating it
    #[arg(long)]
    eval_only: bool,

    /// Report counterfactual error for every n_flip in 1..=n_cause
    #[arg(long)]
    eval_delta: bool,

    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level);

    let registry = Registry::builtin();
    let config = match registry.get(&cli.config) {
        Ok(config) => config,
        Err(_) => {
            eprintln!("{}", cli.config);
            std::process::exit(-1);
        }
    };

    let options = RunOptions {
        eval_only: cli.eval_only,
        eval_delta: cli.eval_delta,
        ..Default::default()
    };

    if let Err(err) = overlap::run_overlap(config, &options, cli.save_data) {
        tracing::error!(error = %err, "overlap run failed");
        std::process::exit(1);
    }
}
