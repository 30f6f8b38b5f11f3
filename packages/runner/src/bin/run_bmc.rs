use clap::Parser;

use yinguo_runner::config::Registry;
use yinguo_runner::logging;
use yinguo_runner::pipeline::{bmc, RunOptions};

#[derive(Parser)]
#[command(name = "run-bmc")]
#[command(about = "BMC simulation experiment: ensemble rounds with growing training partitions")]
struct Cli {
    /// Registry key of the simulation configuration
    #[arg(long)]
    config: String,

    /// Extra ensemble rounds beyond the baseline (round 0)
    #[arg(long, default_value_t = 0)]
    n_ensemble: usize,

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

    if let Err(err) = bmc::run_bmc(config, &options, cli.n_ensemble) {
        tracing::error!(error = %err, "bmc run failed");
        std::process::exit(1);
    }
}
