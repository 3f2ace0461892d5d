use anyhow::{Context, Result};
use tracing::info;

use perk::{Evaluation, EvaluationConfig, Recording};

const USAGE: &str = "usage: perk-eval <config.yml|json> <recording.yml|json>";

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(recording_path)) = (args.next(), args.next()) else {
        anyhow::bail!(USAGE);
    };

    common::log_setup::setup_logging("warn", "logs", "perk-eval")?;

    let config = EvaluationConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load evaluation config {config_path}"))?;
    config.validate()?;
    let recording = Recording::from_file(&recording_path)
        .with_context(|| format!("Failed to load recording {recording_path}"))?;

    let samples = recording.pose_samples(&config.tools);
    info!(samples = samples.len(), recording = %recording_path, "recording loaded");

    let mut evaluation = Evaluation::from_config(&config)?;
    let report = evaluation.run(&samples);
    print!("{}", report.to_yaml()?);

    Ok(())
}
