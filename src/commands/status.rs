use crate::core::{
    aggregator::StatusAggregator,
    error::{KartStatusError, Result},
    render::{render_json, render_text},
    repo::KartRepo,
};
use clap::ValueEnum;
use std::env;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn execute_status(format: OutputFormat) -> Result<()> {
    let current_dir = env::current_dir()?;
    let repo = KartRepo::open(&current_dir).map_err(|_| KartStatusError::NotInRepo)?;

    let report = StatusAggregator::aggregate(&repo)?;
    log::debug!(
        "Status for {} (merging: {})",
        repo.get_repository().path().display(),
        report.is_merging()
    );

    let output = match format {
        OutputFormat::Text => render_text(&report),
        OutputFormat::Json => render_json(&report)?,
    };
    println!("{output}");
    Ok(())
}
