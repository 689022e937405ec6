//! Run and import command handlers

use anyhow::{Context, Result};
use colored::*;
use log::info;
use std::process::ExitCode;

use super::{ImportArgs, RunArgs};
use crate::api::{CmsClient, ResilientStore};
use crate::config::{PipelineDefinition, SyncConfig};
use crate::sync::{Orchestrator, RunReport, StageStatus};

/// Handle `run`: every stage of the pipeline, in order
pub async fn handle_run_command(args: RunArgs) -> Result<ExitCode> {
    let config = SyncConfig::from_args(&args.sync)?;
    let pipeline = PipelineDefinition::load(&args.pipeline)
        .with_context(|| format!("Failed to load pipeline: {}", args.pipeline.display()))?;

    execute(&pipeline, &config).await
}

/// Handle `import`: one stage, optionally from another input file
pub async fn handle_import_command(args: ImportArgs) -> Result<ExitCode> {
    let config = SyncConfig::from_args(&args.sync)?;
    let pipeline = PipelineDefinition::load(&args.pipeline)
        .with_context(|| format!("Failed to load pipeline: {}", args.pipeline.display()))?
        .single_stage(&args.stage, args.input)?;

    execute(&pipeline, &config).await
}

async fn execute(pipeline: &PipelineDefinition, config: &SyncConfig) -> Result<ExitCode> {
    let dry_run = config.pipeline.dry_run;

    let client = CmsClient::new(
        config.base_url.clone(),
        config.token(),
        config.resilience.request_timeout,
    )
    .context("Failed to build HTTP client")?;
    let store = ResilientStore::new(client, &config.resilience, dry_run);

    println!("Target: {}", config.base_url.as_str().cyan());
    if dry_run {
        println!("{}", "Dry run: nothing will be written".yellow().bold());
    }
    println!();

    let report = Orchestrator::new(&store, pipeline, config.pipeline.clone())
        .run()
        .await;

    print_report(&report, config);

    let stats = store.stats();
    info!(
        "Transport: {} attempts, {} intercepted, peak {} requests in flight, {} waited for a slot",
        stats.attempts, stats.intercepted, stats.peak_in_flight, stats.waited
    );

    if let Some(path) = &config.journal {
        report
            .journal
            .write_to(path)
            .with_context(|| format!("Failed to write journal: {}", path.display()))?;
        println!(
            "Journal of {} created entities written to {}",
            report.journal.len(),
            path.display().to_string().cyan()
        );
    } else if report.halted && !report.journal.is_empty() {
        println!(
            "{}",
            format!(
                "{} entities were created before the run halted; pass --journal to record them",
                report.journal.len()
            )
            .yellow()
        );
    }

    if report.is_success(config.fail_on_error) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_report(report: &RunReport, config: &SyncConfig) {
    let dry_run = config.pipeline.dry_run;

    for stage in &report.stages {
        match &stage.status {
            StageStatus::Completed(summary) => {
                summary.print(&format!("Stage '{}'", stage.name), dry_run);
            }
            StageStatus::Failed(e) => {
                println!(
                    "{} {}",
                    format!("Stage '{}' failed:", stage.name).red().bold(),
                    e
                );
            }
            StageStatus::NotStarted => {
                println!("{}", format!("Stage '{}' not started", stage.name).dimmed());
            }
        }
        println!();
    }

    if report.stages.len() > 1 {
        report
            .summary(config.pipeline.failure_report_limit)
            .print("Total", dry_run);
    }
}
