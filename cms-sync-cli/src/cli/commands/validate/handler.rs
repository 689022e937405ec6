//! Validate command handler
//!
//! Checks the pipeline file, each stage's header row and every record's
//! unique key and coercions. Nothing is sent to the CMS, so references are
//! not resolved.

use anyhow::{Context, Result};
use colored::*;
use std::process::ExitCode;

use super::ValidateArgs;
use crate::config::{PipelineDefinition, StageDefinition};
use crate::sync::{Rejected, RecordReader, ReferenceCache, StageError, prepare_task};

/// Rows checked for one stage
struct StageCheck {
    accepted: usize,
    rejected: Vec<Rejected>,
    rejected_total: usize,
}

pub fn handle_validate_command(args: ValidateArgs) -> Result<ExitCode> {
    let pipeline = PipelineDefinition::load(&args.pipeline)
        .with_context(|| format!("Failed to load pipeline: {}", args.pipeline.display()))?;

    println!(
        "Pipeline {}: {} references, {} stages",
        args.pipeline.display().to_string().cyan(),
        pipeline.references.len(),
        pipeline.stages.len()
    );
    println!();

    let mut stage_errors = 0;
    for stage in &pipeline.stages {
        match check_stage(stage, args.error_limit) {
            Ok(check) => print_check(stage, &check),
            Err(e) => {
                stage_errors += 1;
                println!("{} {}", format!("✗ {}", stage.name).red().bold(), e);
            }
        }
    }

    println!();
    if stage_errors > 0 {
        println!(
            "{}",
            format!("{} of {} stages cannot run", stage_errors, pipeline.stages.len()).red()
        );
        Ok(ExitCode::FAILURE)
    } else {
        println!("{}", "Pipeline is valid".green().bold());
        Ok(ExitCode::SUCCESS)
    }
}

fn check_stage(stage: &StageDefinition, limit: usize) -> Result<StageCheck, StageError> {
    let reader = RecordReader::open(&stage.input)?;
    stage.mapping.check_headers(reader.headers())?;

    let references = ReferenceCache::new();
    let mut check = StageCheck {
        accepted: 0,
        rejected: Vec::new(),
        rejected_total: 0,
    };

    for record in reader {
        match prepare_task(&stage.mapping, &references, &record?) {
            Ok(_) => check.accepted += 1,
            Err(rejected) => {
                check.rejected_total += 1;
                if check.rejected.len() < limit {
                    check.rejected.push(rejected);
                }
            }
        }
    }

    Ok(check)
}

fn print_check(stage: &StageDefinition, check: &StageCheck) {
    let marker = if check.rejected_total == 0 {
        format!("✓ {}", stage.name).green().bold()
    } else {
        format!("! {}", stage.name).yellow().bold()
    };
    println!(
        "{} {} → '{}': {} records, {} rejected",
        marker,
        stage.input.display(),
        stage.mapping.collection,
        check.accepted + check.rejected_total,
        check.rejected_total
    );

    for rejected in &check.rejected {
        println!("    {} {}", rejected.label.dimmed(), rejected.reason);
    }
    let hidden = check.rejected_total - check.rejected.len();
    if hidden > 0 {
        println!("    {}", format!("... and {} more", hidden).dimmed());
    }
}
