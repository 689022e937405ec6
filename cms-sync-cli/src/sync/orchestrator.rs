//! Pipeline orchestrator
//!
//! Runs the declared stages in order. A stage starts only after the previous
//! one has drained; its reference maps are preloaded and checked before the
//! first record is read.

use log::{error, info, warn};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::cache::{self, CacheLoadError, ReferenceCache};
use super::executor::{self, ExecutorOptions};
use super::journal::CreationJournal;
use super::loader::{LoaderError, RecordReader};
use super::mapping::MappingError;
use super::outcome::Outcome;
use super::report::{Reporter, RunSummary};
use super::resolver::{ResolverOptions, UpsertResolver};
use crate::api::RemoteStore;
use crate::config::{PipelineDefinition, StageDefinition};

/// A failure that stops a whole stage
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Input(#[from] LoaderError),
    #[error(transparent)]
    Reference(#[from] CacheLoadError),
    #[error("{0}")]
    Mapping(#[from] MappingError),
    #[error("reference '{reference}' is not declared")]
    UnknownReference { reference: String },
    #[error("prerequisite reference '{reference}' is empty; run the stage that fills it first")]
    MissingPrerequisite { reference: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub concurrency: usize,
    pub abort_on_failure: bool,
    pub continue_on_error: bool,
    pub dry_run: bool,
    pub skip_unchanged: bool,
    pub page_size: u32,
    pub failure_report_limit: usize,
    /// No record starts once this much time has passed
    pub run_deadline: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            concurrency: 8,
            abort_on_failure: false,
            continue_on_error: false,
            dry_run: false,
            skip_unchanged: true,
            page_size: 100,
            failure_report_limit: 10,
            run_deadline: None,
        }
    }
}

#[derive(Debug)]
pub enum StageStatus {
    Completed(RunSummary),
    Failed(StageError),
    /// An earlier stage halted the run
    NotStarted,
}

#[derive(Debug)]
pub struct StageReport {
    pub name: String,
    pub status: StageStatus,
}

#[derive(Debug)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    pub journal: CreationJournal,
    pub halted: bool,
    pub elapsed: Duration,
}

impl RunReport {
    /// Outcome counts over every completed stage
    pub fn summary(&self, failure_limit: usize) -> RunSummary {
        let mut total = RunSummary::default();
        for stage in &self.stages {
            if let StageStatus::Completed(summary) = &stage.status {
                total.merge(summary, failure_limit);
            }
        }
        total.elapsed = self.elapsed;
        total
    }

    pub fn stage_errors(&self) -> impl Iterator<Item = (&str, &StageError)> {
        self.stages.iter().filter_map(|stage| match &stage.status {
            StageStatus::Failed(e) => Some((stage.name.as_str(), e)),
            _ => None,
        })
    }

    pub fn has_failed_records(&self) -> bool {
        self.stages.iter().any(|stage| {
            matches!(&stage.status, StageStatus::Completed(summary) if summary.has_failures())
        })
    }

    /// Exit status rule: stage errors always fail the run, failed records
    /// only when `fail_on_error` is set
    pub fn is_success(&self, fail_on_error: bool) -> bool {
        self.stage_errors().next().is_none() && !(fail_on_error && self.has_failed_records())
    }
}

pub struct Orchestrator<'a, S: ?Sized> {
    store: &'a S,
    pipeline: &'a PipelineDefinition,
    options: PipelineOptions,
}

impl<'a, S: RemoteStore + ?Sized> Orchestrator<'a, S> {
    pub fn new(store: &'a S, pipeline: &'a PipelineDefinition, options: PipelineOptions) -> Self {
        Self {
            store,
            pipeline,
            options,
        }
    }

    pub async fn run(&self) -> RunReport {
        let started = Instant::now();
        let deadline = self.options.run_deadline.map(|limit| started + limit);
        let mut journal = CreationJournal::new();
        let mut stages = Vec::with_capacity(self.pipeline.stages.len());
        let mut halted = false;

        for stage in &self.pipeline.stages {
            if halted {
                info!("Stage '{}' not started", stage.name);
                stages.push(StageReport {
                    name: stage.name.clone(),
                    status: StageStatus::NotStarted,
                });
                continue;
            }

            let status = match self.run_stage(stage, deadline, &mut journal).await {
                Ok(summary) => {
                    if summary.has_failures() && !self.options.continue_on_error {
                        warn!(
                            "Stage '{}' had {} failed records, halting",
                            stage.name, summary.failed
                        );
                        halted = true;
                    }
                    StageStatus::Completed(summary)
                }
                Err(e) => {
                    error!("Stage '{}' failed: {}", stage.name, e);
                    if !self.options.continue_on_error {
                        halted = true;
                    }
                    StageStatus::Failed(e)
                }
            };

            stages.push(StageReport {
                name: stage.name.clone(),
                status,
            });
        }

        if halted {
            journal.mark_halted();
            if !journal.is_empty() {
                warn!(
                    "Run halted after creating {} entities; they are not rolled back",
                    journal.len()
                );
            }
        }

        RunReport {
            stages,
            journal,
            halted,
            elapsed: started.elapsed(),
        }
    }

    async fn load_references(&self, stage: &StageDefinition) -> Result<ReferenceCache, StageError> {
        let mut references = ReferenceCache::new();

        for name in stage.mapping.references() {
            let definition =
                self.pipeline
                    .reference(name)
                    .ok_or_else(|| StageError::UnknownReference {
                        reference: name.to_string(),
                    })?;

            let map = cache::preload(self.store, definition, self.options.page_size).await?;
            if map.is_empty() {
                if !self.options.dry_run {
                    return Err(StageError::MissingPrerequisite {
                        reference: name.to_string(),
                    });
                }
                // Earlier stages only simulated their creates
                warn!(
                    "Reference '{}' is empty; references to it will be left out",
                    name
                );
            }
            references.insert(name, map);
        }

        Ok(references)
    }

    async fn run_stage(
        &self,
        stage: &StageDefinition,
        deadline: Option<Instant>,
        journal: &mut CreationJournal,
    ) -> Result<RunSummary, StageError> {
        info!(
            "Stage '{}': {} -> '{}'",
            stage.name,
            stage.input.display(),
            stage.mapping.collection
        );

        let references = self.load_references(stage).await?;

        let reader = RecordReader::open(&stage.input)?;
        stage.mapping.check_headers(reader.headers())?;

        let resolver = UpsertResolver::new(
            self.store,
            &stage.mapping,
            &references,
            ResolverOptions {
                dry_run: self.options.dry_run,
                skip_unchanged: self.options.skip_unchanged,
            },
        );

        let mut reporter = Reporter::new(self.options.failure_report_limit);
        let mut tasks = Vec::new();
        for record in reader {
            match resolver.prepare(&record?) {
                Ok(task) => tasks.push(task),
                Err(rejected) => reporter.record(&rejected.label, &Outcome::Skipped(rejected.reason)),
            }
        }

        info!(
            "Stage '{}': {} records to upsert, {} rejected",
            stage.name,
            tasks.len(),
            reporter.summary().skipped
        );

        let labels: Vec<String> = tasks.iter().map(|task| task.label.clone()).collect();
        let options = ExecutorOptions {
            limit: self.options.concurrency,
            abort_on_failure: self.options.abort_on_failure,
            deadline,
        };
        let resolver = &resolver;
        let outcomes = executor::run_all(
            tasks,
            &options,
            |task| Some(task.serial_key()),
            |task| async move { resolver.execute(&task).await },
        )
        .await;

        for (label, outcome) in labels.iter().zip(&outcomes) {
            reporter.record(label, outcome);
            journal.record(&stage.name, &stage.mapping.collection, label, outcome);
        }

        let summary = reporter.finish();
        info!(
            "Stage '{}' done: {} created, {} updated, {} skipped, {} failed, {} simulated",
            stage.name,
            summary.created,
            summary.updated,
            summary.skipped,
            summary.failed,
            summary.simulated
        );
        Ok(summary)
    }
}
