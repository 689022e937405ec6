//! Run reporter
//!
//! Single aggregation point for outcomes. Counts are taken after the executor
//! has drained, so no counter is shared between workers.

use colored::*;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::outcome::Outcome;

/// A failed record, as listed in the summary
#[derive(Debug, Clone, PartialEq)]
pub struct FailureLine {
    pub label: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub simulated: usize,
    /// Skip count per reason text
    pub skip_reasons: BTreeMap<String, usize>,
    /// First failures, up to the reporter's limit
    pub failures: Vec<FailureLine>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.failed + self.simulated
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Fold another summary into this one, keeping at most `failure_limit`
    /// failure lines
    pub fn merge(&mut self, other: &RunSummary, failure_limit: usize) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.simulated += other.simulated;
        for (reason, count) in &other.skip_reasons {
            *self.skip_reasons.entry(reason.clone()).or_default() += count;
        }
        let room = failure_limit.saturating_sub(self.failures.len());
        self.failures
            .extend(other.failures.iter().take(room).cloned());
        self.elapsed += other.elapsed;
    }

    /// Print the summary block to stdout
    pub fn print(&self, title: &str, dry_run: bool) {
        let heading = if dry_run {
            format!("{} (dry run): {} records", title, self.total())
        } else {
            format!("{}: {} records", title, self.total())
        };
        println!("{}", heading.bold());

        if dry_run {
            println!("  {:<10} {}", "Simulated:", self.simulated.to_string().cyan());
        } else {
            println!("  {:<10} {}", "Created:", self.created.to_string().green());
            println!("  {:<10} {}", "Updated:", self.updated.to_string().green());
        }
        println!("  {:<10} {}", "Skipped:", self.skipped.to_string().yellow());
        for (reason, count) in &self.skip_reasons {
            println!("    {} {}", format!("{:>5}", count).dimmed(), reason.dimmed());
        }

        let failed = if self.failed > 0 {
            self.failed.to_string().red().bold()
        } else {
            self.failed.to_string().normal()
        };
        println!("  {:<10} {}", "Failed:", failed);
        println!(
            "  {:<10} {:.2}s",
            "Elapsed:",
            self.elapsed.as_secs_f64()
        );

        if !self.failures.is_empty() {
            println!();
            println!("{}", "Failures:".red().bold());
            for failure in &self.failures {
                println!("  {} {}", failure.label.bright_white(), failure.error);
            }
            let hidden = self.failed.saturating_sub(self.failures.len());
            if hidden > 0 {
                println!("  {}", format!("... and {} more", hidden).dimmed());
            }
        }
    }
}

/// Accumulates the outcomes of one stage
pub struct Reporter {
    summary: RunSummary,
    failure_limit: usize,
    started: Instant,
}

impl Reporter {
    pub fn new(failure_limit: usize) -> Self {
        Self {
            summary: RunSummary::default(),
            failure_limit,
            started: Instant::now(),
        }
    }

    pub fn record(&mut self, label: &str, outcome: &Outcome) {
        let summary = &mut self.summary;
        match outcome {
            Outcome::Created { .. } => summary.created += 1,
            Outcome::Updated { .. } => summary.updated += 1,
            Outcome::DrySimulated { .. } => summary.simulated += 1,
            Outcome::Skipped(reason) => {
                summary.skipped += 1;
                *summary.skip_reasons.entry(reason.to_string()).or_default() += 1;
                log::debug!("{}: skipped ({})", label, reason);
            }
            Outcome::Failed { error } => {
                summary.failed += 1;
                log::warn!("{}: {}", label, error);
                if summary.failures.len() < self.failure_limit {
                    summary.failures.push(FailureLine {
                        label: label.to_string(),
                        error: error.clone(),
                    });
                }
            }
        }
    }

    /// Current counts, without elapsed time
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn finish(mut self) -> RunSummary {
        self.summary.elapsed = self.started.elapsed();
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RemoteId;
    use crate::sync::outcome::SkipReason;
    use serde_json::json;

    #[test]
    fn test_counts_by_kind() {
        let mut reporter = Reporter::new(10);
        reporter.record("line 2", &Outcome::Created { id: RemoteId::from(1) });
        reporter.record("line 3", &Outcome::Updated { id: RemoteId::from(2) });
        reporter.record("line 4", &Outcome::Skipped(SkipReason::MissingUniqueKey));
        reporter.record("line 5", &Outcome::Skipped(SkipReason::MissingUniqueKey));
        reporter.record("line 6", &Outcome::failed("400 Bad Request"));
        reporter.record("line 7", &Outcome::DrySimulated { payload: json!({}) });

        let summary = reporter.finish();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.simulated, 1);
        assert_eq!(summary.total(), 6);
        assert!(summary.has_failures());
        assert_eq!(summary.skip_reasons.get("missing unique key"), Some(&2));
        assert_eq!(
            summary.failures,
            vec![FailureLine {
                label: "line 6".to_string(),
                error: "400 Bad Request".to_string()
            }]
        );
    }

    #[test]
    fn test_failure_lines_are_capped() {
        let mut reporter = Reporter::new(2);
        for i in 0..5 {
            reporter.record(&format!("line {}", i), &Outcome::failed("boom"));
        }

        let summary = reporter.finish();
        assert_eq!(summary.failed, 5);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.failures[0].label, "line 0");
    }

    #[test]
    fn test_merge() {
        let mut first = Reporter::new(10);
        first.record("a", &Outcome::Created { id: RemoteId::from(1) });
        first.record("b", &Outcome::failed("boom"));
        let mut second = Reporter::new(10);
        second.record("c", &Outcome::Skipped(SkipReason::NoChanges));
        second.record("d", &Outcome::failed("bang"));

        let mut total = RunSummary::default();
        total.merge(&first.finish(), 1);
        total.merge(&second.finish(), 1);

        assert_eq!(total.created, 1);
        assert_eq!(total.skipped, 1);
        assert_eq!(total.failed, 2);
        assert_eq!(total.failures.len(), 1);
        assert_eq!(total.skip_reasons.get("no changes"), Some(&1));
    }

    #[test]
    fn test_clean_run_has_no_failures() {
        assert!(!RunSummary::default().has_failures());
    }
}
