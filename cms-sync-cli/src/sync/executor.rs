//! Concurrency-limited executor
//!
//! Fans tasks out over at most `limit` concurrent workers and returns one
//! [`Outcome`] per task, in submission order. Tasks that share a serial key
//! form a chain that runs sequentially inside a single worker slot, so two
//! rows for the same entity never race each other into two creates.

use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use super::outcome::{Outcome, SkipReason};

/// Completed-task interval between progress lines
const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Maximum number of tasks in flight
    pub limit: usize,
    /// Stop starting new tasks after the first failure
    pub abort_on_failure: bool,
    /// No task starts after this instant
    pub deadline: Option<Instant>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            limit: 8,
            abort_on_failure: false,
            deadline: None,
        }
    }
}

/// Run every task and collect outcomes indexed by submission order.
///
/// `serial_key` returns `Some(key)` for tasks that must not overlap with
/// other tasks of the same key. Started tasks always run to completion;
/// abort and deadline only prevent new starts.
pub async fn run_all<T, K, F, Fut>(
    tasks: Vec<T>,
    options: &ExecutorOptions,
    serial_key: K,
    work: F,
) -> Vec<Outcome>
where
    K: Fn(&T) -> Option<String>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Outcome>,
{
    let total = tasks.len();
    if total == 0 {
        return Vec::new();
    }

    let chains = chain_by_key(tasks, &serial_key);
    let limit = options.limit.max(1);
    let abort_on_failure = options.abort_on_failure;
    let deadline = options.deadline;

    let aborted = AtomicBool::new(false);
    let completed = AtomicUsize::new(0);
    let (work, aborted, completed) = (&work, &aborted, &completed);

    let finished: Vec<Vec<(usize, Outcome)>> = stream::iter(chains)
        .map(move |chain| async move {
            let mut done = Vec::with_capacity(chain.len());
            for (index, task) in chain {
                if let Some(reason) = stop_reason(aborted, deadline) {
                    done.push((index, Outcome::Skipped(reason)));
                    continue;
                }

                let outcome = work(task).await;
                if abort_on_failure && outcome.is_failed() && !aborted.swap(true, Ordering::SeqCst)
                {
                    warn!("Task {} failed, no further tasks will start", index + 1);
                }

                let count = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if count % PROGRESS_EVERY == 0 {
                    info!("Progress: {}/{} tasks", count, total);
                }
                done.push((index, outcome));
            }
            done
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    let mut slots: Vec<Option<Outcome>> = (0..total).map(|_| None).collect();
    for (index, outcome) in finished.into_iter().flatten() {
        slots[index] = Some(outcome);
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Outcome::Skipped(SkipReason::Aborted)))
        .collect()
}

/// Group tasks into chains, keeping submission order inside each chain and
/// ordering chains by their first task
fn chain_by_key<T, K>(tasks: Vec<T>, serial_key: &K) -> Vec<Vec<(usize, T)>>
where
    K: Fn(&T) -> Option<String>,
{
    let mut chains: Vec<Vec<(usize, T)>> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for (index, task) in tasks.into_iter().enumerate() {
        match serial_key(&task) {
            Some(key) => match by_key.get(&key) {
                Some(&chain) => chains[chain].push((index, task)),
                None => {
                    by_key.insert(key, chains.len());
                    chains.push(vec![(index, task)]);
                }
            },
            None => chains.push(vec![(index, task)]),
        }
    }

    chains
}

fn stop_reason(aborted: &AtomicBool, deadline: Option<Instant>) -> Option<SkipReason> {
    if aborted.load(Ordering::SeqCst) {
        return Some(SkipReason::Aborted);
    }
    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
        return Some(SkipReason::DeadlineExceeded);
    }
    None
}
