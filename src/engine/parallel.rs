//! Work-stealing replication runner.
//!
//! Replications are independent once their noise row is fixed, so they are
//! pushed onto a global `crossbeam_deque::Injector` and drained by scoped
//! worker threads. Idle workers steal from the others to absorb stragglers.
//! Each result is tagged with its replication index and the output is
//! re-sorted by that index, so the returned order never depends on
//! scheduling.
//!
//! Completions are reported back over a channel and counted on the calling
//! thread, so progress callbacks need not be `Send`.

use std::num::NonZeroUsize;
use std::sync::mpsc;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};

/// One unit of work: a single replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationTask {
    /// Replication index in `0..n_reps`.
    pub index: usize,
}

/// Work-stealing scheduler over scoped threads.
#[derive(Debug, Clone, Copy)]
pub struct WorkStealingRunner {
    num_workers: usize,
}

impl Default for WorkStealingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkStealingRunner {
    /// Create with one worker per available CPU.
    #[must_use]
    pub fn new() -> Self {
        Self {
            num_workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
        }
    }

    /// Create with a fixed number of workers (at least one).
    #[must_use]
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Run `task` for every index in `0..n_tasks`; results come back in
    /// index order.
    ///
    /// A panic inside `task` is propagated to the caller.
    pub fn execute<F, R>(&self, n_tasks: usize, task: F) -> Vec<R>
    where
        F: Fn(ReplicationTask) -> R + Sync,
        R: Send,
    {
        self.execute_with_progress(n_tasks, task, &mut |_| {})
    }

    /// Like [`Self::execute`], calling `on_complete` on the calling thread
    /// with the running count after every finished task.
    ///
    /// Counts arrive in completion order, one call per task, ending at
    /// `n_tasks`.
    pub fn execute_with_progress<F, R>(
        &self,
        n_tasks: usize,
        task: F,
        on_complete: &mut dyn FnMut(usize),
    ) -> Vec<R>
    where
        F: Fn(ReplicationTask) -> R + Sync,
        R: Send,
    {
        let injector: Injector<ReplicationTask> = Injector::new();
        for index in 0..n_tasks {
            injector.push(ReplicationTask { index });
        }

        let workers: Vec<Worker<ReplicationTask>> =
            (0..self.num_workers).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<ReplicationTask>> =
            workers.iter().map(Worker::stealer).collect();

        let (finished_tx, finished_rx) = mpsc::channel::<()>();

        let mut indexed: Vec<(usize, R)> = std::thread::scope(|s| {
            let handles: Vec<_> = workers
                .into_iter()
                .enumerate()
                .map(|(worker_id, local)| {
                    let injector = &injector;
                    let stealers = &stealers;
                    let task = &task;
                    let finished = finished_tx.clone();
                    s.spawn(move || {
                        let mut done = Vec::new();
                        while let Some(next) = find_task(&local, injector, stealers, worker_id) {
                            done.push((next.index, task(next)));
                            // The receiver outlives every worker.
                            let _ = finished.send(());
                        }
                        done
                    })
                })
                .collect();

            // Ends once every worker has dropped its sender.
            drop(finished_tx);
            let mut completed = 0;
            for () in finished_rx {
                completed += 1;
                on_complete(completed);
            }

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        });

        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, result)| result).collect()
    }
}

/// Local queue first, then the global injector, then round-robin theft.
fn find_task(
    local: &Worker<ReplicationTask>,
    injector: &Injector<ReplicationTask>,
    stealers: &[Stealer<ReplicationTask>],
    worker_id: usize,
) -> Option<ReplicationTask> {
    if let Some(task) = local.pop() {
        return Some(task);
    }
    loop {
        match injector.steal_batch_and_pop(local) {
            Steal::Success(task) => return Some(task),
            Steal::Empty => break,
            Steal::Retry => {}
        }
    }
    for offset in 1..=stealers.len() {
        let victim = &stealers[(worker_id + offset) % stealers.len()];
        loop {
            match victim.steal() {
                Steal::Success(task) => return Some(task),
                Steal::Empty => break,
                Steal::Retry => {}
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_results_in_index_order() {
        let runner = WorkStealingRunner::with_workers(4);
        let results = runner.execute(1000, |task| task.index * 2);
        let expected: Vec<usize> = (0..1000).map(|i| i * 2).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn test_every_task_runs_once() {
        let counter = AtomicUsize::new(0);
        let runner = WorkStealingRunner::with_workers(3);
        let results = runner.execute(257, |task| {
            counter.fetch_add(1, Ordering::Relaxed);
            task.index
        });
        assert_eq!(counter.load(Ordering::Relaxed), 257);
        assert_eq!(results.len(), 257);
    }

    #[test]
    fn test_zero_tasks() {
        let runner = WorkStealingRunner::with_workers(2);
        let results: Vec<usize> = runner.execute(0, |task| task.index);
        assert!(results.is_empty());
    }

    #[test]
    fn test_progress_counts_every_task() {
        let runner = WorkStealingRunner::with_workers(4);
        let mut seen = Vec::new();
        let results = runner.execute_with_progress(100, |task| task.index, &mut |n| seen.push(n));
        assert_eq!(results.len(), 100);
        assert_eq!(seen, (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn test_progress_without_tasks() {
        let runner = WorkStealingRunner::with_workers(2);
        let mut calls = 0;
        let results: Vec<usize> =
            runner.execute_with_progress(0, |task| task.index, &mut |_| calls += 1);
        assert!(results.is_empty());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(WorkStealingRunner::with_workers(0).num_workers(), 1);
        assert_eq!(WorkStealingRunner::with_workers(8).num_workers(), 8);
        assert!(WorkStealingRunner::new().num_workers() >= 1);
    }

    #[test]
    fn test_uneven_work_still_ordered() {
        let runner = WorkStealingRunner::with_workers(4);
        let results = runner.execute(64, |task| {
            // Skew the cost so stealing kicks in.
            let spins = if task.index % 7 == 0 { 20_000 } else { 10 };
            let mut acc = 0u64;
            for i in 0..spins {
                acc = acc.wrapping_add(i);
            }
            (task.index, acc)
        });
        for (i, (index, _)) in results.iter().enumerate() {
            assert_eq!(*index, i);
        }
    }
}
