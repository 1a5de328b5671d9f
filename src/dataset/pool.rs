use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

/// How a batch of independent image jobs is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    /// Bounded pool; `workers` is clamped to at least one.
    Pool { workers: usize },
}

impl ExecutionMode {
    pub fn from_workers(workers: usize) -> Self {
        if workers <= 1 {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Pool { workers }
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}

/// Run `work` on every job and return the outputs in submission order.
///
/// Blocks until the whole batch has finished. Jobs share nothing, so workers
/// only contend on the queue itself.
pub fn run_batch<J, T, F>(jobs: Vec<J>, mode: ExecutionMode, work: F) -> Vec<T>
where
    J: Send,
    T: Send,
    F: Fn(J) -> T + Sync,
{
    let workers = match mode {
        ExecutionMode::Sequential => return jobs.into_iter().map(&work).collect(),
        ExecutionMode::Pool { workers } => workers.max(1).min(jobs.len().max(1)),
    };

    let total = jobs.len();
    let (job_tx, job_rx) = mpsc::channel::<(usize, J)>();
    for item in jobs.into_iter().enumerate() {
        // Receiver is alive until the scope below ends.
        let _ = job_tx.send(item);
    }
    drop(job_tx);

    let job_rx: Arc<Mutex<Receiver<(usize, J)>>> = Arc::new(Mutex::new(job_rx));
    let (result_tx, result_rx) = mpsc::channel::<(usize, T)>();

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let work = &work;
            scope.spawn(move || {
                loop {
                    let next = match job_rx.lock() {
                        Ok(rx) => rx.recv(),
                        Err(_) => break,
                    };
                    let Ok((idx, job)) = next else { break };
                    if result_tx.send((idx, work(job))).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    for (idx, out) in result_rx {
        slots[idx] = Some(out);
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_preserves_order() {
        let jobs: Vec<u32> = (0..50).collect();
        let out = run_batch(jobs, ExecutionMode::Pool { workers: 4 }, |j| j * 2);
        assert_eq!(out, (0..50).map(|j| j * 2).collect::<Vec<_>>());
    }

    #[test]
    fn empty_batch() {
        let out: Vec<u32> = run_batch(Vec::<u32>::new(), ExecutionMode::Pool { workers: 3 }, |j| j);
        assert!(out.is_empty());
    }
}
