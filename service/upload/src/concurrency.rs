use std::{collections::VecDeque, future::Future};

use tokio::task::{JoinError, JoinSet};

/// Worker pool running at most `concurrency` jobs at once.
///
/// Jobs start in submission order but may finish in any order.
pub struct ConcurrencyQueue<J, O> {
    concurrency: usize,
    waiting: VecDeque<J>,
    running: JoinSet<O>,
    paused: bool,
}

impl<J, O> ConcurrencyQueue<J, O>
where
    O: Send + 'static,
{
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            waiting: VecDeque::new(),
            running: JoinSet::new(),
            paused: false,
        }
    }

    pub fn push(&mut self, job: J) {
        self.waiting.push_back(job);
    }

    /// Start waiting jobs while slots are free, returning how many started.
    ///
    /// Must be called within a tokio runtime.
    pub fn dispatch<F, Fut>(&mut self, mut worker: F) -> usize
    where
        F: FnMut(J) -> Fut,
        Fut: Future<Output = O> + Send + 'static,
    {
        let mut started = 0;
        while !self.paused && self.running.len() < self.concurrency {
            let Some(job) = self.waiting.pop_front() else {
                break;
            };
            self.running.spawn(worker(job));
            started += 1;
        }
        started
    }

    /// Wait for the next running job, `None` when nothing runs.
    pub async fn next_finished(&mut self) -> Option<Result<O, JoinError>> {
        self.running.join_next().await
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Drop every job not started yet, returning how many were dropped.
    pub fn kill(&mut self) -> usize {
        let killed = self.waiting.len();
        self.waiting.clear();
        killed
    }

    /// Nothing waiting and nothing running.
    pub fn is_drained(&self) -> bool {
        self.waiting.is_empty() && self.running.is_empty()
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }
}
